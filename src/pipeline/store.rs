//! Block store: a document's flat block list, indexed by id.
//!
//! Built once per document and never mutated afterwards. Construction checks
//! referential integrity (every `children` / `cellIds` entry and the root must
//! exist) and acyclicity, so the renderer can recurse without guarding
//! against infinite descent. `parentId` is not validated; it is only ever a
//! lookup key.

use crate::error::StructuralError;
use crate::model::Block;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BlockStore {
    blocks: HashMap<String, Block>,
    root_id: String,
}

impl BlockStore {
    /// Index `blocks` and validate the tree rooted at `root_id`.
    ///
    /// Later duplicates of an id replace earlier ones.
    pub fn build(blocks: Vec<Block>, root_id: &str) -> Result<Self, StructuralError> {
        let blocks: HashMap<String, Block> =
            blocks.into_iter().map(|b| (b.id.clone(), b)).collect();

        if !blocks.contains_key(root_id) {
            return Err(StructuralError::MissingBlock {
                id: root_id.to_string(),
                referenced_by: "document root".to_string(),
            });
        }

        for block in blocks.values() {
            if let Some(missing) = block.referenced_ids().find(|id| !blocks.contains_key(*id)) {
                return Err(StructuralError::MissingBlock {
                    id: missing.clone(),
                    referenced_by: block.id.clone(),
                });
            }
        }

        let store = Self {
            blocks,
            root_id: root_id.to_string(),
        };
        store.check_acyclic()?;
        Ok(store)
    }

    pub fn get(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// The root block. Present by construction.
    pub fn root(&self) -> Option<&Block> {
        self.blocks.get(&self.root_id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterative three-colour DFS over every block, following both child and
    /// table-cell edges. A back edge to a grey block is a cycle.
    fn check_acyclic(&self) -> Result<(), StructuralError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Grey,
            Black,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.blocks.len());
        let mut ids: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
        // Deterministic error reporting across runs.
        ids.sort_unstable();

        for start in ids {
            if marks.contains_key(start) {
                continue;
            }
            // (block id, index of the next edge to explore)
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            marks.insert(start, Mark::Grey);

            while let Some((id, next)) = stack.last_mut() {
                let edge = self
                    .blocks
                    .get(*id)
                    .and_then(|b| b.referenced_ids().nth(*next));
                *next += 1;
                match edge {
                    Some(child) => match marks.get(child.as_str()) {
                        Some(Mark::Grey) => {
                            return Err(StructuralError::CyclicBlock { id: child.clone() })
                        }
                        Some(Mark::Black) => {}
                        None => {
                            marks.insert(child.as_str(), Mark::Grey);
                            stack.push((child.as_str(), 0));
                        }
                    },
                    None => {
                        marks.insert(*id, Mark::Black);
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }
}
