//! Image token resolution and placeholder substitution.
//!
//! The renderer emits every image as `![](token)` and records the token.
//! After rendering, each distinct token is fetched once through the
//! [`AssetSource`], stored under the configured image directory, and every
//! placeholder carrying that token is rewritten to the stored file's path
//! relative to the Markdown file.

use crate::error::Lark2MdError;
use crate::limiter::TokenBucket;
use crate::source::AssetSource;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// An image fetched for a document, ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAsset {
    pub token: String,
    pub file_name: String,
    /// Path used in the Markdown link, e.g. `static/boxcnXYZ.png`.
    pub relative_path: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// The placeholder the renderer emits for `token`.
pub fn placeholder(token: &str) -> String {
    format!("![]({token})")
}

/// Replace every `![](token)` with `![](path)`.
pub fn substitute(markdown: &str, token: &str, path: &str) -> String {
    markdown.replace(&placeholder(token), &format!("![]({path})"))
}

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[\]\(([^()\s]+)\)").unwrap());

/// Apply every resolved asset to `markdown` in one pass, so a substituted
/// path is never itself taken for a token.
pub fn substitute_all(markdown: &str, assets: &[ResolvedAsset]) -> String {
    let paths: HashMap<&str, &str> = assets
        .iter()
        .map(|a| (a.token.as_str(), a.relative_path.as_str()))
        .collect();
    RE_PLACEHOLDER
        .replace_all(markdown, |caps: &Captures<'_>| match paths.get(&caps[1]) {
            Some(path) => format!("![]({path})"),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Forward-slash path of `file_name` under `image_dir`.
pub fn relative_path(image_dir: &str, file_name: &str) -> String {
    let dir = image_dir.trim().trim_end_matches(['/', '\\']).replace('\\', "/");
    if dir.is_empty() || dir == "." {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

/// Fetch each token through `assets`, one limiter token per fetch.
///
/// Stops at the first failure; the caller decides whether that fails a
/// single job or the whole call.
pub async fn resolve_assets(
    tokens: &[String],
    assets: &dyn AssetSource,
    limiter: Option<&TokenBucket>,
    image_dir: &str,
) -> Result<Vec<ResolvedAsset>, Lark2MdError> {
    let mut resolved = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Some(limiter) = limiter {
            limiter.acquire().await;
        }
        let fetched = assets.fetch_asset(token).await?;
        let file_name = safe_file_name(&fetched.file_name, token);
        debug!(token = %token, file = %file_name, bytes = fetched.bytes.len(), "Fetched asset");
        resolved.push(ResolvedAsset {
            token: token.clone(),
            relative_path: relative_path(image_dir, &file_name),
            file_name,
            bytes: fetched.bytes,
        });
    }
    Ok(resolved)
}

/// Keep only the final path component of a source-supplied name.
fn safe_file_name(name: &str, token: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .map(str::to_string)
        .unwrap_or_else(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchedAsset;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubAssets {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetSource for StubAssets {
        async fn fetch_asset(&self, token: &str) -> Result<FetchedAsset, Lark2MdError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match token {
                "bad" => Err(Lark2MdError::AssetFetchFailed {
                    token: token.into(),
                    reason: "404".into(),
                }),
                "sneaky" => Ok(FetchedAsset {
                    file_name: "../../etc/passwd".into(),
                    bytes: vec![],
                }),
                _ => Ok(FetchedAsset {
                    file_name: format!("{token}.png"),
                    bytes: vec![1, 2, 3],
                }),
            }
        }
    }

    #[test]
    fn substitutes_every_occurrence() {
        let md = "![](A)\ntext\n![](A)\n![](AB)\n";
        assert_eq!(
            substitute(md, "A", "static/A.png"),
            "![](static/A.png)\ntext\n![](static/A.png)\n![](AB)\n"
        );
    }

    fn asset(token: &str, path: &str) -> ResolvedAsset {
        ResolvedAsset {
            token: token.into(),
            file_name: path.into(),
            relative_path: path.into(),
            bytes: vec![],
        }
    }

    #[test]
    fn substitution_is_single_pass() {
        // A's path is B's token; B's placeholder must not be rewritten twice.
        let assets = [asset("A", "B"), asset("B", "b.png")];
        assert_eq!(substitute_all("![](A) ![](B)", &assets), "![](B) ![](b.png)");
        assert_eq!(substitute_all("![](B) ![](A)", &assets), "![](b.png) ![](B)");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let assets = [asset("A", "static/A.png")];
        assert_eq!(
            substitute_all("![](A)\n![](Z)\n[link](A)", &assets),
            "![](static/A.png)\n![](Z)\n[link](A)"
        );
    }

    #[test]
    fn relative_path_joins_with_forward_slash() {
        assert_eq!(relative_path("static", "a.png"), "static/a.png");
        assert_eq!(relative_path("img/", "a.png"), "img/a.png");
        assert_eq!(relative_path("assets\\img", "a.png"), "assets/img/a.png");
        assert_eq!(relative_path(".", "a.png"), "a.png");
    }

    #[tokio::test]
    async fn resolves_tokens_in_order() {
        let stub = StubAssets {
            calls: AtomicUsize::new(0),
        };
        let tokens = vec!["A".to_string(), "B".to_string()];
        let resolved = resolve_assets(&tokens, &stub, None, "static").await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].relative_path, "static/A.png");
        assert_eq!(resolved[1].file_name, "B.png");

        let md = substitute_all("![](A) ![](B) ![](A)", &resolved);
        assert_eq!(md, "![](static/A.png) ![](static/B.png) ![](static/A.png)");
    }

    #[tokio::test]
    async fn failure_surfaces_token() {
        let stub = StubAssets {
            calls: AtomicUsize::new(0),
        };
        let tokens = vec!["A".to_string(), "bad".to_string(), "C".to_string()];
        let err = resolve_assets(&tokens, &stub, None, "static").await.unwrap_err();
        assert!(matches!(err, Lark2MdError::AssetFetchFailed { ref token, .. } if token == "bad"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn source_file_names_cannot_escape() {
        let stub = StubAssets {
            calls: AtomicUsize::new(0),
        };
        let resolved = resolve_assets(&["sneaky".to_string()], &stub, None, "static")
            .await
            .unwrap();
        assert_eq!(resolved[0].file_name, "passwd");
    }

    #[tokio::test(start_paused = true)]
    async fn each_fetch_takes_a_limiter_token() {
        let stub = StubAssets {
            calls: AtomicUsize::new(0),
        };
        let bucket = TokenBucket::new(3, 1, Duration::from_secs(1));
        let tokens = vec!["A".to_string(), "B".to_string()];
        resolve_assets(&tokens, &stub, Some(&bucket), "static")
            .await
            .unwrap();
        assert_eq!(bucket.available(), 1);
    }
}
