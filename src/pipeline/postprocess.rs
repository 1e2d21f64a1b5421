//! Post-processing: deterministic cleanup of rendered Markdown.
//!
//! The renderer's output is already well formed; this pass only tidies the
//! seams between independently rendered blocks. It is the default
//! [`MarkdownFormatter`] and can be swapped out through
//! [`crate::source::Sources::with_formatter`].
//!
//! ## Rules (applied in one pass, in this order per line)
//!
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Trim trailing whitespace
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Collapse runs of blank lines to one, drop leading blank lines
//! 5. Ensure a blank line before every column-0 heading
//! 6. Put a space between CJK and Latin letters or digits
//! 7. End the document with exactly one newline
//!
//! Lines inside fenced code blocks are copied through untouched. A fence
//! closes only on a run of the same character at least as long as the one
//! that opened it. Every rule is idempotent, so formatting twice gives the
//! same text as formatting once.

use crate::source::MarkdownFormatter;
use once_cell::sync::Lazy;
use regex::Regex;

/// The built-in formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupFormatter;

impl MarkdownFormatter for CleanupFormatter {
    fn format(&self, markdown: &str) -> String {
        clean_markdown(markdown)
    }
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,9} ").unwrap());

static RE_CJK_THEN_LATIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}])([A-Za-z0-9])").unwrap()
});

static RE_LATIN_THEN_CJK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9])([\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}])").unwrap()
});

/// An open code fence: its character and run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

/// Apply every rule to `input`.
pub fn clean_markdown(input: &str) -> String {
    let text = normalise_line_endings(input);
    let mut out: Vec<String> = Vec::new();
    let mut open_fence: Option<Fence> = None;

    for raw in text.split('\n') {
        let fence = parse_fence(raw);

        // ── Inside a fence: verbatim ──────────────────────────────────────
        if let Some(open) = open_fence {
            out.push(raw.to_string());
            if fence.is_some_and(|f| closes(open, f, raw)) {
                open_fence = None;
            }
            continue;
        }

        let line = remove_invisible_chars(raw.trim_end());

        // ── Blank lines ───────────────────────────────────────────────────
        if line.is_empty() {
            if out.last().is_some_and(|l| !l.is_empty()) {
                out.push(String::new());
            }
            continue;
        }

        // ── Heading spacing ───────────────────────────────────────────────
        if RE_HEADING.is_match(&line) && out.last().is_some_and(|l| !l.is_empty()) {
            out.push(String::new());
        }

        let line = match fence {
            Some(f) => {
                open_fence = Some(f);
                line
            }
            None => add_cjk_spacing(&line),
        };
        out.push(line);
    }

    ensure_final_newline(&out.join("\n"))
}

fn parse_fence(line: &str) -> Option<Fence> {
    let t = line.trim_start();
    let marker = t.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = t.chars().take_while(|c| *c == marker).count();
    (len >= 3).then_some(Fence { marker, len })
}

/// A closing fence repeats the opening character at least as many times and
/// carries nothing else.
fn closes(open: Fence, candidate: Fence, line: &str) -> bool {
    candidate.marker == open.marker
        && candidate.len >= open.len
        && line.trim().chars().all(|c| c == open.marker)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{2060}'], "")
}

// ── Rule 6: CJK / Latin spacing ──────────────────────────────────────────────

fn add_cjk_spacing(line: &str) -> String {
    // Inline code and link targets keep their exact text.
    if line.contains('`') || line.contains("](") || line.contains('<') {
        return line.to_string();
    }
    let spaced = RE_CJK_THEN_LATIN.replace_all(line, "$1 $2");
    RE_LATIN_THEN_CJK.replace_all(&spaced, "$1 $2").into_owned()
}

// ── Rule 7: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end_matches('\n');
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(clean_markdown("a\r\n\r\nb"), "a\n\nb\n");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(clean_markdown("  hello   \nworld  "), "  hello\nworld\n");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(clean_markdown("\n\na\n\n\n\n\n\nb"), "a\n\nb\n");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello"), "hello\n");
        assert_eq!(ensure_final_newline("hello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_heading_spacing() {
        let result = clean_markdown("some text\n# Heading\nmore text");
        assert_eq!(result, "some text\n\n# Heading\nmore text\n");
        // Not a heading: no space after the hashes.
        assert_eq!(clean_markdown("a\n#tag"), "a\n#tag\n");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_fenced_code_untouched() {
        let input = "text\n```python\nx = 1   \n\n\n\n# comment\n```\n# After";
        let result = clean_markdown(input);
        assert_eq!(
            result,
            "text\n```python\nx = 1   \n\n\n\n# comment\n```\n\n# After\n"
        );
    }

    #[test]
    fn test_indented_fence_is_tracked() {
        let input = "- item\n    ```\n    # not a heading\n    ```\n";
        assert_eq!(clean_markdown(input), input);
    }

    #[test]
    fn test_longer_fence_survives_inner_backticks() {
        let input = "````md\n```rust\n\n\n# inside\n```\n````\n# After";
        assert_eq!(
            clean_markdown(input),
            "````md\n```rust\n\n\n# inside\n```\n````\n\n# After\n"
        );
    }

    #[test]
    fn test_cjk_latin_spacing() {
        assert_eq!(clean_markdown("使用Rust编写"), "使用 Rust 编写\n");
        assert_eq!(clean_markdown("共3个文件"), "共 3 个文件\n");
        assert_eq!(clean_markdown("已有 空格 ok"), "已有 空格 ok\n");
    }

    #[test]
    fn test_cjk_spacing_skips_code_and_links() {
        assert_eq!(clean_markdown("```\n中文abc\n```"), "```\n中文abc\n```\n");
        assert_eq!(clean_markdown("见`中文abc`"), "见`中文abc`\n");
        assert_eq!(
            clean_markdown("![](static/图片1.png)"),
            "![](static/图片1.png)\n"
        );
    }

    #[test]
    fn test_idempotent() {
        let input = "# T\r\n\r\n\r\npara中文abc  \n## S\n```\n  \n```\n\n\n";
        let once = clean_markdown(input);
        assert_eq!(clean_markdown(&once), once);
    }

    #[test]
    fn test_formatter_trait() {
        let f = CleanupFormatter;
        assert_eq!(f.format("a\n\n\n"), "a\n");
    }
}
