//! Inline text rendering: a run of styled spans → one Markdown line.
//!
//! Elements render independently and are concatenated; the run always ends
//! with a newline. A text run carries at most one piece of markup even when
//! several style flags are set. The first flag in this order wins:
//!
//! | flag            | `use_html_tags` | Markdown mode |
//! |-----------------|-----------------|---------------|
//! | bold            | `<strong>…</strong>` | `**…**`  |
//! | italic          | `<em>…</em>`    | `_…_`         |
//! | strikethrough   | `<del>…</del>`  | `~~…~~`       |
//! | underline       | `<u>…</u>`      | `<u>…</u>`    |
//! | inline code     | `` `…` ``       | `` `…` ``     |
//! | link            | `[…](url)`      | `[…](url)`    |

use crate::model::{BlockText, TextElement, TextStyle};
use percent_encoding::percent_decode_str;

/// Render a text payload, newline-terminated.
pub fn render_text(text: &BlockText, use_html_tags: bool) -> String {
    let inline = text.elements.len() > 1;
    let mut out = String::new();
    for element in &text.elements {
        push_element(&mut out, element, inline, use_html_tags);
    }
    out.push('\n');
    out
}

fn push_element(out: &mut String, element: &TextElement, inline: bool, use_html_tags: bool) {
    match element {
        TextElement::TextRun { content, style } => {
            let (open, close) = markup(style, use_html_tags);
            out.push_str(&open);
            out.push_str(content);
            out.push_str(&close);
        }
        TextElement::MentionUser { user_id } => out.push_str(user_id),
        TextElement::MentionDoc { title, url } => {
            out.push('[');
            out.push_str(title);
            out.push_str("](");
            out.push_str(&decode_url(url));
            out.push(')');
        }
        TextElement::InlineEquation { content } => {
            let delimiter = if inline { "$" } else { "$$" };
            out.push_str(delimiter);
            out.push_str(content.strip_suffix('\n').unwrap_or(content));
            out.push_str(delimiter);
        }
    }
}

/// Opening and closing markup for the highest-precedence style flag.
fn markup(style: &TextStyle, use_html_tags: bool) -> (String, String) {
    let pair = |open: &str, close: &str| (open.to_string(), close.to_string());
    if style.bold {
        if use_html_tags {
            pair("<strong>", "</strong>")
        } else {
            pair("**", "**")
        }
    } else if style.italic {
        if use_html_tags {
            pair("<em>", "</em>")
        } else {
            pair("_", "_")
        }
    } else if style.strikethrough {
        if use_html_tags {
            pair("<del>", "</del>")
        } else {
            pair("~~", "~~")
        }
    } else if style.underline {
        pair("<u>", "</u>")
    } else if style.inline_code {
        pair("`", "`")
    } else if let Some(link) = &style.link {
        (String::from("["), format!("]({})", decode_url(&link.url)))
    } else {
        (String::new(), String::new())
    }
}

/// Percent-decode a vendor link target. Anything that does not decode to
/// valid UTF-8 is returned unchanged.
pub fn decode_url(url: &str) -> String {
    match percent_decode_str(url).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Link;

    fn run(content: &str, style: TextStyle) -> BlockText {
        BlockText::new(vec![TextElement::styled(content, style)])
    }

    #[test]
    fn plain_run_ends_with_newline() {
        assert_eq!(render_text(&BlockText::plain("hello"), false), "hello\n");
        assert_eq!(render_text(&BlockText::default(), false), "\n");
    }

    #[test]
    fn bold_wins_over_italic() {
        let style = TextStyle {
            bold: true,
            italic: true,
            ..TextStyle::default()
        };
        assert_eq!(render_text(&run("content", style.clone()), false), "**content**\n");
        assert_eq!(
            render_text(&run("content", style), true),
            "<strong>content</strong>\n"
        );
    }

    // Regression guard for the single-markup cascade: a run that is both
    // struck through and a link renders only the strikethrough.
    #[test]
    fn cascade_drops_lower_flags() {
        let style = TextStyle {
            strikethrough: true,
            inline_code: true,
            link: Some(Link {
                url: "https://x.test".into(),
            }),
            ..TextStyle::default()
        };
        assert_eq!(render_text(&run("gone", style), false), "~~gone~~\n");

        let style = TextStyle {
            inline_code: true,
            link: Some(Link {
                url: "https://x.test".into(),
            }),
            ..TextStyle::default()
        };
        assert_eq!(render_text(&run("x()", style), true), "`x()`\n");
    }

    #[test]
    fn markdown_and_html_markup() {
        let italic = TextStyle::italic();
        assert_eq!(render_text(&run("i", italic.clone()), false), "_i_\n");
        assert_eq!(render_text(&run("i", italic), true), "<em>i</em>\n");

        let strike = TextStyle {
            strikethrough: true,
            ..TextStyle::default()
        };
        assert_eq!(render_text(&run("s", strike.clone()), false), "~~s~~\n");
        assert_eq!(render_text(&run("s", strike), true), "<del>s</del>\n");

        let underline = TextStyle {
            underline: true,
            ..TextStyle::default()
        };
        assert_eq!(render_text(&run("u", underline), false), "<u>u</u>\n");
    }

    #[test]
    fn link_is_percent_decoded() {
        let text = run(
            "docs",
            TextStyle::link("https%3A%2F%2Fexample.com%2Fa%20b%3Fq%3D1"),
        );
        assert_eq!(
            render_text(&text, false),
            "[docs](https://example.com/a b?q=1)\n"
        );
    }

    #[test]
    fn undecodable_link_is_left_alone() {
        // %FF is not valid UTF-8 on its own.
        assert_eq!(decode_url("https://x.test/%FF"), "https://x.test/%FF");
        assert_eq!(decode_url("plain"), "plain");
    }

    #[test]
    fn mentions_render_inline() {
        let text = BlockText::new(vec![
            TextElement::plain("ping "),
            TextElement::MentionUser {
                user_id: "ou_42".into(),
            },
            TextElement::plain(" see "),
            TextElement::MentionDoc {
                title: "Design".into(),
                url: "https%3A%2F%2Fdocs.test%2Fd".into(),
            },
        ]);
        assert_eq!(
            render_text(&text, false),
            "ping ou_42 see [Design](https://docs.test/d)\n"
        );
    }

    #[test]
    fn equation_delimiters_depend_on_run_length() {
        let alone = BlockText::new(vec![TextElement::InlineEquation {
            content: "E=mc^2\n".into(),
        }]);
        assert_eq!(render_text(&alone, false), "$$E=mc^2$$\n");

        let mixed = BlockText::new(vec![
            TextElement::plain("where "),
            TextElement::InlineEquation {
                content: "x^2".into(),
            },
        ]);
        assert_eq!(render_text(&mixed, false), "where $x^2$\n");
    }
}
