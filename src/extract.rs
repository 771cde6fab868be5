use once_cell::sync::Lazy;
use regex::Regex;

// ── Lazy static regexes ──────────────────────────────────────────────────────

// Opening fence, optional language tag, optional newline, then the shortest
// interior up to the next fence.
static FENCED_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_]+)?\n?(.*?)```").unwrap());

// ── Public API ───────────────────────────────────────────────────────────────

/// Pull the first fenced code block out of a model response.
///
/// Falls back to the trimmed response when there is no fenced block, and to
/// an empty string when there is no response at all. Never fails.
pub fn extract_code(response: Option<&str>) -> String {
    let text = match response {
        Some(t) if !t.is_empty() => t,
        _ => return String::new(),
    };

    match FENCED_BLOCK_RE.captures(text).and_then(|cap| cap.get(1)) {
        Some(interior) => interior.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn returns_interior_of_tagged_block() {
        let text = "Here it is:\n```html\n<div>hi</div>\n```\nEnjoy!";
        assert_eq!(extract_code(Some(text)), "<div>hi</div>");
    }

    #[test]
    fn language_tag_does_not_change_interior() {
        let tagged = "```html\n  <p>\n    body\n  </p>\n```";
        let untagged = "```\n  <p>\n    body\n  </p>\n```";
        assert_eq!(extract_code(Some(tagged)), extract_code(Some(untagged)));
        assert_eq!(extract_code(Some(tagged)), "<p>\n    body\n  </p>");
    }

    #[test]
    fn only_first_block_is_used() {
        let text = "```css\nbody{}\n```\nand\n```html\n<b>x</b>\n```";
        assert_eq!(extract_code(Some(text)), "body{}");
    }

    #[test]
    fn plain_text_is_trimmed_identity() {
        assert_eq!(
            extract_code(Some("  <section>raw</section>\n\n")),
            "<section>raw</section>"
        );
    }

    #[test]
    fn unterminated_fence_falls_back_to_text() {
        let text = "```html\n<div>never closed</div>";
        assert_eq!(extract_code(Some(text)), text);
    }

    #[test]
    fn empty_and_missing_input_yield_empty_string() {
        assert_eq!(extract_code(None), "");
        assert_eq!(extract_code(Some("")), "");
        assert_eq!(extract_code(Some("   \n")), "");
    }

    #[test]
    fn internal_whitespace_is_preserved() {
        let text = "```\n\n<ul>\n\t<li>a</li>\n\n\t<li>b</li>\n</ul>\n\n```";
        assert_eq!(
            extract_code(Some(text)),
            "<ul>\n\t<li>a</li>\n\n\t<li>b</li>\n</ul>"
        );
    }
}
