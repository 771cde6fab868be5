//! The style+script payload that makes annotated markup self-healing once it
//! is rendered in a preview document.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::remediate::RUNTIME_MARKER_ATTR;

// ── Constants ────────────────────────────────────────────────────────────────

pub const SNIPPET_START_MARKER: &str = "<!-- CompAIler image handling (injected) -->";
pub const SNIPPET_END_MARKER: &str = "<!-- /CompAIler image handling -->";

pub const BROKEN_IMAGE_CLASS: &str = "compailer-broken-img";
pub const DISABLED_ANCHOR_CLASS: &str = "compailer-img-disabled-anchor";

/// Delay before the second scan, for content inserted after the first one.
pub const RESCAN_DELAY_MS: u32 = 500;

/// 400×300 placeholder shown in place of an image that failed to load.
pub const PLACEHOLDER_SVG: &str = concat!(
    r#"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300">"#,
    r##"<rect width="100%" height="100%" fill="#f3f3f3"/>"##,
    r##"<text x="50%" y="50%" dominant-baseline="middle" text-anchor="middle" fill="#666" "##,
    r#"font-family="Arial, Helvetica, sans-serif" font-size="16">Image not found</text>"#,
    "</svg>"
);

// ── Lazy statics ─────────────────────────────────────────────────────────────

static BODY_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body>").unwrap());
static HTML_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</html>").unwrap());

static SNIPPET: Lazy<String> = Lazy::new(build_snippet);

// ── Public API ───────────────────────────────────────────────────────────────

/// The injected block, identical for every call.
pub fn runtime_snippet() -> &'static str {
    &SNIPPET
}

/// Insert the runtime snippet before `</body>`, else before `</html>`, else
/// at the end. Empty markup is returned as is.
///
/// Every call inserts a fresh copy; run it once per annotation pass.
pub fn inject_runtime(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let at = BODY_CLOSE_RE
        .find(html)
        .or_else(|| HTML_CLOSE_RE.find(html))
        .map(|m| m.start())
        .unwrap_or(html.len());

    let snippet = runtime_snippet();
    let mut out = String::with_capacity(html.len() + snippet.len());
    out.push_str(&html[..at]);
    out.push_str(snippet);
    out.push_str(&html[at..]);
    out
}

// ── Snippet assembly ─────────────────────────────────────────────────────────

fn build_snippet() -> String {
    // A JSON string literal is a valid JS string literal.
    let svg_literal =
        serde_json::to_string(PLACEHOLDER_SVG).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        r#"
{start}
<style>
.{broken}{{display:inline-block;background:#f3f3f3;color:#666;object-fit:contain;min-width:80px;min-height:50px}}
.{disabled}{{cursor:default;text-decoration:none}}
</style>
<script>
(function(){{
  var doc = document;
  if(doc.__compailerImageHandling) return;
  doc.__compailerImageHandling = true;

  var placeholder = 'data:image/svg+xml;utf8,' + encodeURIComponent({svg});

  function replaceBrokenImage(img){{
    try{{
      if(img.dataset.compailerPlaceholder) return;
      img.dataset.compailerPlaceholder = '1';
      img.src = placeholder;
      img.classList.add('{broken}');
    }}catch(e){{}}
  }}

  function handleElements(){{
    doc.querySelectorAll('img[{marker}]').forEach(function(img){{
      if(!img.__compailerErrorAttached){{
        img.addEventListener('error', function(){{ replaceBrokenImage(img); }});
        img.__compailerErrorAttached = true;
      }}
      try{{ if(img.complete && img.naturalWidth === 0) replaceBrokenImage(img); }}catch(e){{}}
    }});

    doc.querySelectorAll('a[{marker}]').forEach(function(a){{
      if(!a.__compailerAnchorDisabled){{
        a.addEventListener('click', function(e){{ e.preventDefault(); }});
        a.classList.add('{disabled}');
        a.__compailerAnchorDisabled = true;
      }}
    }});
  }}

  if(doc.readyState === 'loading') doc.addEventListener('DOMContentLoaded', handleElements); else handleElements();
  setTimeout(handleElements, {delay});
}})();
</script>
{end}
"#,
        start = SNIPPET_START_MARKER,
        end = SNIPPET_END_MARKER,
        broken = BROKEN_IMAGE_CLASS,
        disabled = DISABLED_ANCHOR_CLASS,
        marker = RUNTIME_MARKER_ATTR,
        svg = svg_literal,
        delay = RESCAN_DELAY_MS,
    )
}
