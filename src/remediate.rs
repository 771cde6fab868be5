//! Broken-image remediation: the annotation pass.
//!
//! Generated markup is parsed with `scraper`, the targeted elements are
//! edited in place on the tree, and the tree is written back out through
//! html5ever's serializer:
//!
//! - every `<img>` gets `loading="lazy"` (unless it already has a value),
//!   loses inline `onerror`/`onclick` handlers and carries the runtime marker;
//! - every `<a>` wrapping an `<img>` has its `href` parked in
//!   `data-disabled-href` and carries the runtime marker.
//!
//! Nothing else is touched. The pass never fails: anything that keeps the
//! tree from being produced yields [`Annotation::Degraded`] with the original
//! markup and a literal `<img` count.

use std::io;

use ego_tree::iter::Edge;
use ego_tree::{NodeId, NodeRef};
use html5ever::serialize::{serialize, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::{LocalName, Namespace, QualName};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::{Doctype, Element, Node};
use scraper::{Html, Selector, StrTendril};

use crate::models::AnnotatedDocument;

// ── Constants ────────────────────────────────────────────────────────────────

/// Boolean-style attribute the injected runtime queries for.
pub const RUNTIME_MARKER_ATTR: &str = "data-compailer";
/// Holds an anchor's original destination once its `href` is removed.
pub const DISABLED_HREF_ATTR: &str = "data-disabled-href";

pub const DEFAULT_MAX_INPUT_BYTES: usize = 2 * 1024 * 1024;

const STRIPPED_IMG_HANDLERS: &[&str] = &["onerror", "onclick"];

// ── Lazy statics ─────────────────────────────────────────────────────────────

static IMG_LITERAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img\b").unwrap());

/// A document shell opens the markup: only whitespace, comments or an XML
/// prolog may precede it.
static DOCUMENT_SHELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\A(?:\s+|<!--.*?-->|<\?.*?\?>)*<(?:!doctype|html|head|body)[\s>/]").unwrap()
});

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    /// When false the pass behaves as if no HTML parser were available.
    pub dom_parsing: bool,
    pub max_input_bytes: usize,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            dom_parsing: true,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DegradeReason {
    #[error("no markup to annotate")]
    EmptyInput,
    #[error("DOM parsing disabled, count-only pass")]
    CountOnly,
    #[error("markup exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("serialization failed: {0}")]
    Serialize(String),
    #[error("annotation task interrupted: {0}")]
    Interrupted(String),
}

/// Outcome of [`annotate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Annotated(AnnotatedDocument),
    /// The input came back untouched; `fixed_count` is a literal scan.
    Degraded {
        document: AnnotatedDocument,
        reason: DegradeReason,
    },
}

impl Annotation {
    pub fn document(&self) -> &AnnotatedDocument {
        match self {
            Annotation::Annotated(doc) => doc,
            Annotation::Degraded { document, .. } => document,
        }
    }

    pub fn into_document(self) -> AnnotatedDocument {
        match self {
            Annotation::Annotated(doc) => doc,
            Annotation::Degraded { document, .. } => document,
        }
    }

    pub fn degrade_reason(&self) -> Option<&DegradeReason> {
        match self {
            Annotation::Annotated(_) => None,
            Annotation::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degrade_reason().is_some()
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Annotate generated markup for runtime image handling.
///
/// Parsing happens on the blocking pool. Callers that issue several passes
/// for the same preview must discard stale results themselves (see
/// [`crate::preview::PreviewSurface`]).
pub async fn annotate(html: &str, options: &AnnotateOptions) -> Annotation {
    run_pass(html, options, annotate_markup).await
}

/// Case-insensitive count of literal `<img` tags, used when the tree is
/// unavailable.
pub fn count_img_literals(html: &str) -> usize {
    IMG_LITERAL_RE.find_iter(html).count()
}

/// Synchronous core of [`annotate`]: parse, rewrite, serialize.
pub fn annotate_markup(html: &str) -> io::Result<AnnotatedDocument> {
    let is_document = is_full_document(html);
    let mut parsed = if is_document {
        Html::parse_document(html)
    } else {
        Html::parse_fragment(html)
    };

    let targets = Targets::collect(&parsed);
    for &id in &targets.images {
        if let Some(mut node) = parsed.tree.get_mut(id) {
            if let Node::Element(element) = node.value() {
                mark_image(element);
            }
        }
    }
    for &id in &targets.anchors {
        if let Some(mut node) = parsed.tree.get_mut(id) {
            if let Node::Element(element) = node.value() {
                mark_anchor(element);
            }
        }
    }

    // Fragments are parsed under a synthetic <html> root element.
    let root = if is_document {
        parsed.tree.root()
    } else {
        *parsed.root_element()
    };

    let mut out = Vec::with_capacity(html.len() + 64 * targets.images.len());
    serialize(&mut out, &Markup(root), SerializeOpts::default())?;
    let html = String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(AnnotatedDocument {
        html,
        fixed_count: targets.images.len(),
    })
}

/// Whether the markup opens with a doctype or an `<html>`/`<head>`/`<body>`
/// tag. Shell tags further in (inside scripts, after content) do not count.
pub fn is_full_document(html: &str) -> bool {
    DOCUMENT_SHELL_RE.is_match(html)
}

async fn run_pass<F>(html: &str, options: &AnnotateOptions, pass: F) -> Annotation
where
    F: FnOnce(&str) -> io::Result<AnnotatedDocument> + Send + 'static,
{
    if html.is_empty() {
        return degraded(html, DegradeReason::EmptyInput);
    }
    if !options.dom_parsing {
        return degraded(html, DegradeReason::CountOnly);
    }
    if html.len() > options.max_input_bytes {
        return degraded(
            html,
            DegradeReason::TooLarge {
                limit: options.max_input_bytes,
            },
        );
    }

    let owned = html.to_string();
    match tokio::task::spawn_blocking(move || pass(&owned)).await {
        Ok(Ok(document)) => {
            tracing::debug!(fixed_count = document.fixed_count, "annotated markup");
            Annotation::Annotated(document)
        }
        Ok(Err(e)) => degraded(html, DegradeReason::Serialize(e.to_string())),
        Err(e) => degraded(html, DegradeReason::Interrupted(e.to_string())),
    }
}

fn degraded(html: &str, reason: DegradeReason) -> Annotation {
    let fixed_count = if html.is_empty() {
        0
    } else {
        count_img_literals(html)
    };
    match &reason {
        DegradeReason::EmptyInput => tracing::debug!("nothing to annotate"),
        other => tracing::warn!(reason = %other, fixed_count, "annotation degraded to pass-through"),
    }
    Annotation::Degraded {
        document: AnnotatedDocument {
            html: html.to_string(),
            fixed_count,
        },
        reason,
    }
}

// ── Target discovery ─────────────────────────────────────────────────────────

struct Targets {
    images: Vec<NodeId>,
    anchors: Vec<NodeId>,
}

impl Targets {
    fn collect(document: &Html) -> Self {
        let images = document.select(&IMG_SELECTOR).map(|img| img.id()).collect();
        let anchors = document
            .select(&ANCHOR_SELECTOR)
            .filter(|a| a.select(&IMG_SELECTOR).next().is_some())
            .map(|a| a.id())
            .collect();
        Self { images, anchors }
    }
}

// ── Attribute rewriting ──────────────────────────────────────────────────────

type Attributes = Vec<(QualName, StrTendril)>;

fn mark_image(element: &mut Element) {
    let attrs = &mut element.attrs;
    attrs.retain(|(name, _)| !STRIPPED_IMG_HANDLERS.iter().any(|h| is_plain(name, h)));

    match position(attrs, "loading") {
        Some(i) if attrs[i].1.is_empty() => attrs[i].1 = StrTendril::from_slice("lazy"),
        Some(_) => {}
        None => attrs.push((plain_name("loading"), StrTendril::from_slice("lazy"))),
    }
    add_marker(attrs);
    sort(attrs);
}

fn mark_anchor(element: &mut Element) {
    let attrs = &mut element.attrs;

    if let Some(i) = position(attrs, "href").filter(|&i| !attrs[i].1.is_empty()) {
        // A live href wins over a stale parked value.
        let (_, href) = attrs.remove(i);
        match position(attrs, DISABLED_HREF_ATTR) {
            Some(j) => attrs[j].1 = href,
            None => attrs.push((plain_name(DISABLED_HREF_ATTR), href)),
        }
    }
    add_marker(attrs);
    sort(attrs);
}

fn add_marker(attrs: &mut Attributes) {
    if position(attrs, RUNTIME_MARKER_ATTR).is_none() {
        attrs.push((plain_name(RUNTIME_MARKER_ATTR), StrTendril::from_slice("1")));
    }
}

/// `Element::attr` binary-searches, so the list stays sorted by name.
fn sort(attrs: &mut Attributes) {
    attrs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
}

fn position(attrs: &Attributes, local: &str) -> Option<usize> {
    attrs.iter().position(|(name, _)| is_plain(name, local))
}

fn is_plain(name: &QualName, local: &str) -> bool {
    name.prefix.is_none() && name.ns.is_empty() && &*name.local == local
}

fn plain_name(local: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(local))
}

// ── Serialization ────────────────────────────────────────────────────────────

/// The children of a tree node, written through html5ever's serializer.
struct Markup<'a>(NodeRef<'a, Node>);

impl Serialize for Markup<'_> {
    fn serialize<S: Serializer>(&self, serializer: &mut S, _: TraversalScope) -> io::Result<()> {
        let root = self.0;
        for edge in root.traverse() {
            match edge {
                Edge::Open(node) if node != root => open_node(node, serializer)?,
                Edge::Close(node) if node != root => {
                    if let Some(element) = node.value().as_element() {
                        serializer.end_elem(element.name.clone())?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn open_node<S: Serializer>(node: NodeRef<'_, Node>, serializer: &mut S) -> io::Result<()> {
    match node.value() {
        Node::Document | Node::Fragment => Ok(()),
        Node::Doctype(doctype) => serializer.write_doctype(&doctype_declaration(doctype)),
        Node::Comment(comment) => serializer.write_comment(&comment.comment),
        Node::Text(text) => serializer.write_text(&text.text),
        Node::ProcessingInstruction(pi) => {
            serializer.write_processing_instruction(&pi.target, &pi.data)
        }
        Node::Element(element) => {
            let attrs = element.attrs.iter().map(|(name, value)| (name, &**value));
            serializer.start_elem(element.name.clone(), attrs)?;
            // The parser drops one leading newline in these elements.
            if matches!(element.name(), "pre" | "textarea" | "listing")
                && first_text_starts_with_newline(node)
            {
                serializer.write_text("\n")?;
            }
            Ok(())
        }
    }
}

/// Name plus public/system identifiers, as written after `<!DOCTYPE `.
fn doctype_declaration(doctype: &Doctype) -> String {
    let mut decl = doctype.name().to_string();
    match (doctype.public_id(), doctype.system_id()) {
        ("", "") => {}
        ("", system) => decl.push_str(&format!(" SYSTEM \"{}\"", system)),
        (public, "") => decl.push_str(&format!(" PUBLIC \"{}\"", public)),
        (public, system) => decl.push_str(&format!(" PUBLIC \"{}\" \"{}\"", public, system)),
    }
    decl
}

fn first_text_starts_with_newline(node: NodeRef<'_, Node>) -> bool {
    node.first_child()
        .and_then(|child| child.value().as_text())
        .map(|text| text.text.starts_with('\n'))
        .unwrap_or(false)
}
