use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use ego_tree::NodeRef;
use futures_util::stream::{self, StreamExt};
use scraper::node::{Element, Node};
use scraper::{Html, Selector};
use url::Url;

use crate::decode::decode_text;
use crate::http::{essence, BodyLimits, HttpFetcher};

const CONCURRENT_RESOURCES: usize = 8;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Children of these are serialized verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceKind {
    Stylesheet,
    Script,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResourceRef {
    kind: ResourceKind,
    /// Attribute value as written in the page.
    raw: String,
    resolved: Url,
}

#[derive(Debug, Clone)]
enum Inlined {
    Text(String),
    DataUri(String),
}

type InlinedResources = HashMap<(ResourceKind, String), Inlined>;

/// Builds a self-contained HTML snapshot: stylesheets and scripts are pulled
/// into the document and images become `data:` URIs.
///
/// A subresource that fails to load is left out (images keep their
/// original `src`); the snapshot itself still succeeds.
pub struct Inliner<'a> {
    http: &'a HttpFetcher,
    max_resource_bytes: u64,
    resource_timeout: Duration,
}

impl<'a> Inliner<'a> {
    pub fn new(http: &'a HttpFetcher, max_resource_bytes: u64, resource_timeout: Duration) -> Self {
        Self {
            http,
            max_resource_bytes,
            resource_timeout,
        }
    }

    pub async fn inline(&self, html: &str, page_url: &str) -> String {
        let resources = match Url::parse(page_url) {
            Ok(base) => collect_resources(html, &base),
            Err(_) => Vec::new(),
        };

        let inlined: InlinedResources = stream::iter(resources)
            .map(|resource| async move {
                let loaded = self.load(&resource).await;
                (resource, loaded)
            })
            .buffer_unordered(CONCURRENT_RESOURCES)
            .filter_map(|(resource, loaded)| async move {
                loaded.map(|content| ((resource.kind, resource.raw), content))
            })
            .collect()
            .await;

        serialize_inlined(html, &inlined)
    }

    async fn load(&self, resource: &ResourceRef) -> Option<Inlined> {
        let limits = BodyLimits {
            max_bytes: self.max_resource_bytes,
            content_types: &[],
            allow_missing_type: true,
            timeout: Some(self.resource_timeout),
        };
        let output = match self.http.get(resource.resolved.as_str(), &limits).await {
            Ok(output) => output,
            Err(err) => {
                engine_logging::engine_warn!(
                    "Skipping subresource {}: {}",
                    resource.resolved,
                    err
                );
                return None;
            }
        };

        let content_type = output.metadata.content_type.as_deref();
        match resource.kind {
            ResourceKind::Stylesheet | ResourceKind::Script => {
                Some(Inlined::Text(decode_text(&output.bytes, content_type)))
            }
            ResourceKind::Image => {
                let media_type = content_type
                    .map(essence)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let encoded = base64::engine::general_purpose::STANDARD.encode(&output.bytes);
                Some(Inlined::DataUri(format!("data:{media_type};base64,{encoded}")))
            }
        }
    }
}

/// Finds every external stylesheet, script and image the page references.
fn collect_resources(html: &str, page_url: &Url) -> Vec<ResourceRef> {
    let doc = Html::parse_document(html);
    let base = document_base(&doc, page_url);

    let mut found = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let targets = [
        ("link[href]", "href", ResourceKind::Stylesheet),
        ("script[src]", "src", ResourceKind::Script),
        ("img[src]", "src", ResourceKind::Image),
    ];
    for (raw_selector, attr, kind) in targets {
        let Ok(selector) = Selector::parse(raw_selector) else {
            continue;
        };
        for element in doc.select(&selector) {
            if kind == ResourceKind::Stylesheet && !is_stylesheet(element.value()) {
                continue;
            }
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            let Some(resolved) = resolve(&base, raw) else {
                continue;
            };
            if seen.insert((kind, raw.to_string())) {
                found.push(ResourceRef {
                    kind,
                    raw: raw.to_string(),
                    resolved,
                });
            }
        }
    }
    found
}

fn document_base(doc: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| doc.select(&selector).next())
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn resolve(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    let url = base.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn is_stylesheet(element: &Element) -> bool {
    element
        .attr("rel")
        .map(|rel| {
            rel.split_ascii_whitespace()
                .any(|token| token.eq_ignore_ascii_case("stylesheet"))
        })
        .unwrap_or(false)
}

fn serialize_inlined(html: &str, inlined: &InlinedResources) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::with_capacity(html.len());
    let mut serializer = Serializer {
        inlined,
        out: &mut out,
    };
    serializer.node(doc.tree.root(), false);
    out
}

struct Serializer<'a> {
    inlined: &'a InlinedResources,
    out: &'a mut String,
}

impl<'a> Serializer<'a> {
    fn node(&mut self, node: NodeRef<'_, Node>, raw_text: bool) {
        match node.value() {
            Node::Document | Node::Fragment => self.children(node, false),
            Node::Doctype(doctype) => {
                self.out.push_str("<!DOCTYPE ");
                self.out.push_str(doctype.name());
                self.out.push('>');
            }
            Node::Comment(comment) => {
                self.out.push_str("<!--");
                self.out.push_str(comment);
                self.out.push_str("-->");
            }
            Node::Text(text) => {
                if raw_text {
                    self.out.push_str(text);
                } else {
                    escape_text(text, self.out);
                }
            }
            Node::Element(element) => self.element(node, element),
            Node::ProcessingInstruction(_) => {}
        }
    }

    fn children(&mut self, node: NodeRef<'_, Node>, raw_text: bool) {
        for child in node.children() {
            self.node(child, raw_text);
        }
    }

    fn element(&mut self, node: NodeRef<'_, Node>, element: &Element) {
        let name = element.name();
        match name {
            "link" if is_stylesheet(element) => {
                let text = element
                    .attr("href")
                    .and_then(|href| self.text_for(ResourceKind::Stylesheet, href));
                if let Some(css) = text {
                    self.out.push_str("<style>");
                    self.out.push_str(&escape_raw_close(css, "style"));
                    self.out.push_str("</style>");
                }
                return;
            }
            "script" if element.attr("src").is_some() => {
                let text = element
                    .attr("src")
                    .and_then(|src| self.text_for(ResourceKind::Script, src));
                if let Some(js) = text {
                    self.open_tag(element, &["src", "integrity", "crossorigin"], None);
                    self.out.push_str(&escape_raw_close(js, "script"));
                    self.out.push_str("</script>");
                }
                return;
            }
            "img" => {
                let data_uri = element.attr("src").and_then(|src| {
                    match self.inlined.get(&(ResourceKind::Image, src.to_string())) {
                        Some(Inlined::DataUri(uri)) => Some(uri.clone()),
                        _ => None,
                    }
                });
                match data_uri {
                    Some(uri) => self.open_tag(element, &["src", "srcset"], Some(("src", &uri))),
                    None => self.open_tag(element, &[], None),
                }
                return;
            }
            "meta" if declares_charset(element) => return,
            "base" => return,
            _ => {}
        }

        self.open_tag(element, &[], None);
        if name == "head" {
            self.out.push_str("<meta charset=\"utf-8\">");
        }
        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        self.children(node, RAW_TEXT_ELEMENTS.contains(&name));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn text_for(&self, kind: ResourceKind, raw: &str) -> Option<&'a str> {
        let inlined: &'a InlinedResources = self.inlined;
        match inlined.get(&(kind, raw.to_string())) {
            Some(Inlined::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    fn open_tag(&mut self, element: &Element, skip: &[&str], extra: Option<(&str, &str)>) {
        self.out.push('<');
        self.out.push_str(element.name());
        if let Some((name, value)) = extra {
            push_attr(self.out, name, value);
        }
        for (name, value) in element.attrs() {
            if skip.contains(&name) {
                continue;
            }
            push_attr(self.out, name, value);
        }
        self.out.push('>');
    }
}

/// The snapshot is re-encoded as UTF-8, so the page's own declaration goes.
fn declares_charset(element: &Element) -> bool {
    element.attr("charset").is_some()
        || element
            .attr("http-equiv")
            .is_some_and(|value| value.eq_ignore_ascii_case("content-type"))
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

/// Keeps inlined content from closing its own element early.
fn escape_raw_close(content: &str, tag: &str) -> String {
    let needle = format!("</{tag}");
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(pos) = find_ascii_ci(rest, &needle) {
        out.push_str(&rest[..pos]);
        out.push_str("<\\/");
        out.push_str(&rest[pos + 2..pos + needle.len()]);
        rest = &rest[pos + needle.len()..];
    }
    out.push_str(rest);
    out
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
