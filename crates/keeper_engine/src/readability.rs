use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::text::TextRenderer;

const EXCERPT_CHARS: usize = 200;

/// Selectors tried in order before falling back to paragraph density.
const CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=main]"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub excerpt: String,
    pub text_content: String,
    pub content_html: String,
}

/// The JSON document stored as the readability artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadableDocument {
    pub url: String,
    pub title: Option<String>,
    pub byline: Option<String>,
    pub excerpt: String,
    pub text_content: String,
    pub content_html: String,
    /// Length of `text_content` in characters.
    pub length: usize,
}

impl ReadableDocument {
    pub fn new(url: impl Into<String>, content: ExtractedContent) -> Self {
        let length = content.text_content.chars().count();
        Self {
            url: url.into(),
            title: content.title,
            byline: content.byline,
            excerpt: content.excerpt,
            text_content: content.text_content,
            content_html: content.content_html,
            length,
        }
    }
}

pub trait Extractor: Send + Sync {
    /// Returns `None` when the page has no readable text.
    fn extract(&self, html: &str) -> Option<ExtractedContent>;
}

/// Readability-style extractor:
/// - title from `og:title`, else `<title>`
/// - main content from `<article>`, `<main>` or `[role=main]`
/// - otherwise the element holding the most paragraph text
/// - fallback to `<body>`.
#[derive(Debug, Default)]
pub struct ReadabilityExtractor {
    renderer: TextRenderer,
}

impl Extractor for ReadabilityExtractor {
    fn extract(&self, html: &str) -> Option<ExtractedContent> {
        let doc = Html::parse_document(html);

        let title = meta_content(&doc, r#"meta[property="og:title"]"#)
            .or_else(|| first_text(&doc, "title"));
        let byline = meta_content(&doc, r#"meta[name="author"]"#);

        let content = self.main_content(&doc)?;
        let text_content = self.renderer.render(content);
        if text_content.is_empty() {
            return None;
        }

        let excerpt = meta_content(&doc, r#"meta[name="description"]"#)
            .unwrap_or_else(|| first_paragraph(&text_content));

        Some(ExtractedContent {
            title,
            byline,
            excerpt,
            text_content,
            content_html: content.inner_html(),
        })
    }
}

impl ReadabilityExtractor {
    fn main_content<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        for raw in CONTENT_SELECTORS {
            let Ok(selector) = Selector::parse(raw) else {
                continue;
            };
            let found = doc
                .select(&selector)
                .find(|candidate| !self.renderer.render(*candidate).is_empty());
            if found.is_some() {
                return found;
            }
        }

        densest_paragraph_parent(doc).or_else(|| {
            let body = Selector::parse("body").ok()?;
            doc.select(&body).next()
        })
    }
}

/// The element whose direct `<p>` children carry the most text.
fn densest_paragraph_parent(doc: &Html) -> Option<ElementRef<'_>> {
    let paragraph = Selector::parse("p").ok()?;
    let mut scores: HashMap<NodeId, usize> = HashMap::new();
    for p in doc.select(&paragraph) {
        let len = p.text().map(|t| t.trim().len()).sum::<usize>();
        if len == 0 {
            continue;
        }
        if let Some(parent) = p.parent() {
            *scores.entry(parent.id()).or_default() += len;
        }
    }

    scores
        .into_iter()
        .max_by_key(|(id, score)| (*score, std::cmp::Reverse(*id)))
        .and_then(|(id, _)| doc.tree.get(id))
        .and_then(ElementRef::wrap)
}

fn meta_content(doc: &Html, raw: &str) -> Option<String> {
    let selector = Selector::parse(raw).ok()?;
    doc.select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

fn first_text(doc: &Html, raw: &str) -> Option<String> {
    let selector = Selector::parse(raw).ok()?;
    doc.select(&selector)
        .next()
        .map(|node| node.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

fn first_paragraph(text: &str) -> String {
    let paragraph = text.split("\n\n").next().unwrap_or_default();
    paragraph.chars().take(EXCERPT_CHARS).collect()
}
