use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

/// Elements that never contribute readable text.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "template", "svg", "canvas", "nav", "header",
    "footer", "aside", "form", "button", "select", "object", "embed",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "figure", "figcaption", "table", "tr",
    "blockquote", "address", "pre", "dl", "dt", "dd", "ul", "ol",
];

/// Renders an element subtree as plain text: paragraphs separated by blank
/// lines, list items prefixed with `- `, whitespace collapsed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl TextRenderer {
    pub fn render(&self, root: ElementRef) -> String {
        let mut ctx = TextContext::default();
        self.visit_children(root, &mut ctx);
        ctx.into_text()
    }

    fn visit_node(&self, node: NodeRef<'_, Node>, ctx: &mut TextContext) {
        match node.value() {
            Node::Text(text) => ctx.append_text(text),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    self.visit_element(element, ctx);
                }
            }
            _ => {
                for child in node.children() {
                    self.visit_node(child, ctx);
                }
            }
        }
    }

    fn visit_element(&self, element: ElementRef, ctx: &mut TextContext) {
        let tag = element.value().name().to_ascii_lowercase();
        let tag = tag.as_str();
        if SKIPPED_TAGS.contains(&tag) {
            return;
        }
        match tag {
            "br" => ctx.line_break(),
            "hr" => ctx.paragraph_break(),
            "li" => {
                ctx.line_break();
                ctx.append_text("- ");
                self.visit_children(element, ctx);
                ctx.line_break();
            }
            "td" | "th" => {
                self.visit_children(element, ctx);
                ctx.append_text(" ");
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                ctx.paragraph_break();
                self.visit_children(element, ctx);
                ctx.paragraph_break();
            }
            _ if BLOCK_TAGS.contains(&tag) => {
                ctx.paragraph_break();
                self.visit_children(element, ctx);
                ctx.paragraph_break();
            }
            _ => self.visit_children(element, ctx),
        }
    }

    fn visit_children(&self, element: ElementRef, ctx: &mut TextContext) {
        for child in element.children() {
            self.visit_node(child, ctx);
        }
    }
}

#[derive(Default)]
struct TextContext {
    builder: String,
    last_char: Option<char>,
}

impl TextContext {
    fn into_text(self) -> String {
        self.builder
            .lines()
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.last_char.is_none() || matches!(self.last_char, Some(' ') | Some('\n')) {
                    continue;
                }
                self.push_char(' ');
            } else {
                self.push_char(ch);
            }
        }
    }

    fn line_break(&mut self) {
        if self.builder.is_empty() || self.last_char == Some('\n') {
            return;
        }
        self.push_char('\n');
    }

    fn paragraph_break(&mut self) {
        if self.builder.is_empty() || self.builder.ends_with("\n\n") {
            return;
        }
        self.line_break();
        self.push_char('\n');
    }

    fn push_char(&mut self, ch: char) {
        self.builder.push(ch);
        self.last_char = Some(ch);
    }
}
