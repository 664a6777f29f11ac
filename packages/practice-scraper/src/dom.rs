//! Typed document tree.
//!
//! HTML is parsed once with `scraper` (html5ever) and converted into an owned
//! [`Node`] tree. Everything downstream (link extraction, main-content
//! detection, roster narrowing) is a pure function over this tree, which keeps
//! the heuristics testable with hand-built fixtures.

use scraper::{ElementRef, Html};

/// Nesting beyond this depth is dropped during conversion.
const MAX_DEPTH: usize = 256;

/// Elements whose text is never visible prose.
const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "head", "select", "button",
];

/// Elements that start a new text block.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

/// Kind of a node in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element {
        /// Lowercase tag name
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

/// A node and its ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

/// Control value returned by [`Node::walk`] visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    SkipChildren,
}

impl Node {
    /// Build an element node.
    pub fn element(tag: &str, attrs: &[(&str, &str)], children: Vec<Node>) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            children,
        }
    }

    /// Build a text node.
    pub fn text(text: &str) -> Self {
        Self {
            kind: NodeKind::Text(text.to_string()),
            children: Vec::new(),
        }
    }

    /// Tag name for elements.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn is_tag(&self, name: &str) -> bool {
        self.tag() == Some(name)
    }

    /// Attribute value by (lowercase) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c.eq_ignore_ascii_case(class))
    }

    /// True for elements whose text is never rendered as prose.
    pub fn is_non_content(&self) -> bool {
        self.tag()
            .map(|tag| NON_CONTENT_TAGS.contains(&tag))
            .unwrap_or(false)
    }

    pub fn is_block(&self) -> bool {
        self.tag().map(|tag| BLOCK_TAGS.contains(&tag)).unwrap_or(false)
    }

    /// Pre-order iterator over this node and every descendant.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// First node (pre-order) matching `pred`.
    pub fn find<P>(&self, mut pred: P) -> Option<&Node>
    where
        P: FnMut(&Node) -> bool,
    {
        self.descendants().find(|node| pred(node))
    }

    /// First element with the given tag.
    pub fn find_tag(&self, tag: &str) -> Option<&Node> {
        self.find(|node| node.is_tag(tag))
    }

    /// Visit nodes pre-order together with their ancestor chain (root first).
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a Node, &[&'a Node]) -> Walk,
    {
        let mut ancestors = Vec::new();
        walk_inner(self, &mut ancestors, visit);
    }

    /// Visible text with whitespace collapsed.
    pub fn text_content(&self) -> String {
        let mut raw = String::new();
        append_text(self, &mut raw);
        collapse_whitespace(&raw)
    }

    /// Character count of [`Node::text_content`].
    pub fn text_len(&self) -> usize {
        self.text_content().chars().count()
    }

    /// Ordered, whitespace-collapsed text blocks.
    ///
    /// Subtrees for which `skip` returns true are left out entirely; `skip`
    /// sees each element with its ancestors, outermost first. Block elements
    /// (`p`, `li`, headings, `div`, ...) end the current block.
    pub fn blocks(&self, skip: &dyn Fn(&Node, &[&Node]) -> bool) -> Vec<String> {
        self.blocks_within(&[], skip)
    }

    /// [`Node::blocks`] for a node whose own ancestors are `context`.
    pub fn blocks_within<'a>(
        &'a self,
        context: &[&'a Node],
        skip: &dyn Fn(&Node, &[&Node]) -> bool,
    ) -> Vec<String> {
        let mut out = Vec::new();
        let mut buf = String::new();
        let mut ancestors = context.to_vec();
        collect_blocks(self, skip, &mut ancestors, &mut buf, &mut out);
        flush(&mut buf, &mut out);
        out
    }
}

/// Pre-order iterator returned by [`Node::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

fn walk_inner<'a, F>(node: &'a Node, ancestors: &mut Vec<&'a Node>, visit: &mut F)
where
    F: FnMut(&'a Node, &[&'a Node]) -> Walk,
{
    if visit(node, ancestors) == Walk::SkipChildren {
        return;
    }
    ancestors.push(node);
    for child in &node.children {
        walk_inner(child, ancestors, visit);
    }
    ancestors.pop();
}

fn append_text(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Element { .. } if node.is_non_content() => {}
        NodeKind::Element { tag, .. } if tag == "br" => out.push(' '),
        _ => {
            let block = node.is_block();
            if block {
                out.push(' ');
            }
            for child in &node.children {
                append_text(child, out);
            }
            if block {
                out.push(' ');
            }
        }
    }
}

fn collect_blocks<'a>(
    node: &'a Node,
    skip: &dyn Fn(&Node, &[&Node]) -> bool,
    ancestors: &mut Vec<&'a Node>,
    buf: &mut String,
    out: &mut Vec<String>,
) {
    match &node.kind {
        NodeKind::Text(text) => buf.push_str(text),
        NodeKind::Element { .. } if node.is_non_content() || skip(node, ancestors) => {}
        NodeKind::Element { tag, .. } if tag == "br" => buf.push(' '),
        _ => {
            let block = node.is_block();
            if block {
                flush(buf, out);
            }
            ancestors.push(node);
            for child in &node.children {
                collect_blocks(child, skip, ancestors, buf, out);
            }
            ancestors.pop();
            if block {
                flush(buf, out);
            }
        }
    }
}

fn flush(buf: &mut String, out: &mut Vec<String>) {
    let text = collapse_whitespace(buf);
    if !text.is_empty() {
        out.push(text);
    }
    buf.clear();
}

/// Collapse runs of whitespace (including NBSP) into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A parsed HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Node,
}

impl Document {
    /// Parse HTML. Never fails; malformed markup is repaired by html5ever.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let root = Node {
            kind: NodeKind::Document,
            children: vec![convert(parsed.root_element(), 0)],
        };
        Self { root }
    }

    /// Wrap an existing tree (fixtures).
    pub fn from_root(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The `<body>` element, or the whole tree if there is none.
    pub fn body(&self) -> &Node {
        self.root.find_tag("body").unwrap_or(&self.root)
    }

    /// Text of `<title>`.
    pub fn title(&self) -> Option<String> {
        self.root
            .find_tag("title")
            .map(|node| {
                let mut raw = String::new();
                for child in &node.children {
                    if let NodeKind::Text(text) = &child.kind {
                        raw.push_str(text);
                    }
                }
                collapse_whitespace(&raw)
            })
            .filter(|t| !t.is_empty())
    }

    /// Text of the first `<h1>`.
    pub fn first_heading(&self) -> Option<String> {
        self.body()
            .find_tag("h1")
            .map(Node::text_content)
            .filter(|t| !t.is_empty())
    }

    /// Visible body text length in characters.
    pub fn visible_text_len(&self) -> usize {
        self.body().text_len()
    }
}

fn convert(element: ElementRef<'_>, depth: usize) -> Node {
    let value = element.value();
    let kind = NodeKind::Element {
        tag: value.name().to_ascii_lowercase(),
        attrs: value
            .attrs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect(),
    };

    let children = if depth >= MAX_DEPTH {
        Vec::new()
    } else {
        element
            .children()
            .filter_map(|child| match ElementRef::wrap(child) {
                Some(child_element) => Some(convert(child_element, depth + 1)),
                None => child.value().as_text().map(|text| Node::text(&**text)),
            })
            .collect()
    };

    Node { kind, children }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title> Calm Waters   Counseling </title><style>p { color: red }</style></head>
<body>
  <nav><a href="/">Home</a><a href="/team">Our Team</a></nav>
  <main id="content">
    <h1>About <em>Us</em></h1>
    <p>We help people&nbsp;heal.<br>Call today.</p>
    <ul><li>Anxiety</li><li>Depression</li></ul>
    <script>var x = "hidden";</script>
  </main>
</body>
</html>"#;

    #[test]
    fn test_parse_builds_typed_tree() {
        let doc = Document::parse(PAGE);
        let main = doc.root().find_tag("main").unwrap();
        assert_eq!(main.id(), Some("content"));
        assert!(doc.root().find_tag("nav").is_some());
        assert!(matches!(doc.root().kind, NodeKind::Document));
    }

    #[test]
    fn test_title_and_heading() {
        let doc = Document::parse(PAGE);
        assert_eq!(doc.title().as_deref(), Some("Calm Waters Counseling"));
        assert_eq!(doc.first_heading().as_deref(), Some("About Us"));
    }

    #[test]
    fn test_text_content_skips_scripts_and_collapses() {
        let doc = Document::parse(PAGE);
        let main = doc.root().find_tag("main").unwrap();
        let text = main.text_content();
        assert_eq!(
            text,
            "About Us We help people heal. Call today. Anxiety Depression"
        );
        assert!(!text.contains("hidden"));
    }

    #[test]
    fn test_blocks_are_ordered_paragraphs() {
        let doc = Document::parse(PAGE);
        let blocks = doc.body().blocks(&|node, _| node.is_tag("nav"));
        assert_eq!(
            blocks,
            vec![
                "About Us".to_string(),
                "We help people heal. Call today.".to_string(),
                "Anxiety".to_string(),
                "Depression".to_string(),
            ]
        );
    }

    #[test]
    fn test_walk_reports_ancestors() {
        let tree = Node::element(
            "div",
            &[("class", "team grid")],
            vec![Node::element("a", &[("href", "/jane")], vec![Node::text("Jane")])],
        );

        let mut seen = Vec::new();
        tree.walk(&mut |node, ancestors| {
            if node.is_tag("a") {
                seen.push(ancestors.len());
                assert!(ancestors[0].has_class("TEAM"));
            }
            Walk::Continue
        });
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn test_walk_skip_children() {
        let tree = Node::element(
            "body",
            &[],
            vec![Node::element("nav", &[], vec![Node::element("a", &[], vec![])])],
        );

        let mut anchors = 0;
        tree.walk(&mut |node, _| {
            if node.is_tag("a") {
                anchors += 1;
            }
            if node.is_tag("nav") {
                Walk::SkipChildren
            } else {
                Walk::Continue
            }
        });
        assert_eq!(anchors, 0);
    }

    #[test]
    fn test_descendants_preorder() {
        let tree = Node::element(
            "div",
            &[],
            vec![
                Node::element("p", &[], vec![Node::text("a")]),
                Node::element("span", &[], vec![]),
            ],
        );
        let tags: Vec<_> = tree.descendants().filter_map(Node::tag).collect();
        assert_eq!(tags, vec!["div", "p", "span"]);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b\u{a0}c  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }
}
