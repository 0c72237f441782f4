//! Owned element tree for sys (XML) envelopes.
//!
//! `roxmltree` gives us a fast, borrowing parser; the tree it produces
//! can't outlive the input string, so we copy it into [`XmlElement`]
//! values that can be stored and passed around freely.

use crate::ProtocolError;

/// Deepest element nesting accepted before handing input to the parser.
const MAX_DEPTH: usize = 128;

/// One XML element with its attributes, text, and child elements.
///
/// `text` is the concatenation of the element's direct text and CDATA
/// children, so `<n><![CDATA[lobby]]></n>` has `text == "lobby"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parses a complete document and returns its root element.
    ///
    /// Documents nested more than 128 elements deep are rejected before
    /// any tree is built.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        if nesting_exceeds(input, MAX_DEPTH) {
            return Err(ProtocolError::InvalidMessage(format!(
                "xml nesting deeper than {MAX_DEPTH} elements"
            )));
        }
        let doc = roxmltree::Document::parse(input).map_err(ProtocolError::Xml)?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let mut element = Self {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            ..Self::default()
        };

        for child in node.children() {
            if child.is_element() {
                element.children.push(Self::from_node(child));
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    element.text.push_str(text);
                }
            }
        }

        element
    }

    /// Returns the value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first direct child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Iterates over all direct children with the given tag name.
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child with the given tag name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }
}

/// Byte scan over the markup that reports whether open elements ever
/// exceed `limit`. Comments, CDATA, declarations, and quoted attribute
/// values are skipped so a stray `<` or `/>` inside them doesn't count.
fn nesting_exceeds(input: &str, limit: usize) -> bool {
    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        let rest = &input[i..];
        if rest.starts_with("<![CDATA[") {
            i += skip_past(rest, "]]>");
        } else if rest.starts_with("<!--") {
            i += skip_past(rest, "-->");
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            i += skip_past(rest, ">");
        } else if rest.starts_with("</") {
            depth = depth.saturating_sub(1);
            i += skip_past(rest, ">");
        } else {
            let end = tag_end(bytes, i + 1);
            let self_closing = end < bytes.len() && bytes[end - 1] == b'/';
            if !self_closing {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            i = end + 1;
        }
    }

    false
}

/// Length of `rest` up to and including `needle`, or all of it.
fn skip_past(rest: &str, needle: &str) -> usize {
    rest.find(needle).map_or(rest.len(), |at| at + needle.len())
}

/// Index of the `>` closing a start tag, ignoring any inside quotes.
fn tag_end(bytes: &[u8], from: usize) -> usize {
    let mut quote = None;
    let mut j = from;
    while j < bytes.len() {
        match (quote, bytes[j]) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b @ (b'\'' | b'"')) => quote = Some(b),
            (None, b'>') => return j,
            _ => {}
        }
        j += 1;
    }
    j
}
