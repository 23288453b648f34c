//! Typed XHTML document tree
//!
//! A thin owned tree over quick-xml events. Elements keep their name and
//! attributes; every other event (text, comments, CDATA, entity references,
//! processing instructions, doctype) is stored as-is so serialization
//! reproduces it verbatim.

use std::borrow::Cow;
use std::io;

use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// Failure to parse a document as well-formed XML
#[derive(Error, Debug)]
#[error("{reason} (byte {position})")]
pub struct ParseError {
    pub position: usize,
    pub reason: String,
}

/// One attribute, value kept in escaped form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    raw_value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            raw_value: escape_attribute(value),
        }
    }

    /// Unescaped value; falls back to the raw text when it holds an entity
    /// XML does not predefine
    pub fn value(&self) -> Cow<'_, str> {
        unescape(&self.raw_value).unwrap_or(Cow::Borrowed(self.raw_value.as_str()))
    }
}

/// A node in the tree
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    /// Any non-element event, reproduced verbatim
    Markup(Event<'static>),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    fn from_start(start: &BytesStart<'_>, self_closing: bool) -> Result<Self, String> {
        let name = utf8(start.name().as_ref())?;
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            attributes.push(Attribute {
                name: utf8(attr.key.as_ref())?,
                raw_value: normalize_raw_value(&utf8(&attr.value)?),
            });
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            self_closing,
        })
    }

    /// Name without namespace prefix
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(Attribute::value)
    }

    /// Set an attribute, replacing an existing value in place
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.raw_value = escape_attribute(value),
            None => self.attributes.push(Attribute::new(name, value)),
        }
    }

    /// Visit every descendant element in document order
    pub fn for_each_descendant_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        for child in &mut self.children {
            if let Node::Element(el) = child {
                f(el);
                el.for_each_descendant_mut(f);
            }
        }
    }

    pub fn write_to<W: io::Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for attr in &self.attributes {
            start.push_attribute(XmlAttribute {
                key: QName(attr.name.as_bytes()),
                value: Cow::Borrowed(attr.raw_value.as_bytes()),
            });
        }

        if self.self_closing && self.children.is_empty() {
            return emit(writer, Event::Empty(start));
        }

        emit(writer, Event::Start(start))?;
        for child in &self.children {
            child.write_to(writer)?;
        }
        emit(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }

    pub fn to_xml(&self) -> io::Result<String> {
        let mut writer = Writer::new(Vec::new());
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(io::Error::other)
    }
}

impl Node {
    pub fn write_to<W: io::Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        match self {
            Node::Element(el) => el.write_to(writer),
            Node::Markup(event) => emit(writer, event.clone()),
        }
    }
}

/// A parsed document: prolog, root element and anything after it
#[derive(Debug, Clone)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    /// Parse well-formed XML; mismatched or unclosed tags are errors
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(text);
        let mut open: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| ParseError {
                position: reader.error_position() as usize,
                reason: e.to_string(),
            })?;
            let position = reader.buffer_position() as usize;
            let invalid = |reason: String| ParseError { position, reason };

            match event {
                Event::Start(start) => open.push(Element::from_start(&start, false).map_err(invalid)?),
                Event::Empty(start) => {
                    let el = Element::from_start(&start, true).map_err(invalid)?;
                    attach(&mut open, &mut nodes, Node::Element(el));
                }
                Event::End(end) => {
                    let el = open.pop().ok_or_else(|| {
                        invalid(format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(end.name().as_ref())
                        ))
                    })?;
                    attach(&mut open, &mut nodes, Node::Element(el));
                }
                Event::Eof => break,
                other => attach(&mut open, &mut nodes, Node::Markup(other.into_owned())),
            }
        }

        if let Some(unclosed) = open.last() {
            return Err(ParseError {
                position: text.len(),
                reason: format!("unclosed element <{}>", unclosed.name),
            });
        }
        if !nodes.iter().any(|n| matches!(n, Node::Element(_))) {
            return Err(ParseError {
                position: 0,
                reason: "no root element".to_string(),
            });
        }

        Ok(Self { nodes })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(el) => Some(el),
            Node::Markup(_) => None,
        })
    }

    /// Every element, root included, in document order
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants::new(&self.nodes)
    }

    /// Elements satisfying `predicate`, lazily and in document order
    pub fn elements_matching<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Element>
    where
        P: FnMut(&&'a Element) -> bool + 'a,
    {
        self.descendants().filter(predicate)
    }

    /// First element in document order satisfying `predicate`
    pub fn find_mut<P: Fn(&Element) -> bool>(&mut self, predicate: P) -> Option<&mut Element> {
        find_in(&mut self.nodes, &predicate)
    }

    pub fn to_xml(&self) -> io::Result<String> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.nodes {
            node.write_to(&mut writer)?;
        }
        String::from_utf8(writer.into_inner()).map_err(io::Error::other)
    }
}

/// Pre-order walk over the elements below a list of nodes
///
/// Restartable by asking the owner for a new one.
pub struct Descendants<'a> {
    stack: Vec<std::slice::Iter<'a, Node>>,
}

impl<'a> Descendants<'a> {
    fn new(nodes: &'a [Node]) -> Self {
        Self {
            stack: vec![nodes.iter()],
        }
    }
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(Node::Element(el)) => {
                    self.stack.push(el.children.iter());
                    return Some(el);
                }
                Some(Node::Markup(_)) => {}
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

fn find_in<'a, P: Fn(&Element) -> bool>(
    nodes: &'a mut [Node],
    predicate: &P,
) -> Option<&'a mut Element> {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if predicate(el) {
                return Some(el);
            }
            if let Some(found) = find_in(&mut el.children, predicate) {
                return Some(found);
            }
        }
    }
    None
}

fn attach(open: &mut [Element], nodes: &mut Vec<Node>, node: Node) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => nodes.push(node),
    }
}

fn emit<W: io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> io::Result<()> {
    writer.write_event(event).map_err(io::Error::other)
}

fn utf8(bytes: &[u8]) -> Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| e.to_string())
}

/// Extract local name from a potentially prefixed XML name
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Decode an attribute value read straight from the event stream
pub(crate) fn decode_attribute(raw: &[u8]) -> Result<String, String> {
    let raw = utf8(raw)?;
    Ok(match unescape(&raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw,
    })
}

/// Escape for a double-quoted attribute
fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Re-escape a raw value so it stays valid inside double quotes,
/// keeping values that need no change byte for byte
fn normalize_raw_value(raw: &str) -> String {
    if !raw.contains('"') && !raw.contains('<') {
        return raw.to_string();
    }
    match unescape(raw) {
        Ok(value) => escape_attribute(&value),
        Err(_) => raw.replace('"', "&quot;").replace('<', "&lt;"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>T</title></head><body><p id="a">one <b>two</b></p><br/><!-- note --><p id="b">&amp; three&nbsp;</p></body></html>"#;

    #[test]
    fn test_parse_and_serialize_verbatim() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.to_xml().unwrap(), SAMPLE);
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = Document::parse(SAMPLE).unwrap();
        let names: Vec<&str> = doc.descendants().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["html", "head", "title", "body", "p", "b", "br", "p"]);
    }

    #[test]
    fn test_elements_matching_is_restartable() {
        let doc = Document::parse(SAMPLE).unwrap();
        let with_id = |e: &&Element| e.attr("id").is_some();
        assert_eq!(doc.elements_matching(with_id).count(), 2);
        assert_eq!(doc.elements_matching(with_id).count(), 2);
    }

    #[test]
    fn test_find_mut_and_set_attr() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let p = doc.find_mut(|e| e.attr("id").as_deref() == Some("b")).unwrap();
        p.set_attr("id", "renamed");
        p.set_attr("title", "say \"hi\" & bye");

        let xml = doc.to_xml().unwrap();
        assert!(xml.contains(r#"<p id="renamed" title="say &quot;hi&quot; &amp; bye">"#));
    }

    #[test]
    fn test_single_quoted_attribute_stays_well_formed() {
        let doc = Document::parse(r#"<p title='a "quoted" word'>x</p>"#).unwrap();
        let xml = doc.to_xml().unwrap();
        assert_eq!(xml, r#"<p title="a &quot;quoted&quot; word">x</p>"#);
        assert_eq!(
            doc.root().unwrap().attr("title").as_deref(),
            Some(r#"a "quoted" word"#)
        );
    }

    #[test]
    fn test_mismatched_tags_rejected() {
        assert!(Document::parse("<html><body><p></body></html>").is_err());
    }

    #[test]
    fn test_unclosed_element_rejected() {
        assert!(Document::parse("<html><body>").is_err());
    }

    #[test]
    fn test_no_root_rejected() {
        assert!(Document::parse("<?xml version=\"1.0\"?>").is_err());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("h:body"), "body");
        assert_eq!(local_name("body"), "body");
    }

    #[test]
    fn test_decode_attribute() {
        assert_eq!(decode_attribute(b"a &amp; b").unwrap(), "a & b");
        assert_eq!(decode_attribute(b"&nbsp;").unwrap(), "&nbsp;");
    }
}
