//! Synthesizing XML structure as token vectors and writing token vectors
//! back out as XML text.

pub mod image;
pub mod table;

use crate::errors::StencilDocxError;
use crate::{Token, NS_DWML_MAIN, NS_DWML_PIC, NS_REL, NS_WPD_ML, NS_WP_ML};
use std::collections::BTreeMap;
use std::io::Cursor;
use xml::writer::EmitterConfig;

/// Namespace URI for a well-known prefix used in synthesized fragments.
pub(crate) fn ns_for_prefix(prefix: &str) -> Option<&'static str> {
    match prefix {
        "w" => Some(NS_WP_ML),
        "wp" => Some(NS_WPD_ML),
        "a" => Some(NS_DWML_MAIN),
        "pic" => Some(NS_DWML_PIC),
        "r" => Some(NS_REL),
        "xml" => Some("http://www.w3.org/XML/1998/namespace"),
        _ => None,
    }
}

pub(crate) fn owned_name(prefix: Option<&str>, namespace: Option<&str>, local: &str) -> xml::name::OwnedName {
    xml::name::OwnedName {
        local_name: local.into(),
        namespace: namespace.map(String::from),
        prefix: prefix.map(String::from),
    }
}

pub(crate) fn owned_attribute(prefix: Option<&str>, local: &str, value: &str) -> xml::attribute::OwnedAttribute {
    let namespace = prefix.and_then(ns_for_prefix);
    xml::attribute::OwnedAttribute {
        name: owned_name(prefix, namespace, local),
        value: String::from(value),
    }
}

/// Build a StartElement reader event for a prefixed element. Attributes are
/// `(prefix, name, value)` triples; an empty prefix means an unprefixed,
/// non-namespaced attribute. Namespace bindings for the element's own
/// prefix and every attribute prefix ride along so the writer can declare
/// them when they are not already in scope.
pub(crate) fn start_tag_event(
    prefix: &str,
    local: &str,
    attrs: &[(&str, &str, &str)],
) -> xml::reader::XmlEvent {
    let mut ns: BTreeMap<String, String> = BTreeMap::new();
    if let Some(uri) = ns_for_prefix(prefix) {
        ns.insert(prefix.into(), uri.into());
    }

    let attributes: Vec<xml::attribute::OwnedAttribute> = attrs
        .iter()
        .map(|(attr_prefix, name, value)| {
            if attr_prefix.is_empty() {
                owned_attribute(None, name, value)
            } else {
                if let Some(uri) = ns_for_prefix(attr_prefix) {
                    ns.insert((*attr_prefix).into(), uri.into());
                }
                owned_attribute(Some(attr_prefix), name, value)
            }
        })
        .collect();

    xml::reader::XmlEvent::StartElement {
        name: owned_name(Some(prefix), ns_for_prefix(prefix), local),
        namespace: xml::namespace::Namespace(ns),
        attributes,
    }
}

pub(crate) fn end_tag_event(prefix: &str, local: &str) -> xml::reader::XmlEvent {
    xml::reader::XmlEvent::EndElement {
        name: owned_name(Some(prefix), ns_for_prefix(prefix), local),
    }
}

/// Builds well-formed token fragments without hand-balancing tags. `open`
/// pushes an element and remembers it; `close` pops the most recent one;
/// `finish` closes whatever is still open and yields the tokens.
pub(crate) struct FragmentBuilder {
    tokens: Vec<Token>,
    open_stack: Vec<(String, String)>,
}

impl FragmentBuilder {
    pub(crate) fn new() -> Self {
        FragmentBuilder {
            tokens: Vec::new(),
            open_stack: Vec::new(),
        }
    }

    pub(crate) fn open(&mut self, prefix: &str, local: &str, attrs: &[(&str, &str, &str)]) -> &mut Self {
        self.tokens.push(Token::normal(start_tag_event(prefix, local, attrs)));
        self.open_stack.push((prefix.into(), local.into()));
        self
    }

    /// An element with no children: `<w:b/>`, `<a:fillRect/>`, ...
    pub(crate) fn leaf(&mut self, prefix: &str, local: &str, attrs: &[(&str, &str, &str)]) -> &mut Self {
        self.tokens.push(Token::normal(start_tag_event(prefix, local, attrs)));
        self.tokens.push(Token::normal(end_tag_event(prefix, local)));
        self
    }

    pub(crate) fn text(&mut self, contents: &str) -> &mut Self {
        self.tokens.push(Token::characters(contents));
        self
    }

    pub(crate) fn close(&mut self) -> &mut Self {
        if let Some((prefix, local)) = self.open_stack.pop() {
            self.tokens.push(Token::normal(end_tag_event(&prefix, &local)));
        }
        self
    }

    /// Splice in tokens produced elsewhere (e.g. a run fragment inside a
    /// paragraph being built).
    pub(crate) fn extend(&mut self, tokens: Vec<Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    pub(crate) fn finish(mut self) -> Vec<Token> {
        while !self.open_stack.is_empty() {
            self.close();
        }
        self.tokens
    }
}

pub(crate) fn write_token_vector_to_string(
    tokens: &[Token],
) -> Result<String, StencilDocxError> {
    let mut buf: Vec<u8> = Vec::new();
    let cursor = Cursor::new(&mut buf);
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .create_writer(cursor);

    for item in tokens.iter() {
        if let Some(writer_event) = item.xml_reader_event.as_writer_event() {
            // The emitter's error type is private, so a token error of our
            // own is passed along instead.
            if writer.write(writer_event).is_err() {
                return Err(StencilDocxError::FailedWriteXml);
            }
        }
    }

    String::from_utf8(buf).map_err(|_| StencilDocxError::FailedWriteXml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_closes_unbalanced_fragments() {
        let mut builder = FragmentBuilder::new();
        builder
            .open("w", "p", &[])
            .open("w", "r", &[])
            .open("w", "t", &[("xml", "space", "preserve")])
            .text("hello");
        let rendered = write_token_vector_to_string(&builder.finish()).unwrap();
        assert!(rendered.contains("hello"));
        assert!(rendered.contains("</w:p>") || rendered.contains("<w:p"));
        // every open tag got an end tag
        assert_eq!(rendered.matches("<w:t").count(), rendered.matches("</w:t>").count());
    }

    #[test]
    fn attribute_prefixes_carry_their_namespace() {
        let event = start_tag_event("a", "blip", &[("r", "embed", "rId7")]);
        if let xml::reader::XmlEvent::StartElement { namespace, attributes, .. } = event {
            assert_eq!(namespace.0.get("r").map(String::as_str), Some(crate::NS_REL));
            assert_eq!(attributes[0].value, "rId7");
        } else {
            panic!("expected start element");
        }
    }
}
