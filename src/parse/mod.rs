//! Parsing DOCX parts into token vectors and navigating the resulting
//! structure by element spans.

use crate::errors::StencilDocxError;
use crate::{PageDimensions, Token, NS_WP_ML};
use std::io::BufReader;
use std::io::{Read, Seek};
use xml::reader::EventReader;
use zip::ZipArchive;

/// Reads a string of XML data and converts it into a vector
/// of Token objects.
pub(crate) fn xml_to_token_vec(xml: &str) -> Result<Vec<Token>, StencilDocxError> {
    let mut result: Vec<Token> = Vec::new();

    let source_buf = BufReader::new(xml.as_bytes());
    let source_parser = EventReader::new(source_buf);

    for event in source_parser {
        match event {
            Ok(xml::reader::XmlEvent::Characters(contents)) => {
                result.push(Token {
                    token_text: Some(contents.clone()),
                    xml_reader_event: xml::reader::XmlEvent::Characters(contents),
                });
            }
            // Whitespace-only text still counts as run text (`<w:t> </w:t>`).
            Ok(xml::reader::XmlEvent::Whitespace(contents)) => {
                result.push(Token {
                    token_text: Some(contents.clone()),
                    xml_reader_event: xml::reader::XmlEvent::Whitespace(contents),
                });
            }
            Ok(anything_else) => result.push(Token {
                token_text: None,
                xml_reader_event: anything_else,
            }),
            Err(error) => return Err(error.into()),
        }
    }

    Ok(result)
}

/// An inclusive token index range covering one XML element, from its
/// StartElement token to its matching EndElement token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub(crate) fn contains(&self, other: &Span) -> bool {
        self.start < other.start && other.end < self.end
    }
}

fn is_wp_element(name: &xml::name::OwnedName, local: &str) -> bool {
    name.local_name == local && name.namespace.as_deref() == Some(NS_WP_ML)
}

/// All spans of the named wordprocessing element, nested occurrences
/// included, in document order of their start tokens.
pub(crate) fn element_spans(tokens: &[Token], local: &str) -> Vec<Span> {
    let mut result: Vec<Span> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match &token.xml_reader_event {
            xml::reader::XmlEvent::StartElement { name, .. } if is_wp_element(name, local) => {
                stack.push(i);
            }
            xml::reader::XmlEvent::EndElement { name } if is_wp_element(name, local) => {
                if let Some(start) = stack.pop() {
                    result.push(Span { start, end: i });
                }
            }
            _ => (),
        }
    }

    result.sort_by_key(|span| span.start);
    result
}

/// Like [`element_spans`], restricted to a token range. Returned spans are
/// absolute indices.
pub(crate) fn element_spans_within(tokens: &[Token], range: Span, local: &str) -> Vec<Span> {
    element_spans(&tokens[range.start..=range.end], local)
        .into_iter()
        .map(|span| Span {
            start: span.start + range.start,
            end: span.end + range.start,
        })
        .collect()
}

/// The first direct child element of the given name inside a container
/// slice, where `container[0]` is the container's own start token.
pub(crate) fn direct_child_span(container: &[Token], local: &str) -> Option<Span> {
    let mut depth: i32 = 0;
    let mut open_index: Option<usize> = None;

    for (i, token) in container.iter().enumerate() {
        match &token.xml_reader_event {
            xml::reader::XmlEvent::StartElement { name, .. } => {
                if depth == 1 && open_index.is_none() && is_wp_element(name, local) {
                    open_index = Some(i);
                }
                depth += 1;
            }
            xml::reader::XmlEvent::EndElement { name } => {
                depth -= 1;
                if depth == 1 {
                    if let Some(start) = open_index {
                        if is_wp_element(name, local) {
                            return Some(Span { start, end: i });
                        }
                    }
                }
            }
            _ => (),
        }
    }

    None
}

/// Indices of character-data tokens living inside `w:t` elements within the
/// given range.
pub(crate) fn text_token_indices(tokens: &[Token], range: Span) -> Vec<usize> {
    let mut result: Vec<usize> = Vec::new();
    let mut depth: usize = 0;

    for i in range.start..=range.end {
        match &tokens[i].xml_reader_event {
            xml::reader::XmlEvent::StartElement { name, .. } if is_wp_element(name, "t") => {
                depth += 1;
            }
            xml::reader::XmlEvent::EndElement { name } if is_wp_element(name, "t") => {
                depth = depth.saturating_sub(1);
            }
            xml::reader::XmlEvent::Characters(_) | xml::reader::XmlEvent::Whitespace(_)
                if depth > 0 =>
            {
                result.push(i);
            }
            _ => (),
        }
    }

    result
}

/// Concatenated `w:t` text of a token range.
pub(crate) fn concatenated_text(tokens: &[Token], range: Span) -> String {
    let mut result = String::new();
    for i in text_token_indices(tokens, range) {
        if let Some(text) = &tokens[i].token_text {
            result.push_str(text);
        }
    }
    result
}

/// One styled run within a paragraph: its token span, its concatenated
/// text, and where that text lives.
#[derive(Debug)]
pub(crate) struct RunSlot {
    pub span: Span,
    pub text: String,
    pub text_tokens: Vec<usize>,
}

/// Runs of one paragraph in document order. Runs nested in hyperlinks and
/// similar wrappers are included; drawing-internal `a:r` elements are not
/// (different namespace).
pub(crate) fn run_slots(tokens: &[Token], paragraph: Span) -> Vec<RunSlot> {
    element_spans_within(tokens, paragraph, "r")
        .into_iter()
        .map(|span| {
            let text_tokens = text_token_indices(tokens, span);
            let mut text = String::new();
            for &i in &text_tokens {
                if let Some(t) = &tokens[i].token_text {
                    text.push_str(t);
                }
            }
            RunSlot {
                span,
                text,
                text_tokens,
            }
        })
        .collect()
}

/// Extract page dimensions from DOCX data. Returns `None` when the
/// document carries no `sectPr` geometry.
pub(crate) fn parse_page_dimensions(document_xml: &str) -> Option<PageDimensions> {
    let mut width: Option<i32> = None;
    let mut height: Option<i32> = None;
    let mut m_top: Option<i32> = None;
    let mut m_bottom: Option<i32> = None;
    let mut m_right: Option<i32> = None;
    let mut m_left: Option<i32> = None;
    let mut header: Option<i32> = None;
    let mut footer: Option<i32> = None;
    let mut gutter: Option<i32> = None;

    let source_buf = BufReader::new(document_xml.as_bytes());
    let parser = EventReader::new(source_buf);
    let ns = Some(String::from(NS_WP_ML));

    let fetch_attr_value = |attrs: &[xml::attribute::OwnedAttribute], name: &str| {
        attrs
            .iter()
            .find(|attr| attr.name.local_name == name && attr.name.namespace == ns)
            .and_then(|attr| attr.value.parse::<i32>().ok())
    };

    for event in parser {
        if let Ok(xml::reader::XmlEvent::StartElement {
            name, attributes, ..
        }) = &event
        {
            if name.local_name == "pgSz" && name.namespace == ns {
                width = fetch_attr_value(attributes, "w");
                height = fetch_attr_value(attributes, "h");
            }

            if name.local_name == "pgMar" && name.namespace == ns {
                m_top = fetch_attr_value(attributes, "top");
                m_bottom = fetch_attr_value(attributes, "bottom");
                m_right = fetch_attr_value(attributes, "right");
                m_left = fetch_attr_value(attributes, "left");
                header = fetch_attr_value(attributes, "header");
                footer = fetch_attr_value(attributes, "footer");
                gutter = fetch_attr_value(attributes, "gutter");
            }
        }
    }

    Some(PageDimensions {
        width: width?,
        height: height?,
        m_top: m_top?,
        m_bottom: m_bottom?,
        m_right: m_right?,
        m_left: m_left?,
        header: header.unwrap_or(708),
        footer: footer.unwrap_or(708),
        gutter: gutter.unwrap_or(0),
    })
}

pub(crate) fn unzip_text_file<T: Read + Seek>(
    archive: &mut ZipArchive<T>,
    file_name: &str,
) -> Result<String, StencilDocxError> {
    let mut file = archive.by_name(file_name)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}
