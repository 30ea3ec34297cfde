pub mod errors;
pub mod package;
pub mod parse;
pub mod render;
pub mod scan;
pub mod template;
pub mod values;

pub use crate::errors::StencilDocxError;
pub use crate::template::{DocxTemplate, RenderOptions};
pub use crate::values::{CellValue, ImageSpec, ReplacementTable, ReplacementValue, TableSpec};

use std::io::Cursor;
use zip::ZipArchive;

/// Namespace string used in DOCX XML data to denote word processing elements (like paragraphs).
static NS_WP_ML: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Namespace string used in DOCX XML data to denote drawings in the document.
static NS_WPD_ML: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

static NS_DWML_MAIN: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
static NS_DWML_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

/// Relationship Namespace in DOCX
static NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Namespace of the package-level relationships parts (the `.rels` files).
static NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Relationship type registered for every embedded image.
static REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Placeholder marker delimiters. A marker is `%*name*%` and may be split
/// across any number of runs inside one paragraph.
pub(crate) static MARKER_START: &str = "%*";
pub(crate) static MARKER_END: &str = "*%";

// Regex patterns used to match markers and relationship ids
static PAT_MARKER: &str = r"(?s)%\*(.*?)\*%"; // whole marker, name may wrap across lines
static PAT_REL_ID: &str = r#"Id="rId(\d+)""#; // existing relationship ids in .rels parts

/// EMUs (English Metric Units) per device-independent pixel.
pub(crate) const EMU_PER_PIXEL: i64 = 9525;

/// Fixed prefix that purely numeric row markers (`%*1*%`) bind to.
/// Compatibility affordance only; ambiguous in multi-table documents.
pub(crate) static LEGACY_ROW_PREFIX: &str = "table";

type DocxPayload = ZipArchive<Cursor<Vec<u8>>>;

/// `stencil-docx` treats XML data as a vector of tokens, which can
/// represent an opening tag, a closing tag, CDATA, character data, etc.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) token_text: Option<String>,
    pub(crate) xml_reader_event: xml::reader::XmlEvent,
}

impl Token {
    pub(crate) fn normal(event: xml::reader::XmlEvent) -> Self {
        Token {
            token_text: None,
            xml_reader_event: event,
        }
    }

    pub(crate) fn characters(contents: &str) -> Self {
        Token {
            token_text: Some(contents.into()),
            xml_reader_event: xml::reader::XmlEvent::Characters(contents.into()),
        }
    }

    pub(crate) fn set_characters(&mut self, contents: String) {
        self.xml_reader_event = xml::reader::XmlEvent::Characters(contents.clone());
        self.token_text = Some(contents);
    }
}

/// Page geometry of the main document part, used to derive column widths
/// for synthesized tables.
#[derive(Debug, Clone)]
pub(crate) struct PageDimensions {
    pub height: i32,
    pub width: i32,
    pub m_top: i32,
    pub m_bottom: i32,
    pub m_right: i32,
    pub m_left: i32,
    pub header: i32,
    pub footer: i32,
    pub gutter: i32,
}

impl PageDimensions {
    /// A4 with Word's default margins, used when the template has no `sectPr`.
    pub(crate) fn a4_default() -> Self {
        PageDimensions {
            height: 16838,
            width: 11906,
            m_top: 1440,
            m_bottom: 1440,
            m_right: 1440,
            m_left: 1440,
            header: 708,
            footer: 708,
            gutter: 0,
        }
    }
}
