//! Replacement table and the replacement classifier.
//!
//! Replacement values are tagged variants constructed once when the table is
//! built, so the engine never has to probe the shape of a value at
//! substitution time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default edge length (both width and height) of an injected image, in
/// device-independent pixels.
pub const DEFAULT_IMAGE_EDGE: u32 = 300;

fn default_image_edge() -> u32 {
    DEFAULT_IMAGE_EDGE
}

/// An image to inject in place of a marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSpec {
    pub path: PathBuf,
    #[serde(default = "default_image_edge")]
    pub width: u32,
    #[serde(default = "default_image_edge")]
    pub height: u32,
}

impl ImageSpec {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ImageSpec {
            path: path.into(),
            width: DEFAULT_IMAGE_EDGE,
            height: DEFAULT_IMAGE_EDGE,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// One cell of tabular replacement data. Colors are hex triplets without
/// the leading `#` (e.g. `FF0000`); when present they override whatever
/// styling the target table carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellValue {
    pub value: String,
    #[serde(default)]
    pub bg_color: Option<String>,
    #[serde(default)]
    pub font_color: Option<String>,
}

impl CellValue {
    pub fn new<S: Into<String>>(value: S) -> Self {
        CellValue {
            value: value.into(),
            bg_color: None,
            font_color: None,
        }
    }

    pub fn with_bg_color<S: Into<String>>(mut self, color: S) -> Self {
        self.bg_color = Some(color.into());
        self
    }

    pub fn with_font_color<S: Into<String>>(mut self, color: S) -> Self {
        self.font_color = Some(color.into());
        self
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::new(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::new(value)
    }
}

/// Rows of cells for a synthesized table or a row-template binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub rows: Vec<Vec<CellValue>>,
    /// With the preset on, the synthesized table gets borders, a shaded
    /// bold header row and centered paragraphs.
    #[serde(default)]
    pub styled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplacementValue {
    Scalar(String),
    Image(ImageSpec),
    Table(TableSpec),
    /// Ordered group of images, bound to a `name(i)`-style key. Each entry
    /// becomes its own paragraph in the output.
    ImageGroup(Vec<(String, ImageSpec)>),
}

/// How a discovered marker name resolves against the replacement table.
#[derive(Debug)]
pub(crate) enum Classified<'a> {
    /// Name not present: the marker's delimiters are stripped and the name
    /// is left visible, so unresolved placeholders can be spotted.
    Skip,
    Text(&'a str),
    Image(&'a ImageSpec),
    ImageGroup {
        base: String,
        images: &'a [(String, ImageSpec)],
    },
    FullTable(&'a TableSpec),
}

/// The replacement table: marker name to replacement value. Keys are
/// whitespace-stripped on insertion, the same way marker names are
/// normalized before lookup.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ReplacementTable {
    entries: BTreeMap<String, ReplacementValue>,
}

impl ReplacementTable {
    pub fn new() -> Self {
        ReplacementTable::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: ReplacementValue) {
        self.entries.insert(strip_name(&name.into()), value);
    }

    pub fn set_text<S: Into<String>, V: Into<String>>(&mut self, name: S, value: V) {
        self.insert(name, ReplacementValue::Scalar(value.into()));
    }

    pub fn set_image<S: Into<String>>(&mut self, name: S, image: ImageSpec) {
        self.insert(name, ReplacementValue::Image(image));
    }

    pub fn set_table<S: Into<String>>(&mut self, name: S, rows: Vec<Vec<CellValue>>) {
        self.insert(name, ReplacementValue::Table(TableSpec { rows, styled: false }));
    }

    pub fn set_styled_table<S: Into<String>>(&mut self, name: S, rows: Vec<Vec<CellValue>>) {
        self.insert(name, ReplacementValue::Table(TableSpec { rows, styled: true }));
    }

    pub fn set_image_group<S: Into<String>>(&mut self, name: S, images: Vec<(String, ImageSpec)>) {
        self.insert(name, ReplacementValue::ImageGroup(images));
    }

    pub fn get(&self, name: &str) -> Option<&ReplacementValue> {
        self.entries.get(&strip_name(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a raw (possibly whitespace-wrapped) marker name to its
    /// replacement kind.
    pub(crate) fn classify(&self, raw_name: &str) -> Classified {
        let name = strip_name(raw_name);
        match self.entries.get(&name) {
            None => Classified::Skip,
            Some(ReplacementValue::Scalar(text)) => Classified::Text(text),
            Some(ReplacementValue::Image(spec)) => Classified::Image(spec),
            Some(ReplacementValue::Table(spec)) => Classified::FullTable(spec),
            Some(ReplacementValue::ImageGroup(images)) => {
                let base = name.split('(').next().unwrap_or(&name).to_string();
                Classified::ImageGroup { base, images }
            }
        }
    }

    /// All keys of the form `prefix(<token>)` carrying tabular data. The
    /// row-template expander requires exactly one such key per prefix.
    pub(crate) fn row_bindings(&self, prefix: &str) -> Vec<(&str, &TableSpec)> {
        let pattern = Regex::new(&format!(r"^{}\([^()]+\)$", regex::escape(prefix))).unwrap();
        self.entries
            .iter()
            .filter_map(|(key, value)| match value {
                ReplacementValue::Table(spec) if pattern.is_match(key) => {
                    Some((key.as_str(), spec))
                }
                _ => None,
            })
            .collect()
    }
}

/// Marker names may wrap across line breaks in the raw markup, so all
/// whitespace is removed before lookup.
pub(crate) fn strip_name(raw: &str) -> String {
    raw.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ReplacementTable {
        let mut table = ReplacementTable::new();
        table.set_text("greeting", "Hello");
        table.set_image("logo", ImageSpec::new("/tmp/logo.png"));
        table.set_table(
            "inventory",
            vec![vec![CellValue::new("a"), CellValue::new("b")]],
        );
        table.set_image_group(
            "photos(i)",
            vec![("first".into(), ImageSpec::new("/tmp/a.png"))],
        );
        table.set_table("rows(k)", vec![vec![CellValue::new("x")]]);
        table
    }

    #[test]
    fn classifies_by_tagged_variant() {
        let table = sample_table();
        assert!(matches!(table.classify("greeting"), Classified::Text("Hello")));
        assert!(matches!(table.classify("logo"), Classified::Image(_)));
        assert!(matches!(table.classify("inventory"), Classified::FullTable(_)));
        assert!(matches!(table.classify("absent"), Classified::Skip));
    }

    #[test]
    fn image_group_base_drops_suffix() {
        let table = sample_table();
        match table.classify("photos(i)") {
            Classified::ImageGroup { base, images } => {
                assert_eq!(base, "photos");
                assert_eq!(images.len(), 1);
            }
            other => panic!("expected image group, got {:?}", other),
        }
    }

    #[test]
    fn marker_names_are_whitespace_stripped() {
        let table = sample_table();
        assert!(matches!(
            table.classify("gree\nting "),
            Classified::Text("Hello")
        ));
    }

    #[test]
    fn row_bindings_match_single_token_suffix() {
        let table = sample_table();
        let bindings = table.row_bindings("rows");
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, "rows(k)");
        assert!(table.row_bindings("photos").is_empty()); // image group, not a table
        assert!(table.row_bindings("inventory").is_empty()); // no (token) suffix
    }

    #[test]
    fn replacement_table_deserializes_from_json() {
        let json = r#"{
            "entries": {
                "name": {"Scalar": "value"},
                "pic": {"Image": {"path": "/tmp/x.png"}}
            }
        }"#;
        let table: ReplacementTable = serde_json::from_str(json).unwrap();
        assert!(matches!(table.classify("name"), Classified::Text("value")));
        match table.classify("pic") {
            Classified::Image(spec) => {
                assert_eq!(spec.width, DEFAULT_IMAGE_EDGE);
                assert_eq!(spec.height, DEFAULT_IMAGE_EDGE);
            }
            other => panic!("expected image, got {:?}", other),
        }
    }
}
