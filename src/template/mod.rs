//! The template object and the render pipeline.
//!
//! A `DocxTemplate` holds the source package plus the tokenized body parts
//! (document, headers, footers). Rendering walks each part through the row
//! expander and then the marker substituter, serializes the rewritten
//! token vectors, and rebuilds the package around them.

pub(crate) mod rows;
pub(crate) mod substitute;

use crate::errors::StencilDocxError;
use crate::package::{rebuild_package, PackageContext};
use crate::parse::{parse_page_dimensions, unzip_text_file, xml_to_token_vec};
use crate::render::write_token_vector_to_string;
use crate::values::ReplacementTable;
use crate::{DocxPayload, PageDimensions, Token};
use log::{info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Parts whose XML gets scanned for markers: the main document plus every
/// header and footer.
static PAT_PART_NAME: &str = r"^word/(document|header\d+|footer\d+)\.xml$";

static MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// Render-time behavior switches.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// With `strict` on, recoverable template defects (an unterminated
    /// marker, an ambiguous row binding) abort the render instead of being
    /// logged and skipped.
    pub strict: bool,
}

#[derive(Debug)]
struct DocumentPart {
    name: String,
    tokens: Vec<Token>,
}

/// A parsed DOCX template, ready to be rendered any number of times
/// against different replacement tables.
pub struct DocxTemplate {
    source_payload: DocxPayload,
    parts: Vec<DocumentPart>,
    dimensions: PageDimensions,
}

impl DocxTemplate {
    /// Parse a template from the raw bytes of a DOCX file.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, StencilDocxError> {
        let mut payload = ZipArchive::new(Cursor::new(bytes))?;

        let part_pattern = Regex::new(PAT_PART_NAME).unwrap();
        let mut part_names: Vec<String> = (0..payload.len())
            .filter_map(|i| match payload.by_index(i) {
                Ok(file) if part_pattern.is_match(file.name()) => Some(file.name().to_string()),
                _ => None,
            })
            .collect();
        part_names.sort();

        if !part_names.iter().any(|name| name == MAIN_DOCUMENT_PART) {
            return Err(StencilDocxError::RequiredPartMissing(
                MAIN_DOCUMENT_PART.to_string(),
            ));
        }

        let document_xml = unzip_text_file(&mut payload, MAIN_DOCUMENT_PART)?;
        let dimensions = match parse_page_dimensions(&document_xml) {
            Some(dims) => dims,
            None => {
                warn!("template carries no page geometry, assuming A4");
                PageDimensions::a4_default()
            }
        };

        let mut parts: Vec<DocumentPart> = Vec::with_capacity(part_names.len());
        for name in part_names {
            let xml = unzip_text_file(&mut payload, &name)?;
            parts.push(DocumentPart {
                name,
                tokens: xml_to_token_vec(&xml)?,
            });
        }
        info!("parsed template with {} body parts", parts.len());

        Ok(DocxTemplate {
            source_payload: payload,
            parts,
            dimensions,
        })
    }

    /// Parse a template from a DOCX file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StencilDocxError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StencilDocxError::InputNotFound(path.to_path_buf()));
        }
        DocxTemplate::from_bytes(fs::read(path)?)
    }

    /// Render with default (lenient) options.
    pub fn render(&self, replacements: &ReplacementTable) -> Result<Vec<u8>, StencilDocxError> {
        self.render_with_options(replacements, &RenderOptions::default())
    }

    /// Fill every marker in every body part and return the bytes of the
    /// finished package. The template itself is not consumed; renders are
    /// independent of each other.
    pub fn render_with_options(
        &self,
        replacements: &ReplacementTable,
        options: &RenderOptions,
    ) -> Result<Vec<u8>, StencilDocxError> {
        let mut payload = self.source_payload.clone();
        let mut context = PackageContext::scan_existing(&mut payload)?;

        let mut replaced_parts: HashMap<String, String> = HashMap::new();
        for part in &self.parts {
            // Row templates first; the skip policy of generic substitution
            // would otherwise strip the indexed markers.
            let tokens =
                rows::expand_row_templates(part.tokens.clone(), replacements, options)?;
            let tokens = substitute::substitute_part(
                tokens,
                &part.name,
                replacements,
                &mut context,
                &self.dimensions,
                options,
            )?;
            replaced_parts.insert(part.name.clone(), write_token_vector_to_string(&tokens)?);
        }

        rebuild_package(&mut payload, &replaced_parts, &context)
    }

    /// Render straight to a file. The document is written to a sibling
    /// temporary file and renamed into place, so the target path never
    /// holds a half-written package.
    pub fn render_to_file<P: AsRef<Path>>(
        &self,
        output: P,
        replacements: &ReplacementTable,
    ) -> Result<(), StencilDocxError> {
        let output = output.as_ref();
        let bytes = self.render(replacements)?;

        let mut tmp_name = output.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, output)?;
        info!("wrote {} bytes to {}", bytes.len(), output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_part_pattern_matches_headers_and_footers() {
        let pattern = Regex::new(PAT_PART_NAME).unwrap();
        assert!(pattern.is_match("word/document.xml"));
        assert!(pattern.is_match("word/header1.xml"));
        assert!(pattern.is_match("word/footer12.xml"));
        assert!(!pattern.is_match("word/styles.xml"));
        assert!(!pattern.is_match("word/header.xml"));
        assert!(!pattern.is_match("docProps/core.xml"));
    }
}
