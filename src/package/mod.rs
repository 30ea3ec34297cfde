//! The package mutation context and final archive assembly.
//!
//! Relationship ids, content-type defaults and queued media files are
//! global to one render pass: every processed part feeds the same
//! `PackageContext`, and everything is flushed into the output archive in
//! one go so a failure never leaves a half-written package behind.

use crate::errors::StencilDocxError;
use crate::values::ImageSpec;
use crate::{DocxPayload, NS_PKG_REL, PAT_REL_ID, REL_TYPE_IMAGE};
use log::debug;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use zip::{write::FileOptions, ZipWriter};

#[derive(Debug)]
pub(crate) struct NewRelationship {
    pub id: String,
    pub target: String,
    pub rel_type: &'static str,
}

#[derive(Debug)]
pub(crate) struct PendingMedia {
    pub archive_path: String,
    pub source: PathBuf,
}

/// Handles returned to the caller of [`PackageContext::register_image`].
#[derive(Debug)]
pub(crate) struct RegisteredImage {
    pub rel_id: String,
    pub drawing_id: usize,
}

#[derive(Debug)]
pub(crate) struct PackageContext {
    next_rel_id: usize,
    next_drawing_id: usize,
    next_media_index: usize,
    /// Part name -> relationships to append to that part's `.rels` file.
    relationships: BTreeMap<String, Vec<NewRelationship>>,
    /// File extension -> MIME type for new content-type defaults.
    content_types: BTreeMap<String, String>,
    media: Vec<PendingMedia>,
}

impl PackageContext {
    pub(crate) fn new() -> Self {
        PackageContext {
            next_rel_id: 1,
            next_drawing_id: 1,
            next_media_index: 1,
            relationships: BTreeMap::new(),
            content_types: BTreeMap::new(),
            media: Vec::new(),
        }
    }

    /// Seed the relationship id counter past every id already present in
    /// the package, so minted ids never collide with pre-existing ones.
    pub(crate) fn scan_existing(payload: &mut DocxPayload) -> Result<Self, StencilDocxError> {
        let rel_id_pattern = Regex::new(PAT_REL_ID).unwrap();
        let mut max_id: usize = 0;

        for i in 0..payload.len() {
            let mut file = payload.by_index(i)?;
            if !file.name().ends_with(".rels") {
                continue;
            }
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            for capture in rel_id_pattern.captures_iter(&contents) {
                if let Ok(id) = capture[1].parse::<usize>() {
                    max_id = max_id.max(id);
                }
            }
        }

        let mut context = PackageContext::new();
        context.next_rel_id = max_id + 1;
        Ok(context)
    }

    /// Mint a relationship id for an image, register its relationship and
    /// content type, and queue the media file for copy-in at flush time.
    pub(crate) fn register_image(
        &mut self,
        part_name: &str,
        base_name: &str,
        spec: &ImageSpec,
    ) -> RegisteredImage {
        let extension = spec
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_lowercase();

        let rel_id = format!("rId{}", self.next_rel_id);
        self.next_rel_id += 1;
        let drawing_id = self.next_drawing_id;
        self.next_drawing_id += 1;

        let file_name = format!(
            "{}_{}.{}",
            sanitize_media_name(base_name),
            self.next_media_index,
            extension
        );
        self.next_media_index += 1;

        self.relationships
            .entry(part_name.to_string())
            .or_insert_with(Vec::new)
            .push(NewRelationship {
                id: rel_id.clone(),
                target: format!("media/{}", file_name),
                rel_type: REL_TYPE_IMAGE,
            });
        self.content_types
            .entry(extension.clone())
            .or_insert_with(|| mime_for_extension(&extension).to_string());
        self.media.push(PendingMedia {
            archive_path: format!("word/media/{}", file_name),
            source: spec.path.clone(),
        });

        debug!(
            "registered image {} as {} -> media/{}",
            spec.path.display(),
            rel_id,
            file_name
        );

        RegisteredImage { rel_id, drawing_id }
    }
}

pub(crate) fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Media file names come from placeholder names, which may contain
/// characters that have no business in an archive path.
fn sanitize_media_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        String::from("image")
    } else {
        cleaned
    }
}

/// The `.rels` part holding relationships for a given document part.
pub(crate) fn rels_part_for(part_name: &str) -> String {
    match part_name.rfind('/') {
        Some(idx) => format!("{}/_rels/{}.rels", &part_name[..idx], &part_name[idx + 1..]),
        None => format!("_rels/{}.rels", part_name),
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn relationship_entries_xml(relationships: &[NewRelationship]) -> String {
    let mut result = String::new();
    for relationship in relationships {
        result.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            xml_escape(&relationship.id),
            xml_escape(relationship.rel_type),
            xml_escape(&relationship.target)
        ));
    }
    result
}

fn fresh_rels_document(relationships: &[NewRelationship]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{}\">{}</Relationships>",
        NS_PKG_REL,
        relationship_entries_xml(relationships)
    )
}

/// Insert `insertion` right before the last occurrence of `anchor`.
fn splice_before(
    contents: &str,
    anchor: &str,
    insertion: &str,
    part_name: &str,
) -> Result<String, StencilDocxError> {
    match contents.rfind(anchor) {
        Some(position) => {
            let mut result = String::with_capacity(contents.len() + insertion.len());
            result.push_str(&contents[..position]);
            result.push_str(insertion);
            result.push_str(&contents[position..]);
            Ok(result)
        }
        None => Err(StencilDocxError::FragmentSynthesis(format!(
            "no {} anchor in {}",
            anchor, part_name
        ))),
    }
}

/// Assemble the output package: copy every untouched entry as-is, write
/// the rewritten parts, splice new relationships and content-type defaults
/// into their registry parts, and copy queued media files in. Media
/// sources are read here, at flush time; a vanished file aborts the run
/// with `MediaFileMissing` before any output is handed to the caller.
pub(crate) fn rebuild_package(
    payload: &mut DocxPayload,
    replaced_parts: &HashMap<String, String>,
    context: &PackageContext,
) -> Result<Vec<u8>, StencilDocxError> {
    let mut buf: Vec<u8> = Vec::new();

    {
        let mut cursor = Cursor::new(&mut buf);
        let mut zip = ZipWriter::new(&mut cursor);
        let options = FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o755);

        let mut pending_rels: BTreeMap<String, &[NewRelationship]> = context
            .relationships
            .iter()
            .map(|(part, rels)| (rels_part_for(part), rels.as_slice()))
            .collect();

        for i in 0..payload.len() {
            let mut file = payload.by_index(i)?;
            let name = file.name().to_string();
            if name.ends_with('/') {
                continue;
            }

            if let Some(replacement) = replaced_parts.get(&name) {
                zip.start_file(name.clone(), options)?;
                zip.write_all(replacement.as_bytes())?;
                continue;
            }

            let mut file_buf: Vec<u8> = Vec::new();
            file.read_to_end(&mut file_buf)?;

            let contents = if let Some(relationships) = pending_rels.remove(&name) {
                let existing = String::from_utf8_lossy(&file_buf).into_owned();
                splice_before(
                    &existing,
                    "</Relationships>",
                    &relationship_entries_xml(relationships),
                    &name,
                )?
                .into_bytes()
            } else if name == "[Content_Types].xml" && !context.content_types.is_empty() {
                let existing = String::from_utf8_lossy(&file_buf).into_owned();
                let mut additions = String::new();
                for (extension, mime) in &context.content_types {
                    if existing.contains(&format!("Extension=\"{}\"", extension)) {
                        continue;
                    }
                    additions.push_str(&format!(
                        r#"<Default Extension="{}" ContentType="{}"/>"#,
                        xml_escape(extension),
                        xml_escape(mime)
                    ));
                }
                if additions.is_empty() {
                    file_buf
                } else {
                    splice_before(&existing, "</Types>", &additions, &name)?.into_bytes()
                }
            } else {
                file_buf
            };

            zip.start_file(name, options)?;
            zip.write_all(&contents)?;
        }

        // Rels parts the template never had, e.g. a header that carried no
        // relationships until an image landed in it.
        for (rels_name, relationships) in pending_rels {
            debug!("creating relationship part {}", rels_name);
            zip.start_file(rels_name, options)?;
            zip.write_all(fresh_rels_document(relationships).as_bytes())?;
        }

        // Images don't compress well.
        let media_options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for media in &context.media {
            let bytes = std::fs::read(&media.source)
                .map_err(|_| StencilDocxError::MediaFileMissing(media.source.clone()))?;
            zip.start_file(media.archive_path.clone(), media_options)?;
            zip.write_all(&bytes)?;
        }

        zip.finish()?;
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rels_part_path_derivation() {
        assert_eq!(
            rels_part_for("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(
            rels_part_for("word/header1.xml"),
            "word/_rels/header1.xml.rels"
        );
    }

    #[test]
    fn register_image_mints_sequential_unique_ids() {
        let mut context = PackageContext::new();
        context.next_rel_id = 12;
        let first = context.register_image(
            "word/document.xml",
            "logo",
            &ImageSpec::new("/tmp/logo.png"),
        );
        let second = context.register_image(
            "word/document.xml",
            "logo",
            &ImageSpec::new("/tmp/logo.jpg"),
        );
        assert_eq!(first.rel_id, "rId12");
        assert_eq!(second.rel_id, "rId13");
        assert_ne!(first.drawing_id, second.drawing_id);
        let rels = &context.relationships["word/document.xml"];
        assert_eq!(rels[0].target, "media/logo_1.png");
        assert_eq!(rels[1].target, "media/logo_2.jpg");
        assert_eq!(context.content_types["png"], "image/png");
        assert_eq!(context.content_types["jpg"], "image/jpeg");
    }

    #[test]
    fn splice_before_rejects_missing_anchor() {
        let result = splice_before("<foo/>", "</Relationships>", "<bar/>", "x.rels");
        assert!(matches!(
            result,
            Err(StencilDocxError::FragmentSynthesis(_))
        ));
    }

    #[test]
    fn splice_before_inserts_at_anchor() {
        let spliced = splice_before(
            "<Relationships></Relationships>",
            "</Relationships>",
            "<Relationship/>",
            "x.rels",
        )
        .unwrap();
        assert_eq!(
            spliced,
            "<Relationships><Relationship/></Relationships>"
        );
    }

    #[test]
    fn media_names_are_sanitized() {
        assert_eq!(sanitize_media_name("photos"), "photos");
        assert_eq!(sanitize_media_name("a/b c"), "abc");
        assert_eq!(sanitize_media_name("../../"), "image");
    }
}
