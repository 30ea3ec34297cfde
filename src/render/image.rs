//! Inline drawing fragments referencing an image relationship.

use crate::render::FragmentBuilder;
use crate::{Token, EMU_PER_PIXEL, NS_DWML_PIC};

/// A run containing one inline drawing. The run replaces whichever run (or
/// runs) carried the image marker.
pub(crate) fn image_run_tokens(
    rel_id: &str,
    name: &str,
    width_px: u32,
    height_px: u32,
    drawing_id: usize,
) -> Vec<Token> {
    let cx = (i64::from(width_px) * EMU_PER_PIXEL).to_string();
    let cy = (i64::from(height_px) * EMU_PER_PIXEL).to_string();
    let id = drawing_id.to_string();
    let pic_name = format!("Picture {}", name);

    let mut builder = FragmentBuilder::new();
    builder
        .open("w", "r", &[])
        .open("w", "drawing", &[])
        .open(
            "wp",
            "inline",
            &[
                ("", "distT", "0"),
                ("", "distB", "0"),
                ("", "distL", "0"),
                ("", "distR", "0"),
            ],
        )
        .leaf("wp", "extent", &[("", "cx", &cx), ("", "cy", &cy)])
        .leaf("wp", "docPr", &[("", "id", &id), ("", "name", &pic_name)])
        .open("a", "graphic", &[])
        .open("a", "graphicData", &[("", "uri", NS_DWML_PIC)])
        .open("pic", "pic", &[])
        .open("pic", "nvPicPr", &[])
        .leaf("pic", "cNvPr", &[("", "id", &id), ("", "name", &pic_name)])
        .leaf("pic", "cNvPicPr", &[])
        .close() // nvPicPr
        .open("pic", "blipFill", &[])
        .leaf("a", "blip", &[("r", "embed", rel_id)])
        .open("a", "stretch", &[])
        .leaf("a", "fillRect", &[])
        .close() // stretch
        .close() // blipFill
        .open("pic", "spPr", &[])
        .open("a", "xfrm", &[])
        .leaf("a", "off", &[("", "x", "0"), ("", "y", "0")])
        .leaf("a", "ext", &[("", "cx", &cx), ("", "cy", &cy)])
        .close() // xfrm
        .open("a", "prstGeom", &[("", "prst", "rect")])
        .leaf("a", "avLst", &[])
        .close(); // prstGeom

    // finish() closes spPr, pic, graphicData, graphic, inline, drawing, r
    builder.finish()
}

/// A standalone centered paragraph wrapping one inline drawing, used when a
/// whole block is replaced by an image group entry.
pub(crate) fn image_paragraph_tokens(
    rel_id: &str,
    name: &str,
    width_px: u32,
    height_px: u32,
    drawing_id: usize,
) -> Vec<Token> {
    let mut builder = FragmentBuilder::new();
    builder
        .open("w", "p", &[])
        .open("w", "pPr", &[])
        .leaf("w", "jc", &[("w", "val", "center")])
        .close() // pPr
        .extend(image_run_tokens(rel_id, name, width_px, height_px, drawing_id));
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::write_token_vector_to_string;

    #[test]
    fn drawing_references_relationship_and_extents() {
        let rendered =
            write_token_vector_to_string(&image_run_tokens("rId9", "logo", 300, 150, 3)).unwrap();
        assert!(rendered.contains(r#"r:embed="rId9""#));
        // 300 px * 9525 EMU, 150 px * 9525 EMU
        assert!(rendered.contains(r#"cx="2857500""#));
        assert!(rendered.contains(r#"cy="1428750""#));
        assert!(rendered.contains("pic:blipFill"));
    }

    #[test]
    fn group_paragraph_is_centered() {
        let rendered =
            write_token_vector_to_string(&image_paragraph_tokens("rId4", "photos", 300, 300, 1))
                .unwrap();
        assert!(rendered.contains(r#"<w:jc w:val="center""#));
        assert!(rendered.contains("</w:p>"));
    }
}
