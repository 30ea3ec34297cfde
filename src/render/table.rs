//! Building a whole table structure from tabular replacement data.

use crate::render::FragmentBuilder;
use crate::values::{CellValue, TableSpec};
use crate::{PageDimensions, Token};

/// Shading of the header row under the styled preset.
static HEADER_FILL: &str = "D9D9D9";
/// Highlight fill of the last column in non-header rows under the styled preset.
static LAST_COLUMN_FILL: &str = "FFF2CC";

/// Synthesize a table token fragment. The grid takes its column count from
/// the first row; column widths split the printable page width evenly.
/// Returns an empty fragment for empty data.
pub(crate) fn table_tokens(spec: &TableSpec, dims: &PageDimensions) -> Vec<Token> {
    let no_of_cols = spec.rows.first().map(Vec::len).unwrap_or(0);
    if no_of_cols == 0 {
        return Vec::new();
    }

    let col_width = (dims.width - dims.m_left - dims.m_right) / no_of_cols as i32;
    let col_width_str = col_width.to_string();

    let mut builder = FragmentBuilder::new();
    builder.open("w", "tbl", &[]);

    builder.open("w", "tblPr", &[]);
    builder.leaf("w", "tblStyle", &[("w", "val", "TableGrid")]);
    builder.leaf("w", "tblW", &[("w", "w", "0"), ("w", "type", "auto")]);
    if spec.styled {
        builder.open("w", "tblBorders", &[]);
        for side in &["top", "left", "bottom", "right", "insideH", "insideV"] {
            builder.leaf(
                "w",
                side,
                &[
                    ("w", "val", "single"),
                    ("w", "sz", "4"),
                    ("w", "space", "0"),
                    ("w", "color", "auto"),
                ],
            );
        }
        builder.close();
    }
    builder.leaf(
        "w",
        "tblLook",
        &[
            ("w", "val", "04A0"),
            ("w", "firstRow", "1"),
            ("w", "lastRow", "0"),
            ("w", "firstColumn", "1"),
            ("w", "lastColumn", "0"),
            ("w", "noHBand", "0"),
            ("w", "noVBand", "1"),
        ],
    );
    builder.close(); // tblPr

    builder.open("w", "tblGrid", &[]);
    for _ in 0..no_of_cols {
        builder.leaf("w", "gridCol", &[("w", "w", &col_width_str)]);
    }
    builder.close();

    for (row_i, row) in spec.rows.iter().enumerate() {
        builder.open("w", "tr", &[]);
        for col_i in 0..no_of_cols {
            let cell = row.get(col_i);
            let header = spec.styled && row_i == 0;
            let highlight = spec.styled && row_i > 0 && col_i + 1 == no_of_cols;
            build_cell(&mut builder, cell, &col_width_str, header, highlight, spec.styled);
        }
        builder.close(); // tr
    }

    builder.close(); // tbl
    builder.finish()
}

fn build_cell(
    builder: &mut FragmentBuilder,
    cell: Option<&CellValue>,
    col_width: &str,
    header: bool,
    highlight: bool,
    centered: bool,
) {
    builder.open("w", "tc", &[]);

    builder.open("w", "tcPr", &[]);
    builder.leaf("w", "tcW", &[("w", "w", col_width), ("w", "type", "dxa")]);
    // Per-cell background always wins over the preset fills.
    let fill = cell
        .and_then(|c| c.bg_color.as_deref())
        .or(if header {
            Some(HEADER_FILL)
        } else if highlight {
            Some(LAST_COLUMN_FILL)
        } else {
            None
        });
    if let Some(fill) = fill {
        builder.leaf(
            "w",
            "shd",
            &[("w", "val", "clear"), ("w", "color", "auto"), ("w", "fill", fill)],
        );
    }
    builder.close(); // tcPr

    builder.open("w", "p", &[]);
    if centered {
        builder.open("w", "pPr", &[]);
        builder.leaf("w", "jc", &[("w", "val", "center")]);
        builder.close();
    }
    builder.open("w", "r", &[]);
    let font_color = cell.and_then(|c| c.font_color.as_deref());
    if header || font_color.is_some() {
        builder.open("w", "rPr", &[]);
        if header {
            builder.leaf("w", "b", &[]);
        }
        if let Some(color) = font_color {
            builder.leaf("w", "color", &[("w", "val", color)]);
        }
        builder.close();
    }
    builder.open("w", "t", &[("xml", "space", "preserve")]);
    if let Some(cell) = cell {
        builder.text(&cell.value);
    }
    builder.close(); // t
    builder.close(); // r
    builder.close(); // p

    builder.close(); // tc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::write_token_vector_to_string;
    use crate::values::CellValue;

    fn spec(rows: Vec<Vec<CellValue>>, styled: bool) -> TableSpec {
        TableSpec { rows, styled }
    }

    fn render(spec: &TableSpec) -> String {
        write_token_vector_to_string(&table_tokens(spec, &PageDimensions::a4_default())).unwrap()
    }

    #[test]
    fn empty_data_produces_empty_fragment() {
        assert!(table_tokens(&spec(vec![], false), &PageDimensions::a4_default()).is_empty());
    }

    #[test]
    fn grid_column_count_follows_first_row() {
        let rendered = render(&spec(
            vec![vec!["a".into(), "b".into(), "c".into()]],
            false,
        ));
        assert_eq!(rendered.matches("<w:gridCol").count(), 3);
        assert_eq!(rendered.matches("<w:tc>").count(), 3);
    }

    #[test]
    fn plain_preset_has_no_borders_or_centering() {
        let rendered = render(&spec(vec![vec!["a".into()], vec!["b".into()]], false));
        assert!(!rendered.contains("tblBorders"));
        assert!(!rendered.contains("<w:jc"));
        assert!(!rendered.contains("<w:shd"));
    }

    #[test]
    fn styled_preset_shades_header_and_last_column() {
        let rendered = render(&spec(
            vec![
                vec!["h1".into(), "h2".into()],
                vec!["a".into(), "b".into()],
            ],
            true,
        ));
        assert!(rendered.contains("tblBorders"));
        assert!(rendered.contains(r#"w:fill="D9D9D9""#));
        assert!(rendered.contains(r#"w:fill="FFF2CC""#));
        assert!(rendered.contains(r#"<w:jc w:val="center""#));
        assert!(rendered.contains("<w:b ") || rendered.contains("<w:b/>") || rendered.contains("<w:b />"));
    }

    #[test]
    fn cell_colors_override_preset() {
        let rendered = render(&spec(
            vec![vec![CellValue::new("x")
                .with_bg_color("FF0000")
                .with_font_color("00FF00")]],
            true,
        ));
        assert!(rendered.contains(r#"w:fill="FF0000""#));
        assert!(!rendered.contains(HEADER_FILL));
        assert!(rendered.contains(r#"<w:color w:val="00FF00""#));
    }

    #[test]
    fn short_rows_render_empty_trailing_cells() {
        let rendered = render(&spec(
            vec![vec!["a".into(), "b".into()], vec!["c".into()]],
            false,
        ));
        assert_eq!(rendered.matches("<w:tc>").count(), 4);
    }
}
