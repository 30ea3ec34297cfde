//! Row-template expansion.
//!
//! A table row whose cells carry indexed markers (`%*invoiceRow1*%`,
//! `%*invoiceRow2*%`, ...) acts as a per-row template: it is replicated
//! once per data row of the matching `prefix(token)` table binding, with
//! each clone's markers filled from that data row. Expansion runs before
//! generic substitution; otherwise the skip policy would strip the row
//! markers first.

use crate::errors::StencilDocxError;
use crate::parse::{
    concatenated_text, direct_child_span, element_spans, element_spans_within, text_token_indices,
    Span,
};
use crate::render::{end_tag_event, start_tag_event};
use crate::template::RenderOptions;
use crate::values::{strip_name, CellValue, ReplacementTable};
use crate::{Token, LEGACY_ROW_PREFIX, PAT_MARKER};
use log::debug;
use regex::Regex;

/// Expand every row template in the part, one row per pass, until a full
/// pass finds nothing left to expand. Each expansion consumes the markers
/// it matched, so the loop terminates.
pub(crate) fn expand_row_templates(
    mut tokens: Vec<Token>,
    replacements: &ReplacementTable,
    options: &RenderOptions,
) -> Result<Vec<Token>, StencilDocxError> {
    let marker_pattern = Regex::new(PAT_MARKER).unwrap();

    loop {
        match expand_first(&tokens, replacements, options, &marker_pattern)? {
            Some((row, expansion)) => {
                let mut next: Vec<Token> =
                    Vec::with_capacity(tokens.len() + expansion.len());
                next.extend_from_slice(&tokens[..row.start]);
                next.extend(expansion);
                next.extend_from_slice(&tokens[row.end + 1..]);
                tokens = next;
            }
            None => return Ok(tokens),
        }
    }
}

fn expand_first(
    tokens: &[Token],
    replacements: &ReplacementTable,
    options: &RenderOptions,
    marker_pattern: &Regex,
) -> Result<Option<(Span, Vec<Token>)>, StencilDocxError> {
    let tables = element_spans(tokens, "tbl");

    for table in &tables {
        // Rows of nested tables are handled when the iteration reaches the
        // nested table itself.
        let nested: Vec<Span> = tables
            .iter()
            .filter(|other| table.contains(other))
            .copied()
            .collect();

        for row in element_spans_within(tokens, *table, "tr") {
            if nested.iter().any(|t| t.contains(&row)) {
                continue;
            }
            if let Some(expansion) =
                try_expand_row(tokens, row, replacements, options, marker_pattern)?
            {
                return Ok(Some((row, expansion)));
            }
        }
    }

    Ok(None)
}

/// Expand one row if it is a row template with exactly one matching data
/// binding. `None` leaves the row for generic substitution.
fn try_expand_row(
    tokens: &[Token],
    row: Span,
    replacements: &ReplacementTable,
    options: &RenderOptions,
    marker_pattern: &Regex,
) -> Result<Option<Vec<Token>>, StencilDocxError> {
    let row_text = concatenated_text(tokens, row);
    let first_marker = match marker_pattern.captures(&row_text) {
        Some(captures) => strip_name(&captures[1]),
        None => return Ok(None),
    };

    let prefix = derive_prefix(&first_marker);
    let bindings = replacements.row_bindings(prefix);
    if bindings.len() != 1 {
        if bindings.len() > 1 {
            if options.strict {
                return Err(StencilDocxError::AmbiguousRowBinding(prefix.to_string()));
            }
            debug!("row prefix {:?} has {} bindings, skipping", prefix, bindings.len());
        }
        return Ok(None);
    }
    let spec = bindings[0].1;
    if spec.rows.is_empty() {
        return Ok(None);
    }

    let template: Vec<Token> = tokens[row.start..=row.end].to_vec();
    let mut expansion: Vec<Token> = Vec::new();
    for data_row in &spec.rows {
        expansion.extend(fill_row(&template, prefix, data_row, marker_pattern));
    }
    Ok(Some(expansion))
}

/// The binding prefix of an indexed marker is the marker minus its trailing
/// digits. Purely numeric markers bind to the fixed legacy prefix.
fn derive_prefix(marker: &str) -> &str {
    let prefix = marker.trim_end_matches(|c: char| c.is_ascii_digit());
    if prefix.is_empty() {
        LEGACY_ROW_PREFIX
    } else {
        prefix
    }
}

/// The 1-based column index an indexed marker refers to under the given
/// prefix. `None` for markers of a different prefix.
fn marker_index(marker: &str, prefix: &str) -> Option<usize> {
    let digits = if marker.chars().all(|c| c.is_ascii_digit()) {
        if prefix != LEGACY_ROW_PREFIX {
            return None;
        }
        marker
    } else {
        match marker.strip_prefix(prefix) {
            Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => return None,
        }
    };
    match digits.parse::<usize>() {
        Ok(index) if index >= 1 => Some(index),
        _ => None,
    }
}

/// One clone of the template row with its markers filled from one data row.
fn fill_row(
    template: &[Token],
    prefix: &str,
    data_row: &[CellValue],
    marker_pattern: &Regex,
) -> Vec<Token> {
    let row = Span {
        start: 0,
        end: template.len() - 1,
    };
    let nested_tables = element_spans_within(template, row, "tbl");
    let cells: Vec<Span> = element_spans_within(template, row, "tc")
        .into_iter()
        .filter(|cell| !nested_tables.iter().any(|t| t.contains(cell)))
        .collect();

    let mut result: Vec<Token> = Vec::new();
    let mut bookmark: usize = 0;
    for cell in cells {
        result.extend_from_slice(&template[bookmark..cell.start]);
        result.extend(fill_cell(template, cell, prefix, data_row, marker_pattern));
        bookmark = cell.end + 1;
    }
    result.extend_from_slice(&template[bookmark..]);
    result
}

fn fill_cell(
    template: &[Token],
    cell: Span,
    prefix: &str,
    data_row: &[CellValue],
    marker_pattern: &Regex,
) -> Vec<Token> {
    let text = concatenated_text(template, cell);
    let marker = match marker_pattern.captures(&text) {
        Some(captures) => strip_name(&captures[1]),
        None => return template[cell.start..=cell.end].to_vec(),
    };

    let mut local: Vec<Token> = template[cell.start..=cell.end].to_vec();

    match marker_index(&marker, prefix) {
        Some(index) => match data_row.get(index - 1) {
            Some(cell_value) => {
                set_cell_text(&mut local, &cell_value.value);
                if let Some(fill) = cell_value.bg_color.as_deref() {
                    set_cell_shading(&mut local, fill);
                }
                if let Some(color) = cell_value.font_color.as_deref() {
                    set_run_colors(&mut local, color);
                }
            }
            None => {
                // The data row has no column for this index: keep the name
                // visible like any unresolved marker.
                let stripped = marker_pattern
                    .replace_all(&text, |captures: &regex::Captures| {
                        captures[1].to_string()
                    })
                    .into_owned();
                set_cell_text(&mut local, &stripped);
            }
        },
        None => {
            // Marker of a different prefix: strip delimiters and leave the
            // name visible, matching the engine's skip policy.
            let stripped = marker_pattern
                .replace_all(&text, |captures: &regex::Captures| captures[1].to_string())
                .into_owned();
            set_cell_text(&mut local, &stripped);
        }
    }

    local
}

/// The cell's first text token carries the whole new text, the rest go
/// empty. A cell without text tokens is left alone.
fn set_cell_text(local: &mut [Token], text: &str) {
    let span = Span {
        start: 0,
        end: local.len() - 1,
    };
    let mut first = true;
    for i in text_token_indices(local, span) {
        if first {
            local[i].set_characters(text.to_string());
            first = false;
        } else {
            local[i].set_characters(String::new());
        }
    }
}

fn shading_event(fill: &str) -> xml::reader::XmlEvent {
    start_tag_event(
        "w",
        "shd",
        &[("w", "val", "clear"), ("w", "color", "auto"), ("w", "fill", fill)],
    )
}

/// Set the cell's background fill, replacing an existing `w:shd` rather
/// than stacking a second one.
fn set_cell_shading(local: &mut Vec<Token>, fill: &str) {
    match direct_child_span(local, "tcPr") {
        Some(tc_pr) => {
            let tc_pr_slice = &local[tc_pr.start..=tc_pr.end];
            match direct_child_span(tc_pr_slice, "shd") {
                Some(shd) => {
                    local[tc_pr.start + shd.start] = Token::normal(shading_event(fill));
                }
                None => {
                    local.splice(
                        tc_pr.end..tc_pr.end,
                        vec![
                            Token::normal(shading_event(fill)),
                            Token::normal(end_tag_event("w", "shd")),
                        ],
                    );
                }
            }
        }
        None => {
            // No cell properties at all; insert tcPr right after the cell's
            // start token.
            local.splice(
                1..1,
                vec![
                    Token::normal(start_tag_event("w", "tcPr", &[])),
                    Token::normal(shading_event(fill)),
                    Token::normal(end_tag_event("w", "shd")),
                    Token::normal(end_tag_event("w", "tcPr")),
                ],
            );
        }
    }
}

fn color_event(color: &str) -> xml::reader::XmlEvent {
    start_tag_event("w", "color", &[("w", "val", color)])
}

/// Set the font color on every run in the cell, replacing an existing
/// `w:color` rather than stacking a second one. Run spans are recomputed
/// after each mutation since insertions shift indices.
fn set_run_colors(local: &mut Vec<Token>, color: &str) {
    let mut cursor: usize = 0;
    loop {
        let run = match element_spans(local, "r")
            .into_iter()
            .find(|r| r.start >= cursor)
        {
            Some(run) => run,
            None => return,
        };
        cursor = run.start + 1;

        let run_slice = &local[run.start..=run.end];
        match direct_child_span(run_slice, "rPr") {
            Some(r_pr_rel) => {
                let r_pr = Span {
                    start: run.start + r_pr_rel.start,
                    end: run.start + r_pr_rel.end,
                };
                let r_pr_slice = &local[r_pr.start..=r_pr.end];
                match direct_child_span(r_pr_slice, "color") {
                    Some(existing) => {
                        local[r_pr.start + existing.start] = Token::normal(color_event(color));
                    }
                    None => {
                        local.splice(
                            r_pr.end..r_pr.end,
                            vec![
                                Token::normal(color_event(color)),
                                Token::normal(end_tag_event("w", "color")),
                            ],
                        );
                    }
                }
            }
            None => {
                local.splice(
                    run.start + 1..run.start + 1,
                    vec![
                        Token::normal(start_tag_event("w", "rPr", &[])),
                        Token::normal(color_event(color)),
                        Token::normal(end_tag_event("w", "color")),
                        Token::normal(end_tag_event("w", "rPr")),
                    ],
                );
            }
        }
    }
}
