//! Per-paragraph marker substitution.
//!
//! Paragraphs are processed through the same assembly loop the whole part
//! goes through: untouched token stretches are copied as-is and rewritten
//! paragraphs are spliced in between them. Within a paragraph, text edits
//! land on run texts right to left so earlier byte offsets stay valid, and
//! structural splices are applied last, from the back of the token vector
//! forward.

use crate::errors::StencilDocxError;
use crate::package::PackageContext;
use crate::parse::{element_spans, run_slots, RunSlot, Span};
use crate::render::image::{image_paragraph_tokens, image_run_tokens};
use crate::render::table::table_tokens;
use crate::scan::{scan_runs, MarkerMatch};
use crate::template::RenderOptions;
use crate::values::{strip_name, Classified, ReplacementTable};
use crate::{PageDimensions, Token};
use log::debug;

pub(crate) fn substitute_part(
    tokens: Vec<Token>,
    part_name: &str,
    replacements: &ReplacementTable,
    context: &mut PackageContext,
    dims: &PageDimensions,
    options: &RenderOptions,
) -> Result<Vec<Token>, StencilDocxError> {
    let paragraphs = element_spans(&tokens, "p");

    let mut result: Vec<Token> = Vec::new();
    let mut bookmark: usize = 0;

    for paragraph in paragraphs {
        // Paragraphs do not nest, so spans never overlap and the bookmark
        // only ever moves forward.
        if paragraph.start < bookmark {
            continue;
        }
        match substitute_block(&tokens, paragraph, part_name, replacements, context, dims, options)? {
            Some(rewritten) => {
                result.extend_from_slice(&tokens[bookmark..paragraph.start]);
                result.extend(rewritten);
                bookmark = paragraph.end + 1;
            }
            None => (),
        }
    }
    result.extend_from_slice(&tokens[bookmark..]);

    Ok(result)
}

/// Rewrite one paragraph. `None` means the paragraph carried no markers and
/// the caller keeps the original tokens.
fn substitute_block(
    tokens: &[Token],
    paragraph: Span,
    part_name: &str,
    replacements: &ReplacementTable,
    context: &mut PackageContext,
    dims: &PageDimensions,
    options: &RenderOptions,
) -> Result<Option<Vec<Token>>, StencilDocxError> {
    let runs = run_slots(tokens, paragraph);
    let run_texts: Vec<&str> = runs.iter().map(|r| r.text.as_str()).collect();
    let outcome = scan_runs(&run_texts);

    if let Some(dangling) = outcome.unterminated {
        if options.strict {
            return Err(StencilDocxError::UnterminatedMarker(strip_name(&dangling)));
        }
        debug!("unterminated marker start near {:?}, leaving it alone", dangling);
    }

    if outcome.matches.is_empty() {
        return Ok(None);
    }

    // Block-level replacements take over the whole paragraph; the first
    // such marker wins and anything else in the paragraph goes with it.
    for found in &outcome.matches {
        match replacements.classify(found.raw_name()) {
            Classified::FullTable(spec) => {
                return Ok(Some(table_tokens(spec, dims)));
            }
            Classified::ImageGroup { base, images } => {
                let mut out: Vec<Token> = Vec::new();
                for (entry_name, spec) in images {
                    let registered = context.register_image(part_name, &base, spec);
                    out.extend(image_paragraph_tokens(
                        &registered.rel_id,
                        entry_name,
                        spec.width,
                        spec.height,
                        registered.drawing_id,
                    ));
                }
                return Ok(Some(out));
            }
            _ => (),
        }
    }

    // Every match becomes one or more per-run edits keyed by byte range of
    // the run's original text, so markers of different kinds sharing a run
    // compose instead of clobbering each other.
    let mut edits: Vec<Vec<Edit>> = (0..runs.len()).map(|_| Vec::new()).collect();
    let mut drop_run: Vec<bool> = vec![false; runs.len()];

    for found in &outcome.matches {
        match replacements.classify(found.raw_name()) {
            Classified::Text(value) => {
                push_text_edits(&mut edits, &runs, found, value.to_string());
            }
            Classified::Skip => {
                // Unknown markers lose their delimiters but keep the name
                // visible, so missed placeholders can be spotted in output.
                let value = found.raw_name().to_string();
                debug!("no replacement for marker {:?}", strip_name(&value));
                push_text_edits(&mut edits, &runs, found, value);
            }
            Classified::Image(spec) => {
                let name = strip_name(found.raw_name());
                let registered = context.register_image(part_name, &name, spec);
                let fragment = image_run_tokens(
                    &registered.rel_id,
                    &name,
                    spec.width,
                    spec.height,
                    registered.drawing_id,
                );
                match found {
                    MarkerMatch::SameRun { run, start, end, .. } => {
                        edits[*run].push(Edit {
                            start: *start,
                            end: *end,
                            patch: Patch::Drawing(fragment),
                        });
                    }
                    MarkerMatch::Spanning {
                        start_run,
                        start_offset,
                        end_run,
                        end_offset,
                        ..
                    } => {
                        edits[*start_run].push(Edit {
                            start: *start_offset,
                            end: runs[*start_run].text.len(),
                            patch: Patch::Drawing(fragment),
                        });
                        for interior in (*start_run + 1)..*end_run {
                            drop_run[interior] = true;
                        }
                        edits[*end_run].push(Edit {
                            start: 0,
                            end: *end_offset,
                            patch: Patch::Text(String::new()),
                        });
                    }
                }
            }
            // Handled above.
            Classified::FullTable(_) | Classified::ImageGroup { .. } => (),
        }
    }

    let mut local: Vec<Token> = tokens[paragraph.start..=paragraph.end].to_vec();
    let mut splices: Vec<(Span, Vec<Token>)> = Vec::new();

    let rel = |span: Span| Span {
        start: span.start - paragraph.start,
        end: span.end - paragraph.start,
    };

    for (i, slot) in runs.iter().enumerate() {
        if drop_run[i] {
            splices.push((rel(slot.span), Vec::new()));
            continue;
        }
        if edits[i].is_empty() {
            continue;
        }
        edits[i].sort_by_key(|edit| edit.start);
        let run_edits = std::mem::take(&mut edits[i]);

        if run_edits.iter().any(|edit| matches!(edit.patch, Patch::Drawing(_))) {
            // The run splits around its drawings: text stretches (original
            // text plus scalar replacements) become cloned runs between the
            // image fragments. One splice per run, whatever it carried.
            let mut replacement: Vec<Token> = Vec::new();
            let mut pending = String::new();
            let mut cursor: usize = 0;
            for edit in run_edits {
                pending.push_str(&slot.text[cursor..edit.start]);
                match edit.patch {
                    Patch::Text(value) => pending.push_str(&value),
                    Patch::Drawing(fragment) => {
                        if !pending.is_empty() {
                            replacement.extend(run_with_text(
                                &local,
                                rel(slot.span),
                                paragraph.start,
                                slot,
                                &pending,
                            ));
                            pending.clear();
                        }
                        replacement.extend(fragment);
                    }
                }
                cursor = edit.end;
            }
            pending.push_str(&slot.text[cursor..]);
            if !pending.is_empty() {
                replacement.extend(run_with_text(
                    &local,
                    rel(slot.span),
                    paragraph.start,
                    slot,
                    &pending,
                ));
            }
            splices.push((rel(slot.span), replacement));
        } else {
            // Text-only run: patch right to left so byte offsets stay
            // valid, then write the result back. The run's first text
            // token carries the whole new text, the rest go empty.
            let mut text = slot.text.clone();
            for edit in run_edits.iter().rev() {
                if let Patch::Text(value) = &edit.patch {
                    text.replace_range(edit.start..edit.end, value);
                }
            }
            let mut first = true;
            for &abs in &slot.text_tokens {
                let idx = abs - paragraph.start;
                if first {
                    local[idx].set_characters(text.clone());
                    first = false;
                } else {
                    local[idx].set_characters(String::new());
                }
            }
        }
    }

    splices.sort_by(|a, b| b.0.start.cmp(&a.0.start));
    for (span, replacement) in splices {
        local.splice(span.start..=span.end, replacement);
    }

    Ok(Some(local))
}

/// What one marker does to one run's byte range.
enum Patch {
    Text(String),
    Drawing(Vec<Token>),
}

struct Edit {
    start: usize,
    end: usize,
    patch: Patch,
}

/// Record the per-run edits of a text replacement (or delimiter
/// stripping). A spanning match consumes the start run's tail, whole
/// interior runs, and the end run's head.
fn push_text_edits(
    edits: &mut [Vec<Edit>],
    runs: &[RunSlot],
    found: &MarkerMatch,
    value: String,
) {
    match found {
        MarkerMatch::SameRun { run, start, end, .. } => {
            edits[*run].push(Edit {
                start: *start,
                end: *end,
                patch: Patch::Text(value),
            });
        }
        MarkerMatch::Spanning {
            start_run,
            start_offset,
            end_run,
            end_offset,
            ..
        } => {
            edits[*start_run].push(Edit {
                start: *start_offset,
                end: runs[*start_run].text.len(),
                patch: Patch::Text(value),
            });
            for interior in (*start_run + 1)..*end_run {
                edits[interior].push(Edit {
                    start: 0,
                    end: runs[interior].text.len(),
                    patch: Patch::Text(String::new()),
                });
            }
            edits[*end_run].push(Edit {
                start: 0,
                end: *end_offset,
                patch: Patch::Text(String::new()),
            });
        }
    }
}

/// Clone a run's tokens out of the block copy with its text swapped for the
/// given string. Keeps the run's properties (`w:rPr`) intact.
fn run_with_text(
    block: &[Token],
    run_rel: Span,
    block_offset: usize,
    slot: &RunSlot,
    text: &str,
) -> Vec<Token> {
    let mut cloned: Vec<Token> = block[run_rel.start..=run_rel.end].to_vec();
    let mut first = true;
    for &abs in &slot.text_tokens {
        let idx = abs - block_offset - run_rel.start;
        if first {
            cloned[idx].set_characters(text.to_string());
            first = false;
        } else {
            cloned[idx].set_characters(String::new());
        }
    }
    cloned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::xml_to_token_vec;
    use crate::render::write_token_vector_to_string;
    use crate::values::{CellValue, ImageSpec};
    use crate::NS_WP_ML;

    fn wrap(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}"><w:body>{}</w:body></w:document>"#,
            NS_WP_ML, body
        )
    }

    fn run_engine(body: &str, replacements: &ReplacementTable) -> String {
        let tokens = xml_to_token_vec(&wrap(body)).unwrap();
        let mut context = PackageContext::new();
        let rewritten = substitute_part(
            tokens,
            "word/document.xml",
            replacements,
            &mut context,
            &PageDimensions::a4_default(),
            &RenderOptions::default(),
        )
        .unwrap();
        write_token_vector_to_string(&rewritten).unwrap()
    }

    #[test]
    fn same_run_marker_keeps_surrounding_text() {
        let mut table = ReplacementTable::new();
        table.set_text("name", "World");
        let rendered = run_engine(
            "<w:p><w:r><w:t>Hello %*name*%!</w:t></w:r></w:p>",
            &table,
        );
        assert!(rendered.contains("Hello World!"));
        assert!(!rendered.contains("%*"));
    }

    #[test]
    fn spanning_marker_collapses_into_start_run() {
        let mut table = ReplacementTable::new();
        table.set_text("greeting", "hi");
        let rendered = run_engine(
            "<w:p><w:r><w:t>a %*gre</w:t></w:r><w:r><w:t>et</w:t></w:r><w:r><w:t>ing*% b</w:t></w:r></w:p>",
            &table,
        );
        assert!(rendered.contains("a hi"));
        assert!(rendered.contains(" b"));
        assert!(!rendered.contains("et"));
        assert!(!rendered.contains("%*"));
    }

    #[test]
    fn unknown_marker_loses_delimiters_only() {
        let table = ReplacementTable::new();
        let rendered = run_engine("<w:p><w:r><w:t>%*missing*%</w:t></w:r></w:p>", &table);
        assert!(rendered.contains("missing"));
        assert!(!rendered.contains("%*"));
    }

    #[test]
    fn table_marker_replaces_whole_paragraph() {
        let mut table = ReplacementTable::new();
        table.set_table("data", vec![vec![CellValue::new("x"), CellValue::new("y")]]);
        let rendered = run_engine(
            "<w:p><w:r><w:t>ignored %*data*% ignored</w:t></w:r></w:p>",
            &table,
        );
        assert!(rendered.contains("<w:tbl>"));
        assert!(!rendered.contains("ignored"));
    }

    #[test]
    fn image_marker_becomes_inline_drawing() {
        let mut table = ReplacementTable::new();
        table.set_image("logo", ImageSpec::new("/tmp/logo.png"));
        let rendered = run_engine(
            "<w:p><w:r><w:t>before %*logo*% after</w:t></w:r></w:p>",
            &table,
        );
        assert!(rendered.contains("w:drawing"));
        assert!(rendered.contains("before "));
        assert!(rendered.contains(" after"));
    }

    #[test]
    fn text_marker_survives_sharing_a_run_with_an_image() {
        let mut table = ReplacementTable::new();
        table.set_text("t", "X");
        table.set_image("logo", ImageSpec::new("/tmp/logo.png"));
        let rendered = run_engine(
            "<w:p><w:r><w:t>A %*t*% B %*logo*% C</w:t></w:r></w:p>",
            &table,
        );
        assert!(rendered.contains("A X B "));
        assert!(rendered.contains("w:drawing"));
        assert!(rendered.contains(" C"));
        assert!(!rendered.contains("%*"));
    }

    #[test]
    fn two_image_markers_in_one_run_yield_two_drawings() {
        let mut table = ReplacementTable::new();
        table.set_image("a", ImageSpec::new("/tmp/a.png"));
        table.set_image("b", ImageSpec::new("/tmp/b.png"));
        let rendered = run_engine(
            "<w:p><w:r><w:t>%*a*% mid %*b*%</w:t></w:r></w:p>",
            &table,
        );
        assert_eq!(rendered.matches("<w:drawing>").count(), 2);
        assert!(rendered.contains(" mid "));
        assert!(!rendered.contains("%*"));
    }

    #[test]
    fn strict_mode_rejects_unterminated_markers() {
        let mut table = ReplacementTable::new();
        table.set_text("x", "y");
        let tokens =
            xml_to_token_vec(&wrap("<w:p><w:r><w:t>%*open never closed</w:t></w:r></w:p>"))
                .unwrap();
        let mut context = PackageContext::new();
        let result = substitute_part(
            tokens,
            "word/document.xml",
            &table,
            &mut context,
            &PageDimensions::a4_default(),
            &RenderOptions { strict: true },
        );
        assert!(matches!(
            result,
            Err(StencilDocxError::UnterminatedMarker(_))
        ));
    }

    #[test]
    fn paragraphs_without_markers_are_untouched() {
        let table = ReplacementTable::new();
        let body = "<w:p><w:r><w:t>plain text</w:t></w:r></w:p>";
        let rendered = run_engine(body, &table);
        assert!(rendered.contains("plain text"));
    }
}
