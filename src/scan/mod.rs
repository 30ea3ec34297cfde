//! The marker scanner: finds `%*name*%` spans in the ordered run texts of
//! one paragraph. DOCX producers split text across runs at arbitrary points
//! (spellcheck boundaries, formatting changes, revision saves), so a marker
//! regularly starts in one run and ends several runs later.

use crate::{MARKER_END, MARKER_START};

/// A discovered marker. Offsets are byte offsets into the run's text; the
/// `start`/`start_offset` point at the opening `%` and `end`/`end_offset`
/// point one past the closing `%`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MarkerMatch {
    SameRun {
        run: usize,
        start: usize,
        end: usize,
        raw_name: String,
    },
    Spanning {
        start_run: usize,
        start_offset: usize,
        end_run: usize,
        end_offset: usize,
        raw_name: String,
    },
}

impl MarkerMatch {
    pub(crate) fn raw_name(&self) -> &str {
        match self {
            MarkerMatch::SameRun { raw_name, .. } => raw_name,
            MarkerMatch::Spanning { raw_name, .. } => raw_name,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScanOutcome {
    pub matches: Vec<MarkerMatch>,
    /// Raw name text of the first start token that never found its end
    /// token. A recoverable no-op in lenient mode.
    pub unterminated: Option<String>,
}

/// Scan the run texts of one paragraph left to right. On a start token the
/// matching end token is searched first within the same run; failing that,
/// name text is accumulated across subsequent runs until an end token turns
/// up. Scanning resumes after every processed match, so multiple markers
/// per run are each discovered independently.
pub(crate) fn scan_runs(texts: &[&str]) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut run = 0;
    let mut pos = 0;

    while run < texts.len() {
        let text = texts[run];
        let rel_start = match text[pos..].find(MARKER_START) {
            Some(idx) => idx,
            None => {
                run += 1;
                pos = 0;
                continue;
            }
        };
        let start = pos + rel_start;
        let name_start = start + MARKER_START.len();

        if let Some(rel_end) = text[name_start..].find(MARKER_END) {
            let name_end = name_start + rel_end;
            let end = name_end + MARKER_END.len();
            outcome.matches.push(MarkerMatch::SameRun {
                run,
                start,
                end,
                raw_name: text[name_start..name_end].into(),
            });
            pos = end;
            continue;
        }

        // The end token lives in a later run (or nowhere).
        let mut raw_name = String::from(&text[name_start..]);
        let mut next = run + 1;
        let mut terminated = false;
        while next < texts.len() {
            if let Some(idx) = texts[next].find(MARKER_END) {
                raw_name.push_str(&texts[next][..idx]);
                let end_offset = idx + MARKER_END.len();
                outcome.matches.push(MarkerMatch::Spanning {
                    start_run: run,
                    start_offset: start,
                    end_run: next,
                    end_offset,
                    raw_name: raw_name.clone(),
                });
                run = next;
                pos = end_offset;
                terminated = true;
                break;
            }
            raw_name.push_str(texts[next]);
            next += 1;
        }

        if !terminated {
            if outcome.unterminated.is_none() {
                outcome.unterminated = Some(raw_name);
            }
            run += 1;
            pos = 0;
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_marker_within_one_run() {
        let outcome = scan_runs(&["before %*name*% after"]);
        assert_eq!(
            outcome.matches,
            vec![MarkerMatch::SameRun {
                run: 0,
                start: 7,
                end: 15,
                raw_name: "name".into(),
            }]
        );
        assert!(outcome.unterminated.is_none());
    }

    #[test]
    fn finds_multiple_markers_in_one_run() {
        let outcome = scan_runs(&["%*a*% and %*b*%"]);
        let names: Vec<&str> = outcome.matches.iter().map(|m| m.raw_name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn finds_marker_spanning_three_runs() {
        let outcome = scan_runs(&["x %*gre", "et", "ing*% y"]);
        assert_eq!(
            outcome.matches,
            vec![MarkerMatch::Spanning {
                start_run: 0,
                start_offset: 2,
                end_run: 2,
                end_offset: 5,
                raw_name: "greeting".into(),
            }]
        );
    }

    #[test]
    fn spanning_name_keeps_interleaved_whitespace() {
        // Names may wrap across line breaks; normalization happens later.
        let outcome = scan_runs(&["%*long\n", "  name*%"]);
        assert_eq!(outcome.matches[0].raw_name(), "long\n  name");
    }

    #[test]
    fn scanning_resumes_after_spanning_match() {
        let outcome = scan_runs(&["%*first", " half*% then %*second*%"]);
        let names: Vec<&str> = outcome.matches.iter().map(|m| m.raw_name()).collect();
        assert_eq!(names, vec!["first half", "second"]);
    }

    #[test]
    fn unterminated_marker_is_a_no_op() {
        let outcome = scan_runs(&["tail %*open", "never closed"]);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unterminated.as_deref(), Some("opennever closed"));
    }

    #[test]
    fn dangling_start_pairs_with_next_end_token() {
        let outcome = scan_runs(&["%*open", "%*closed*%"]);
        // The first start token captures through the first end token found,
        // stray start delimiters included.
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].raw_name(), "open%*closed");
        assert!(outcome.unterminated.is_none());
    }

    #[test]
    fn spanning_match_then_unterminated_start_in_one_paragraph() {
        let outcome = scan_runs(&["%*fi", "rst*% and %*dangling"]);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].raw_name(), "first");
        assert_eq!(outcome.unterminated.as_deref(), Some("dangling"));
    }

    #[test]
    fn empty_runs_are_skipped() {
        let outcome = scan_runs(&["", "%*x*%", ""]);
        assert_eq!(outcome.matches.len(), 1);
    }
}
