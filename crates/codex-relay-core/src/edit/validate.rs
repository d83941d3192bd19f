//! Structural validation and range repair for parsed edits.
//!
//! Validation collects every violation in a batch instead of stopping at the
//! first one. Repair fills in missing or inverted end lines from the code
//! body's line count; callers re-validate once afterwards and never repair
//! twice.

use serde::{Deserialize, Serialize};

use super::model::{body_line_count, Edit, LineRange, UNSPECIFIED_LINE};

/// Outcome of validating a batch of edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn check_range(errors: &mut Vec<String>, label: &str, section: &str, range: LineRange) {
    if range.start == UNSPECIFIED_LINE {
        errors.push(format!("{label}: {section} start line is missing"));
    }
    if range.end < range.start {
        errors.push(format!(
            "{label}: {section} end line {} is before start line {}",
            range.end, range.start
        ));
    }
}

/// Check every edit; positions in messages are 1-based.
pub fn validate_edits(edits: &[Edit]) -> ValidationReport {
    let mut errors = Vec::new();
    for (idx, edit) in edits.iter().enumerate() {
        let label = edit.label(idx + 1);
        check_range(&mut errors, &label, "old", edit.old_range);
        check_range(&mut errors, &label, "new", edit.new_range);
        // A body of only whitespace carries no code and counts as empty.
        if edit.old_code.trim().is_empty() {
            errors.push(format!("{label}: old code is empty"));
        }
        if edit.new_code.trim().is_empty() {
            errors.push(format!("{label}: new code is empty"));
        }
    }
    ValidationReport { errors }
}

fn repair_range(range: LineRange, body: &str) -> LineRange {
    if !range.needs_repair() {
        return range;
    }
    let span = body_line_count(body);
    LineRange::new(range.start, range.start.saturating_add(span.saturating_sub(1)))
}

/// Infer missing end lines from code-body length, old and new independently.
///
/// Valid ranges are left untouched, so repairing twice changes nothing.
pub fn repair_edits(edits: Vec<Edit>) -> Vec<Edit> {
    edits
        .into_iter()
        .map(|edit| Edit {
            old_range: repair_range(edit.old_range, &edit.old_code),
            new_range: repair_range(edit.new_range, &edit.new_code),
            ..edit
        })
        .collect()
}

/// Validate, and when `auto_repair` is set and validation fails, repair and
/// validate exactly once more.
pub fn validate_with_repair(edits: Vec<Edit>, auto_repair: bool) -> (Vec<Edit>, ValidationReport) {
    let report = validate_edits(&edits);
    if report.is_valid() || !auto_repair {
        return (edits, report);
    }
    tracing::debug!(
        event = "edits.repair_attempted",
        violations = report.errors.len()
    );
    let repaired = repair_edits(edits);
    let report = validate_edits(&repaired);
    (repaired, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(old: (u32, u32), old_code: &str, new: (u32, u32), new_code: &str) -> Edit {
        Edit::new(
            Some("src/main.rs"),
            LineRange::new(old.0, old.1),
            old_code,
            LineRange::new(new.0, new.1),
            new_code,
        )
    }

    #[test]
    fn test_valid_edit_passes() {
        let report = validate_edits(&[edit((1, 2), "a\nb", (1, 1), "c")]);
        assert!(report.is_valid());
    }

    #[test]
    fn test_collects_all_violations() {
        let edits = vec![
            edit((5, 3), "a", (1, 1), ""),
            edit((0, 0), "", (2, 1), "x"),
        ];
        let report = validate_edits(&edits);
        assert_eq!(report.errors.len(), 5);
        assert!(report.errors[0].contains("edit 1 (src/main.rs): old end line 3"));
        assert!(report.errors.iter().any(|e| e.contains("edit 2") && e.contains("old start line is missing")));
        assert!(report.errors.iter().any(|e| e.contains("edit 2") && e.contains("new end line 1")));
    }

    #[test]
    fn test_whitespace_only_bodies_are_empty() {
        let report = validate_edits(&[edit((1, 1), " \t", (1, 2), "\n\n")]);
        assert_eq!(
            report.errors,
            vec![
                "edit 1 (src/main.rs): old code is empty",
                "edit 1 (src/main.rs): new code is empty",
            ]
        );
        assert!(validate_edits(&[edit((1, 1), "  x", (1, 1), "\ty")]).is_valid());
    }

    #[test]
    fn test_repair_infers_new_end_from_body() {
        let body = "l1\nl2\nl3\nl4\nl5";
        let repaired = repair_edits(vec![edit((10, 10), "old", (10, 0), body)]);
        assert_eq!(repaired[0].new_range, LineRange::new(10, 14));
        assert_eq!(repaired[0].old_range, LineRange::new(10, 10));
    }

    #[test]
    fn test_repair_fixes_inverted_old_range() {
        let repaired = repair_edits(vec![edit((8, 2), "a\nb\nc", (8, 8), "d")]);
        assert_eq!(repaired[0].old_range, LineRange::new(8, 10));
    }

    #[test]
    fn test_repair_is_idempotent_on_valid_edits() {
        let edits = vec![
            edit((1, 3), "a\nb\nc", (1, 1), "d"),
            edit((20, 20), "x", (20, 22), "y\nz\nw"),
        ];
        assert_eq!(repair_edits(edits.clone()), edits);
        let once = repair_edits(vec![edit((4, 0), "a\nb", (4, 0), "c")]);
        assert_eq!(repair_edits(once.clone()), once);
    }

    #[test]
    fn test_validate_with_repair_reports_remaining_errors() {
        let (edits, report) = validate_with_repair(vec![edit((3, 0), "a", (3, 0), "")], true);
        assert_eq!(edits[0].old_range, LineRange::new(3, 3));
        assert_eq!(report.errors, vec!["edit 1 (src/main.rs): new code is empty"]);
    }

    #[test]
    fn test_validate_without_repair_keeps_edits() {
        let original = vec![edit((3, 0), "a", (3, 3), "b")];
        let (edits, report) = validate_with_repair(original.clone(), false);
        assert_eq!(edits, original);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_missing_start_is_not_repaired() {
        let (_, report) = validate_with_repair(vec![edit((0, 0), "a", (1, 1), "b")], true);
        assert_eq!(report.errors, vec!["edit 1 (src/main.rs): old start line is missing"]);
    }
}
