// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Field reconciliation engine.
//!
//! Pure comparison of authoritative values against remote state. No I/O,
//! deterministic for identical input: the returned diff list follows the
//! order of the `authoritative` slice so that diff logs are reproducible.

use std::collections::{HashMap, HashSet};

use crate::model::{FieldDecision, FieldDiff, FieldValue};

/// Compute the update set for one stage.
///
/// For each `(field_id, value)` pair in `authoritative` (in order):
/// - an absent remote value is treated as [`FieldValue::Empty`], never as an
///   error;
/// - equality uses the type-aware comparator table on [`FieldValue`];
/// - equal values are [`FieldDecision::Unchanged`];
/// - differing values are [`FieldDecision::ToUpdate`], unless the field id
///   is in `protected` *and* the remote value is non-empty, in which case
///   the decision is [`FieldDecision::Conflict`] and no write decision is
///   made automatically.
///
/// `applied_value` is left unset here; the stage executor fills it in when
/// (or as if, in dry-run mode) a write is issued.
pub fn reconcile(
    authoritative: &[(String, FieldValue)],
    current: &HashMap<String, FieldValue>,
    protected: &HashSet<String>,
) -> Vec<FieldDiff> {
    authoritative
        .iter()
        .map(|(field_id, value)| {
            let remote = current.get(field_id).cloned().unwrap_or(FieldValue::Empty);

            let decision = if value.loosely_equals(&remote) {
                FieldDecision::Unchanged
            } else if !remote.is_empty() && protected.contains(field_id) {
                // Protected mismatch: filling in an empty protected field is
                // still allowed, overwriting an existing value is not.
                FieldDecision::Conflict
            } else {
                FieldDecision::ToUpdate
            };

            FieldDiff {
                field_id: field_id.clone(),
                authoritative: value.clone(),
                remote,
                decision,
                applied_value: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn auth(pairs: &[(&str, FieldValue)]) -> Vec<(String, FieldValue)> {
        pairs
            .iter()
            .map(|(id, v)| ((*id).to_string(), v.clone()))
            .collect()
    }

    fn current(pairs: &[(&str, FieldValue)]) -> HashMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(id, v)| ((*id).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_reconcile_update_and_fill_in() {
        // A present-but-different, B absent remotely.
        let authoritative = auth(&[("A", text("100")), ("B", text("x"))]);
        let remote = current(&[("A", text("90"))]);

        let diffs = reconcile(&authoritative, &remote, &HashSet::new());

        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].field_id, "A");
        assert_eq!(diffs[0].decision, FieldDecision::ToUpdate);
        assert_eq!(diffs[0].remote, text("90"));
        assert_eq!(diffs[1].field_id, "B");
        assert_eq!(diffs[1].decision, FieldDecision::ToUpdate);
        assert_eq!(diffs[1].remote, FieldValue::Empty);
    }

    #[test]
    fn test_reconcile_numeric_tolerance_unchanged() {
        let authoritative = auth(&[("LTV", text("80.001"))]);
        let remote = current(&[("LTV", text("80.0"))]);

        let diffs = reconcile(&authoritative, &remote, &HashSet::new());

        assert_eq!(diffs[0].decision, FieldDecision::Unchanged);
    }

    #[test]
    fn test_reconcile_protected_conflict() {
        let authoritative = auth(&[("SSN", text("111-22-3333"))]);
        let remote = current(&[("SSN", text("999-88-7777"))]);
        let protected: HashSet<String> = ["SSN".to_string()].into_iter().collect();

        let diffs = reconcile(&authoritative, &remote, &protected);

        assert_eq!(diffs[0].decision, FieldDecision::Conflict);
        assert!(diffs[0].applied_value.is_none());
    }

    #[test]
    fn test_reconcile_protected_fill_in_allowed() {
        // An empty remote value is a fill-in even for protected fields.
        let authoritative = auth(&[("SSN", text("111-22-3333"))]);
        let protected: HashSet<String> = ["SSN".to_string()].into_iter().collect();

        let diffs = reconcile(&authoritative, &HashMap::new(), &protected);

        assert_eq!(diffs[0].decision, FieldDecision::ToUpdate);
    }

    #[test]
    fn test_reconcile_deterministic_and_ordered() {
        let authoritative = auth(&[
            ("c", text("3")),
            ("a", text("1")),
            ("b", FieldValue::Number(2.0)),
        ]);
        let remote = current(&[("a", text("1")), ("b", FieldValue::Number(9.0))]);

        let first = reconcile(&authoritative, &remote, &HashSet::new());
        let second = reconcile(&authoritative, &remote, &HashSet::new());

        assert_eq!(first, second);
        let order: Vec<&str> = first.iter().map(|d| d.field_id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_reconcile_case_insensitive_text_unchanged() {
        let authoritative = auth(&[("name", text("John Smith"))]);
        let remote = current(&[("name", text("  JOHN SMITH "))]);

        let diffs = reconcile(&authoritative, &remote, &HashSet::new());

        assert_eq!(diffs[0].decision, FieldDecision::Unchanged);
    }

    #[test]
    fn test_reconcile_empty_authoritative() {
        let diffs = reconcile(&[], &HashMap::new(), &HashSet::new());
        assert!(diffs.is_empty());
    }
}
