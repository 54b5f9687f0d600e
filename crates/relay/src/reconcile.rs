// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge rule applied whenever one side reports its full strategy set.

use crate::set::StrategySet;

/// Outcome of reconciling a tracked set against a reported one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The set to adopt. Always the reported set.
    pub merged: StrategySet,
    /// Whether the reported set differs from the tracked one.
    pub changed: bool,
}

/// Reconcile `tracked` with a newly `reported` snapshot.
///
/// Sizes that differ are always a change. Equal sizes are compared by
/// membership in both directions, so `reconcile(s, s.clone())` never
/// reports a change regardless of member order.
pub fn reconcile(tracked: &StrategySet, reported: StrategySet) -> Reconciled {
    if tracked.len() != reported.len() {
        return Reconciled { merged: reported, changed: true };
    }

    let removed = tracked.iter().any(|name| !reported.contains(name));
    let added = reported.iter().any(|name| !tracked.contains(name));

    Reconciled { merged: reported, changed: removed || added }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
