/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end protection counters.
//!
//! Every signal named as an E2E counter in the broker metadata gets one entry,
//! seeded at `0`.  Each time a frame carrying that signal is published the
//! counter is incremented; after [`E2E_COUNTER_MAX`] it wraps to `0`, so the
//! published sequence is `1, 2, …, 14, 0, 1, …`.

use std::collections::HashMap;

/// Highest value an E2E counter takes before wrapping to `0`.
pub const E2E_COUNTER_MAX: u8 = 14;

/// Counter ledger keyed by signal name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct E2eCounters {
    counters: HashMap<String, u8>,
}

impl E2eCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a ledger with every name at `0`.  Duplicate names collapse into
    /// one shared counter.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            counters: names.into_iter().map(|n| (n.into(), 0)).collect(),
        }
    }

    /// Register `name` at `0` if it is not already tracked.
    pub fn register(&mut self, name: impl Into<String>) {
        self.counters.entry(name.into()).or_insert(0);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counters.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<u8> {
        self.counters.get(name).copied()
    }

    /// Increment the counter for `name`, wrapping after [`E2E_COUNTER_MAX`].
    ///
    /// Returns the new value, or `None` if `name` is not an E2E counter.
    pub fn advance(&mut self, name: &str) -> Option<u8> {
        let counter = self.counters.get_mut(name)?;
        *counter = if *counter >= E2E_COUNTER_MAX {
            0
        } else {
            *counter + 1
        };
        Some(*counter)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Counter names in sorted order (for deterministic logging).
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.counters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_counters_start_at_zero() {
        let c = E2eCounters::from_names(["a", "b"]);
        assert_eq!(c.get("a"), Some(0));
        assert_eq!(c.get("b"), Some(0));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn unknown_name_is_not_advanced() {
        let mut c = E2eCounters::from_names(["a"]);
        assert_eq!(c.advance("zzz"), None);
        assert!(!c.contains("zzz"));
    }

    #[test]
    fn counter_wraps_after_fourteen() {
        let mut c = E2eCounters::from_names(["cnt"]);
        let seq: Vec<u8> = (0..16).map(|_| c.advance("cnt").unwrap()).collect();
        assert_eq!(
            seq,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 0, 1]
        );
    }

    #[test]
    fn counter_never_leaves_range() {
        let mut c = E2eCounters::from_names(["cnt"]);
        for _ in 0..1000 {
            let v = c.advance("cnt").unwrap();
            assert!(v <= E2E_COUNTER_MAX);
        }
    }

    #[test]
    fn register_keeps_existing_value() {
        let mut c = E2eCounters::new();
        c.register("cnt");
        c.advance("cnt");
        c.register("cnt");
        assert_eq!(c.get("cnt"), Some(1));
    }

    #[test]
    fn names_are_sorted() {
        let c = E2eCounters::from_names(["b", "a", "c", "a"]);
        assert_eq!(c.names(), vec!["a", "b", "c"]);
    }
}
