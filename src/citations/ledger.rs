//! Citation Ledger
//!
//! Run-scoped registry mapping every raw marker seen anywhere in the
//! pipeline to exactly one [`CitationEntry`]. Identity is
//! `(origin step, canonical label)`: `[1]` from step 2 and `[1]` from
//! step 5 are different sources and get different global ids.
//!
//! Global ids start at 1, are assigned in first-seen order and are never
//! reused or renumbered for the life of the ledger. Display numbering for
//! the final report is a separate, pure pass (see [`super::renumber`]).

use super::markers::{canonical_label, scan_markers, splice};
use super::renumber::{CitationKey, MarkedText, MarkerOccurrence};
use crate::models::{CitationEntry, SourceRef};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<CitationEntry>,
    by_origin: HashMap<(u32, String), u32>,
}

impl LedgerState {
    fn record(&mut self, label: String, origin: u32, source: Option<SourceRef>) -> u32 {
        if let Some(&id) = self.by_origin.get(&(origin, label.clone())) {
            // a later sighting may know the source an earlier one did not
            if let (Some(source), Some(entry)) = (source, self.entries.get_mut(id as usize - 1)) {
                entry.source.get_or_insert(source);
            }
            return id;
        }

        let id = self.entries.len() as u32 + 1;
        self.entries.push(CitationEntry {
            global_id: id,
            canonical_label: label.clone(),
            origin_step_index: origin,
            first_seen_order: id,
            source,
        });
        self.by_origin.insert((origin, label), id);
        debug!(global_id = id, origin, "Recorded citation");
        id
    }
}

/// Serializable copy of the ledger, stored next to the report for audit
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub entries: Vec<CitationEntry>,
}

/// One writer at a time, any number of concurrent readers.
#[derive(Debug, Default)]
pub struct CitationLedger {
    state: RwLock<LedgerState>,
}

impl CitationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the global id for `(raw_marker, origin)`, creating it on
    /// first sight. Idempotent.
    pub fn record(&self, raw_marker: &str, origin: u32) -> u32 {
        self.state.write().record(canonical_label(raw_marker), origin, None)
    }

    /// Like [`record`](Self::record), attaching the source the label
    /// points at when it is known.
    pub fn record_with_source(&self, raw_marker: &str, origin: u32, source: Option<SourceRef>) -> u32 {
        self.state.write().record(canonical_label(raw_marker), origin, source)
    }

    pub fn lookup(&self, raw_marker: &str, origin: u32) -> Option<u32> {
        self.state
            .read()
            .by_origin
            .get(&(origin, canonical_label(raw_marker)))
            .copied()
    }

    pub fn entry(&self, global_id: u32) -> Option<CitationEntry> {
        let state = self.state.read();
        global_id
            .checked_sub(1)
            .and_then(|i| state.entries.get(i as usize))
            .cloned()
    }

    pub fn entries(&self) -> Vec<CitationEntry> {
        self.state.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record every marker of a document produced by step `origin` and
    /// rewrite the text so each label becomes its global id.
    ///
    /// Label `n` is linked to `sources[n - 1]` when present. The whole
    /// text is processed under a single write lock so a concurrent reader
    /// never observes half of a document's markers.
    pub fn globalize(&self, text: &str, origin: u32, sources: &[SourceRef]) -> String {
        let markers = scan_markers(text);
        if markers.is_empty() {
            return text.to_string();
        }

        let mut state = self.state.write();
        let replacements: Vec<_> = markers
            .into_iter()
            .map(|m| {
                let source = m
                    .label
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| sources.get(i))
                    .cloned();
                let id = state.record(m.label, origin, source);
                (m.span, id.to_string())
            })
            .collect();
        drop(state);

        splice(text, &replacements).0
    }

    /// Classify the markers of stage output whose labels are meant to be
    /// global ids. Labels with no ledger entry are kept as unresolved.
    pub fn resolve(&self, text: &str) -> MarkedText {
        let state = self.state.read();
        let occurrences = scan_markers(text)
            .into_iter()
            .map(|m| {
                let known = m
                    .label
                    .parse::<u32>()
                    .ok()
                    .filter(|id| *id >= 1 && (*id as usize) <= state.entries.len());
                let key = match known {
                    Some(id) => CitationKey::Resolved(id),
                    None => CitationKey::Unresolved(m.label),
                };
                MarkerOccurrence { span: m.span, key }
            })
            .collect();

        MarkedText {
            text: text.to_string(),
            occurrences,
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            entries: self.entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn source(n: u32) -> SourceRef {
        SourceRef {
            title: format!("Source {}", n),
            url: format!("https://example.org/{}", n),
        }
    }

    #[test]
    fn test_record_is_idempotent_per_origin() {
        let ledger = CitationLedger::new();
        let a = ledger.record("[1]", 1);
        let b = ledger.record("1", 1);
        let c = ledger.record("[01]", 1);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_same_label_different_origin_is_new_entry() {
        let ledger = CitationLedger::new();
        let first = ledger.record("[1]", 1);
        let second = ledger.record("[1]", 2);
        assert_ne!(first, second);
        assert_eq!(ledger.entry(second).unwrap().origin_step_index, 2);
        assert_eq!(ledger.entry(second).unwrap().first_seen_order, 2);
    }

    #[test]
    fn test_ids_are_stable_and_sequential() {
        let ledger = CitationLedger::new();
        assert_eq!(ledger.record("[3]", 1), 1);
        assert_eq!(ledger.record("[1]", 1), 2);
        assert_eq!(ledger.record("[3]", 1), 1);
        assert_eq!(ledger.lookup("[1]", 1), Some(2));
        assert_eq!(ledger.lookup("[1]", 4), None);
    }

    #[test]
    fn test_late_source_fills_missing_source() {
        let ledger = CitationLedger::new();
        let id = ledger.record("[2]", 1);
        ledger.record_with_source("[2]", 1, Some(source(2)));
        ledger.record_with_source("[2]", 1, Some(source(9)));
        assert_eq!(ledger.entry(id).unwrap().source, Some(source(2)));
    }

    #[test]
    fn test_globalize_rewrites_local_labels() {
        let ledger = CitationLedger::new();
        ledger.record("[1]", 7);

        let text = "Wind is cheap [1], storage is not [2, 1].";
        let global = ledger.globalize(text, 2, &[source(1), source(2)]);

        assert_eq!(global, "Wind is cheap [2], storage is not [3, 2].");
        assert_eq!(ledger.entry(2).unwrap().source, Some(source(1)));
        assert_eq!(ledger.entry(3).unwrap().canonical_label, "2");
        // rerunning on the original text is stable
        assert_eq!(ledger.globalize(text, 2, &[]), global);
    }

    #[test]
    fn test_resolve_flags_unknown_ids() {
        let ledger = CitationLedger::new();
        ledger.record("[1]", 1);

        let marked = ledger.resolve("Known [1], invented [9].");
        let keys: Vec<_> = marked.occurrences.iter().map(|o| o.key.clone()).collect();
        assert_eq!(keys, vec![CitationKey::Resolved(1), CitationKey::Unresolved("9".into())]);
    }

    #[test]
    fn test_concurrent_record_yields_one_entry_per_pair() {
        let ledger = Arc::new(CitationLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for label in 1..=20 {
                        ledger.record(&format!("[{}]", label), t % 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 40);
        let mut ids: Vec<u32> = ledger.entries().iter().map(|e| e.global_id).collect();
        ids.dedup();
        assert_eq!(ids, (1..=40).collect::<Vec<_>>());
    }
}
