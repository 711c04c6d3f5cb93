//! Citation tracking
//!
//! Citations travel through several rewriting stages:
//!
//! ```text
//! research doc  [1] [2]        local labels, recorded per (step, label)
//!      │  globalize
//!      ▼
//! critique / synthesis input   [14] [15]   ledger global ids
//!      │  resolve
//!      ▼
//! writer output                [15] [14] [9?]
//!      │  renumber
//!      ▼
//! final body                   [1] [2] [9]  + reference list
//! ```

pub mod ledger;
pub mod markers;
pub mod renumber;

pub use ledger::{CitationLedger, LedgerSnapshot};
pub use markers::{canonical_label, marker_labels, scan_markers, MarkerMatch};
pub use renumber::{
    CitationKey, CitationResolutionWarning, MarkedText, MarkerOccurrence, Reference,
    ReferenceStatus, Renumbered,
};
