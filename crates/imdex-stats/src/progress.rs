//! Completion progress over collection snapshots
//!
//! Pure read-side aggregation: every function takes a store snapshot and
//! a catalog slice and returns counts. Nothing here mutates the store,
//! and the same inputs always produce the same figures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use imdex_core::model::{CatchFlags, EntryId, FlagField};

/// One completion figure: obtained out of total, with a rounded percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Entries (or forms) with the counted flag set
    pub obtained: usize,
    /// Entries (or forms) that count toward completion
    pub total: usize,
    /// `round(obtained / total * 100)`, 0 when total is 0
    pub percentage: u32,
}

impl Progress {
    /// Build a progress figure from raw counts.
    pub fn from_counts(obtained: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((obtained as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            obtained,
            total,
            percentage,
        }
    }
}

/// Catalog metadata for one entry: which conditional variants exist.
///
/// The catalog itself lives outside the tracker; hosts hand a slice of
/// these to the progress functions to scope the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DexEntry {
    /// Catalog number, matching the store's entry ids
    pub number: EntryId,
    /// Entry can appear as an alpha (and alpha shiny)
    pub alpha_capable: bool,
    /// Entry has a mega form
    pub mega_capable: bool,
}

impl DexEntry {
    pub fn new(number: EntryId, alpha_capable: bool, mega_capable: bool) -> Self {
        Self {
            number,
            alpha_capable,
            mega_capable,
        }
    }
}

fn flag(snapshot: &BTreeMap<EntryId, CatchFlags>, number: EntryId, field: FlagField) -> bool {
    snapshot.get(&number).map(|f| f.get(field)).unwrap_or(false)
}

/// Progress of a single flag over the given entries.
///
/// Entries absent from the snapshot count as not obtained, matching the
/// store's absence-is-all-false convention.
pub fn field_progress<'a, I>(
    snapshot: &BTreeMap<EntryId, CatchFlags>,
    entries: I,
    field: FlagField,
) -> Progress
where
    I: IntoIterator<Item = &'a DexEntry>,
{
    let mut obtained = 0;
    let mut total = 0;
    for entry in entries {
        total += 1;
        if flag(snapshot, entry.number, field) {
            obtained += 1;
        }
    }
    Progress::from_counts(obtained, total)
}

/// Alpha dex progress: the alpha flag over alpha-capable entries only.
pub fn alpha_dex_progress(
    snapshot: &BTreeMap<EntryId, CatchFlags>,
    entries: &[DexEntry],
) -> Progress {
    field_progress(
        snapshot,
        entries.iter().filter(|e| e.alpha_capable),
        FlagField::Alpha,
    )
}

/// Overall progress counted in obtainable forms.
///
/// Every entry contributes two base forms (normal, shiny); alpha-capable
/// entries contribute two more (alpha, alpha shiny).
pub fn overall_progress(
    snapshot: &BTreeMap<EntryId, CatchFlags>,
    entries: &[DexEntry],
) -> Progress {
    let mut obtained = 0;
    let mut total = 0;
    for entry in entries {
        let flags = snapshot.get(&entry.number).copied().unwrap_or_default();
        total += 2;
        obtained += usize::from(flags.normal) + usize::from(flags.shiny);
        if entry.alpha_capable {
            total += 2;
            obtained += usize::from(flags.alpha) + usize::from(flags.alpha_shiny);
        }
    }
    Progress::from_counts(obtained, total)
}
