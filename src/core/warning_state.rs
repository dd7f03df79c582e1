//! Position-indexed suppression state for one source unit
//!
//! Suppression ranges arrive as an unordered multiset of boundary markers
//! (`position`, `id`, start/end). [`WarningStateMap::from_boundaries`] folds
//! them into a sorted list of entries, each describing the options in effect
//! from its position until the next entry. Lookups are a binary search.

use super::types::{ReportDiagnostic, TextSpan};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Which side of a suppression range a boundary marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BoundaryKind {
    Start,
    End,
}

/// One edge of a suppression range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionBoundary {
    pub position: usize,
    pub id: String,
    pub kind: BoundaryKind,
}

impl SuppressionBoundary {
    /// The start and end markers suppressing `id` over `span`
    pub fn range(id: &str, span: TextSpan) -> [SuppressionBoundary; 2] {
        [
            SuppressionBoundary {
                position: span.start,
                id: id.to_string(),
                kind: BoundaryKind::Start,
            },
            SuppressionBoundary {
                position: span.end,
                id: id.to_string(),
                kind: BoundaryKind::End,
            },
        ]
    }
}

/// Options in effect from `position` onward
#[derive(Debug, Clone, PartialEq)]
pub struct WarningStateMapEntry {
    pub position: usize,
    pub general_option: ReportDiagnostic,
    pub specific_options: Arc<HashMap<String, ReportDiagnostic>>,
}

impl WarningStateMapEntry {
    fn initial() -> Self {
        Self {
            position: 0,
            general_option: ReportDiagnostic::Default,
            specific_options: Arc::new(HashMap::new()),
        }
    }
}

/// Sorted, de-duplicated suppression state of one source unit
#[derive(Debug, Clone, PartialEq)]
pub struct WarningStateMap {
    entries: Vec<WarningStateMapEntry>,
}

impl WarningStateMap {
    /// Coalesce boundary markers into entries
    ///
    /// Overlapping ranges for the same id nest: the id stays suppressed until
    /// every range that covers a position has ended.
    pub fn from_boundaries(boundaries: impl IntoIterator<Item = SuppressionBoundary>) -> Self {
        let mut boundaries: Vec<_> = boundaries.into_iter().collect();
        boundaries.sort_by_key(|b| b.position);

        let mut entries = vec![WarningStateMapEntry::initial()];
        let mut depth: HashMap<String, i64> = HashMap::new();

        let mut index = 0;
        while index < boundaries.len() {
            let position = boundaries[index].position;
            while index < boundaries.len() && boundaries[index].position == position {
                let boundary = &boundaries[index];
                let count = depth.entry(boundary.id.clone()).or_insert(0);
                match boundary.kind {
                    BoundaryKind::Start => *count += 1,
                    BoundaryKind::End => *count -= 1,
                }
                index += 1;
            }

            let specific: HashMap<String, ReportDiagnostic> = depth
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(id, _)| (id.clone(), ReportDiagnostic::Suppress))
                .collect();

            let last = entries.len() - 1;
            if *entries[last].specific_options == specific {
                continue;
            }
            if entries[last].position == position {
                entries[last].specific_options = Arc::new(specific);
                // Replacing may have made the entry redundant with its predecessor
                if last > 0 && entries[last - 1].specific_options == entries[last].specific_options
                {
                    entries.pop();
                }
            } else {
                entries.push(WarningStateMapEntry {
                    position,
                    general_option: ReportDiagnostic::Default,
                    specific_options: Arc::new(specific),
                });
            }
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[WarningStateMapEntry] {
        &self.entries
    }

    /// The entry in effect at `position`
    pub fn entry_at(&self, position: usize) -> &WarningStateMapEntry {
        let index = self.entries.partition_point(|e| e.position <= position);
        // The first entry starts at position 0, so index is at least 1
        &self.entries[index.saturating_sub(1)]
    }

    /// Option configured for `id` at `position`
    pub fn option_at(&self, id: &str, position: usize) -> ReportDiagnostic {
        let entry = self.entry_at(position);
        entry
            .specific_options
            .get(id)
            .copied()
            .unwrap_or(entry.general_option)
    }

    pub fn is_suppressed(&self, id: &str, position: usize) -> bool {
        self.option_at(id, position) == ReportDiagnostic::Suppress
    }
}

/// Boundary markers that are coalesced into a map exactly once
///
/// Markers can be added until the map is first requested; after that the
/// published map is final and later markers are ignored.
#[derive(Debug, Default)]
pub struct LazyWarningStateMap {
    pending: Mutex<PendingBoundaries>,
    map: OnceLock<Arc<WarningStateMap>>,
}

#[derive(Debug, Default)]
struct PendingBoundaries {
    boundaries: Vec<SuppressionBoundary>,
    published: bool,
}

impl LazyWarningStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the markers for a suppressed range
    ///
    /// Returns `false` if the map was already published.
    pub fn add_range(&self, id: &str, span: TextSpan) -> bool {
        let mut pending = self.pending.lock();
        if pending.published {
            return false;
        }
        pending.boundaries.extend(SuppressionBoundary::range(id, span));
        true
    }

    pub fn is_published(&self) -> bool {
        self.pending.lock().published
    }

    /// Coalesce on first call, running `populate` beforehand
    pub fn get_or_build<F: FnOnce()>(&self, populate: F) -> Arc<WarningStateMap> {
        self.map
            .get_or_init(|| {
                populate();
                let boundaries = {
                    let mut pending = self.pending.lock();
                    pending.published = true;
                    std::mem::take(&mut pending.boundaries)
                };
                Arc::new(WarningStateMap::from_boundaries(boundaries))
            })
            .clone()
    }
}
