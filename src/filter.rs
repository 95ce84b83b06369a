//! Reduction of raw detections to the categories of interest in a frame.

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

use crate::detect::Detection;
use crate::labels;

/// Fixed set of class ids whose presence drives the signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategorySet {
    ids: BTreeSet<u32>,
}

impl CategorySet {
    pub fn new<I: IntoIterator<Item = u32>>(ids: I) -> Result<Self> {
        let ids: BTreeSet<u32> = ids.into_iter().collect();
        if ids.is_empty() {
            return Err(anyhow!("at least one category of interest is required"));
        }
        Ok(Self { ids })
    }

    /// Resolve entries given as label names or numeric ids.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let ids = entries
            .iter()
            .map(|entry| {
                labels::resolve_category(entry.as_ref())
                    .ok_or_else(|| anyhow!("unknown category '{}'", entry.as_ref()))
            })
            .collect::<Result<Vec<u32>>>()?;
        Self::new(ids)
    }

    pub fn contains(&self, class_id: u32) -> bool {
        self.ids.contains(&class_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }

    /// Human-readable names for logs.
    pub fn names(&self) -> Vec<String> {
        self.ids.iter().map(|&id| labels::display_label(id)).collect()
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            ids: labels::DEFAULT_CATEGORIES.into_iter().collect(),
        }
    }
}

/// Class ids of interest present in one frame.
///
/// A detection counts when `confidence >= threshold` and its class is in
/// `categories`. Duplicates collapse; the result does not depend on order.
pub fn filter(detections: &[Detection], categories: &CategorySet, threshold: f32) -> BTreeSet<u32> {
    detections
        .iter()
        .filter(|d| d.confidence >= threshold)
        .filter(|d| categories.contains(d.class_id))
        .map(|d| d.class_id)
        .collect()
}
