//! Folding achievement reports into the progress the client already has.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use mikmak_protocol::{AchievementEntry, AchievementKey};

/// Merges an incoming achievement report into `existing`.
///
/// A snapshot (`!is_update`) or a report with nothing to merge into
/// replaces the list. An update patches entries by key: known keys keep
/// their position and take the new progress and points, unknown keys are
/// appended in the order they arrived. Duplicate keys collapse onto the
/// first position, with the last value winning.
pub fn merge(
    existing: &[AchievementEntry],
    incoming: &[AchievementEntry],
    is_update: bool,
) -> Vec<AchievementEntry> {
    if !is_update || existing.is_empty() {
        return incoming.to_vec();
    }

    let mut merged: Vec<AchievementEntry> = Vec::with_capacity(existing.len() + incoming.len());
    let mut position: HashMap<AchievementKey, usize> = HashMap::new();

    for entry in existing.iter().chain(incoming) {
        match position.entry(entry.key()) {
            Entry::Occupied(slot) => merged[*slot.get()] = *entry,
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(*entry);
            }
        }
    }

    merged
}
