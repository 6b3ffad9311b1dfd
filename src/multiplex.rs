//! Grouping several jobs into combined scalar/plural jobs and splitting the
//! combined result back out.
//!
//! Keys are renamed only when they collide with a key already taken by an
//! earlier job (`title`, `title_2`, `title_3`, ...). The per-job
//! [`KeyMapping`] is the only way back, so it has to travel with the combined
//! job until the result returns.

use crate::job::{Job, Shape, Translations};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Original key to combined key, for one source job.
pub type KeyMapping = BTreeMap<String, String>;

/// A combined job holding keys of a single shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedJob {
    pub job: Job,
    pub shape: Shape,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouped {
    /// Scalar job first, then plural; empty buckets are left out.
    pub combined: Vec<CombinedJob>,
    /// One mapping per source job, in input order.
    pub mappings: Vec<KeyMapping>,
    /// Pending keys left out of every combined job, per source job.
    pub skipped: Vec<Vec<String>>,
}

/// Merge `jobs` into at most two combined jobs, one per shape.
///
/// Only keys with an absent slot and a consistent source shape are taken.
/// Pending keys without one end up in [`Grouped::skipped`].
pub fn group(jobs: &[Job]) -> Grouped {
    let mut used: HashSet<String> = HashSet::new();
    let mut scalar = Job::new();
    let mut plural = Job::new();
    let mut mappings = Vec::with_capacity(jobs.len());
    let mut skipped = Vec::with_capacity(jobs.len());

    for job in jobs {
        let mut mapping = KeyMapping::new();
        let mut left_out = Vec::new();
        for (key, record) in job.iter() {
            if !record.is_pending() {
                continue;
            }
            let Some(shape) = record.source_shape() else {
                warn!("Key '{}' has no consistent source text, skipping", key);
                left_out.push(key.to_string());
                continue;
            };

            let combined_key = unique_key(key, &used);
            used.insert(combined_key.clone());
            mapping.insert(key.to_string(), combined_key.clone());

            let bucket = match shape {
                Shape::Scalar => &mut scalar,
                Shape::Plural => &mut plural,
            };
            bucket.insert(combined_key, record.clone());
        }
        mappings.push(mapping);
        skipped.push(left_out);
    }

    let combined = [(scalar, Shape::Scalar), (plural, Shape::Plural)]
        .into_iter()
        .filter(|(job, _)| !job.is_empty())
        .map(|(job, shape)| CombinedJob { job, shape })
        .collect();

    Grouped {
        combined,
        mappings,
        skipped,
    }
}

fn unique_key(key: &str, used: &HashSet<String>) -> String {
    if !used.contains(key) {
        return key.to_string();
    }
    (2..)
        .map(|suffix| format!("{}_{}", key, suffix))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| key.to_string())
}

/// Split a combined result into one result per source job.
///
/// Keys whose combined key is absent from `combined` produce no entry.
pub fn ungroup(combined: &Translations, mappings: &[KeyMapping]) -> Vec<Translations> {
    mappings
        .iter()
        .map(|mapping| {
            let mut translations = Translations::new();
            for (original, combined_key) in mapping {
                let Some(languages) = combined.get(combined_key) else {
                    continue;
                };
                for (language, text) in languages {
                    translations.insert(original.clone(), language.clone(), text.clone());
                }
            }
            translations
        })
        .collect()
}
