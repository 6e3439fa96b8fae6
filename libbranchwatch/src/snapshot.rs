use std::{collections::HashMap, time::Instant};

use crate::record::{BranchKey, BranchRecord, HitFlags};

/// Immutable copy of the store's keys and hit flags at one point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    taken_at: Instant,
    generation: u64,
    flags: HashMap<BranchKey, HitFlags>,
}

impl Snapshot {
    pub(crate) fn capture<'a, I>(records: I, generation: u64) -> Self
    where
        I: IntoIterator<Item = &'a BranchRecord>,
    {
        Self {
            taken_at: Instant::now(),
            generation,
            flags: records
                .into_iter()
                .map(|record| (record.key, record.hit_flags))
                .collect(),
        }
    }

    pub(crate) fn empty(generation: u64) -> Self {
        Self::capture(std::iter::empty(), generation)
    }

    /// Flags of `key` at capture time, empty if the key didn't exist yet.
    pub fn flags(&self, key: &BranchKey) -> HitFlags {
        self.flags.get(key).copied().unwrap_or_default()
    }

    pub fn contains(&self, key: &BranchKey) -> bool {
        self.flags.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
