use std::{
    collections::{btree_map::Entry, BTreeMap},
    ops::RangeInclusive,
};

use libppc::{instruction::kind::BranchKind, Addr, Word};
use log::debug;

use crate::{
    persist::autosave::Autosave,
    record::{BranchKey, BranchRecord, InspectionFlags},
    snapshot::Snapshot,
};

#[cfg(test)]
mod tests;

pub type Observer = Box<dyn FnMut(u64) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// The record store. Reachable only through a [`crate::Core`], so holding one
/// mutably means holding the CPU.
pub struct BranchWatch {
    pub(crate) records: BTreeMap<BranchKey, BranchRecord>,
    pub(crate) baseline: Snapshot,
    generation: u64,
    recording: bool,
    /// Hits from here aren't recorded, e.g. a loader stub running before the program.
    ignored_origins: Option<RangeInclusive<Addr>>,

    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: u64,

    pub(crate) autosave: Autosave,
}

impl Default for BranchWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchWatch {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            baseline: Snapshot::empty(0),
            generation: 0,
            recording: false,
            ignored_origins: None,
            observers: Vec::new(),
            next_observer_id: 0,
            autosave: Autosave::default(),
        }
    }

    /// Called by the execution path once per retired branch.
    pub fn record_hit(
        &mut self,
        origin: Addr,
        destination: Addr,
        kind: BranchKind,
        raw_instruction: Word,
        taken: bool,
    ) {
        if !self.recording
            || self
                .ignored_origins
                .as_ref()
                .is_some_and(|ignored| ignored.contains(&origin))
        {
            return;
        }

        let key = BranchKey::new(origin, destination, kind);

        match self.records.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().hit(taken),
            Entry::Vacant(entry) => {
                entry.insert(BranchRecord::new(key, raw_instruction)).hit(taken);

                // Inserts come from the emulation thread, the autosave is flushed
                // at the end of the run slice rather than per branch.
                self.changed();
            }
        }
    }

    pub fn start_recording(&mut self) {
        self.recording = true;
    }

    pub fn pause_recording(&mut self) {
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Stops recording branches whose origin is in `origins`. Already recorded ones stay.
    pub fn set_ignored_origins(&mut self, origins: Option<RangeInclusive<Addr>>) {
        self.ignored_origins = origins;
    }

    pub fn ignored_origins(&self) -> Option<&RangeInclusive<Addr>> {
        self.ignored_origins.as_ref()
    }

    /// Removes the given keys, absent ones are ignored. Returns how many were removed.
    pub fn remove<'a, I>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a BranchKey>,
    {
        let removed = keys
            .into_iter()
            .filter(|key| self.records.remove(*key).is_some())
            .count();

        if removed != 0 {
            debug!("Removed {} branch records", removed);
            self.commit();
        }

        removed
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.baseline = Snapshot::empty(self.generation);

        debug!("Cleared branch watch");
        self.commit();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self.records.values(), self.generation)
    }

    /// Snapshot of the last narrowing checkpoint.
    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &BranchKey) -> Option<&BranchRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &BranchKey) -> bool {
        self.records.contains_key(key)
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &BranchRecord> {
        self.records.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BranchKey> {
        self.records.keys()
    }

    /// Keys of every record whose branch instruction sits at `origin`.
    pub fn keys_at(&self, origin: Addr) -> Vec<BranchKey> {
        self.records
            .range(BranchKey::new(origin, Addr::MIN, BranchKind::Unconditional)..)
            .take_while(|(key, _)| key.origin == origin)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn wipe_inspection(&mut self) {
        for record in self.records.values_mut() {
            record.inspection = InspectionFlags::empty();
        }

        self.commit();
    }

    pub fn subscribe(&mut self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;

        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let len = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);

        self.observers.len() != len
    }

    /// Applies `edit` to every record at `origin`, returning how many were touched.
    pub(crate) fn edit_origin<F>(&mut self, origin: Addr, mut edit: F) -> usize
    where
        F: FnMut(&mut BranchRecord),
    {
        let keys = self.keys_at(origin);

        for key in &keys {
            if let Some(record) = self.records.get_mut(key) {
                edit(record);
            }
        }

        keys.len()
    }

    /// Bumps the generation, notifies observers and queues an autosave.
    pub(crate) fn commit(&mut self) {
        self.changed();
        self.flush_autosave();
    }

    fn changed(&mut self) {
        self.generation += 1;
        self.autosave.mark_dirty();

        let generation = self.generation;
        for (_, observer) in &mut self.observers {
            observer(generation);
        }
    }
}
