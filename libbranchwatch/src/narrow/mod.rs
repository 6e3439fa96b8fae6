use log::info;

use crate::{
    memory::InstructionMemory,
    record::{BranchRecord, HitFlags},
    snapshot::Snapshot,
    store::BranchWatch,
};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Narrowed {
    pub kept: usize,
    pub removed: usize,
}

impl BranchWatch {
    /// Keeps the branches that went taken since the last checkpoint.
    pub fn isolate_was_taken(&mut self) -> Narrowed {
        let narrowed =
            self.narrow_by(|before, after| newly_set(before, after, HitFlags::TAKEN_RECENT));
        info!("Code path was taken: {:?}", narrowed);
        narrowed
    }

    /// Keeps the branches that fell through since the last checkpoint.
    pub fn isolate_not_taken(&mut self) -> Narrowed {
        let narrowed =
            self.narrow_by(|before, after| newly_set(before, after, HitFlags::NOT_TAKEN_RECENT));
        info!("Code path not taken: {:?}", narrowed);
        narrowed
    }

    /// Keeps the branches whose origin no longer holds the expected instruction.
    pub fn isolate_was_overwritten<M>(&mut self, memory: &M) -> Narrowed
    where
        M: InstructionMemory + ?Sized,
    {
        let narrowed = self.narrow_records(|record, _| {
            memory.read_instruction(record.key.origin) != Some(record.original_instruction)
        });
        info!("Branch was overwritten: {:?}", narrowed);
        narrowed
    }

    /// Keeps the branches whose origin still holds the expected instruction.
    pub fn isolate_not_overwritten<M>(&mut self, memory: &M) -> Narrowed
    where
        M: InstructionMemory + ?Sized,
    {
        let narrowed = self.narrow_records(|record, _| {
            memory.read_instruction(record.key.origin) == Some(record.original_instruction)
        });
        info!("Branch not overwritten: {:?}", narrowed);
        narrowed
    }

    /// Starts a new window without removing anything.
    pub fn wipe_recent_hits(&mut self) {
        self.narrow_records(|_, _| true);
    }

    /// Removes every record for which `keep(before, after)` is false, where `before`
    /// are the flags at the last checkpoint and `after` the live ones.
    pub fn narrow_by<F>(&mut self, mut keep: F) -> Narrowed
    where
        F: FnMut(HitFlags, HitFlags) -> bool,
    {
        self.narrow_records(|record, baseline| {
            keep(baseline.flags(&record.key), record.hit_flags)
        })
    }

    fn narrow_records<F>(&mut self, mut keep: F) -> Narrowed
    where
        F: FnMut(&BranchRecord, &Snapshot) -> bool,
    {
        let before = &self.baseline;
        let len = self.records.len();

        self.records.retain(|_, record| keep(record, before));

        // Survivors start the next window clean.
        for record in self.records.values_mut() {
            record.checkpoint();
        }

        self.commit();
        self.baseline = self.snapshot();

        Narrowed {
            kept: self.records.len(),
            removed: len - self.records.len(),
        }
    }
}

fn newly_set(before: HitFlags, after: HitFlags, flag: HitFlags) -> bool {
    after.contains(flag) && !before.contains(flag)
}
