use std::collections::BTreeSet;

use libppc::{
    instruction::{condition::ConditionSpec, BranchInstruction},
    Addr, Word,
};
use log::{debug, warn};

use crate::{
    cpu::breakpoints::BreakAction,
    memory::InstructionMemory,
    record::{BranchKey, InspectionFlags},
    Core,
};


impl Core {
    pub fn delete_records(&mut self, keys: &[BranchKey]) -> usize {
        self.branch_watch.remove(keys)
    }

    /// Replaces the branch at each origin with a NOP.
    pub fn set_nop_patches(&mut self, keys: &[BranchKey]) -> usize {
        self.set_stub_patches(keys, libppc::NOP, InspectionFlags::SET_ORIGIN_NOP)
    }

    /// Replaces the branch at each origin with a BLR.
    pub fn set_blr_patches(&mut self, keys: &[BranchKey]) -> usize {
        self.set_stub_patches(keys, libppc::BLR, InspectionFlags::SET_ORIGIN_BLR)
    }

    pub fn invert_condition(&mut self, keys: &[BranchKey]) -> usize {
        self.set_edit_patches(
            keys,
            |condition| condition.checks_condition(),
            ConditionSpec::inverted,
            InspectionFlags::INVERTED_CONDITION,
        )
    }

    pub fn invert_decrement_check(&mut self, keys: &[BranchKey]) -> usize {
        self.set_edit_patches(
            keys,
            |condition| condition.decrements_ctr(),
            ConditionSpec::decrement_check_inverted,
            InspectionFlags::INVERTED_DECREMENT_CHECK,
        )
    }

    pub fn make_unconditional(&mut self, keys: &[BranchKey]) -> usize {
        self.set_edit_patches(
            keys,
            |condition| !condition.is_always(),
            ConditionSpec::unconditional,
            InspectionFlags::MADE_UNCONDITIONAL,
        )
    }

    pub fn set_breakpoints(&mut self, keys: &[BranchKey], action: BreakAction) -> usize {
        let mut count = 0;

        for origin in self.present_origins(keys) {
            if !self.breakpoints.set(origin, action) {
                continue;
            }

            count += self.branch_watch.edit_origin(origin, |record| {
                record.inspection.insert(InspectionFlags::BREAKPOINT_SET)
            });
        }

        self.finish_row_action("set breakpoints", count)
    }

    pub fn clear_breakpoints(&mut self, keys: &[BranchKey]) -> usize {
        let mut count = 0;

        for origin in self.present_origins(keys) {
            self.breakpoints.clear(origin);

            count += self.branch_watch.edit_origin(origin, |record| {
                record.inspection.remove(InspectionFlags::BREAKPOINT_SET)
            });
        }

        self.finish_row_action("clear breakpoints", count)
    }

    fn set_stub_patches(
        &mut self,
        keys: &[BranchKey],
        stub: Word,
        flag: InspectionFlags,
    ) -> usize {
        let mut count = 0;

        for origin in self.present_origins(keys) {
            if !self.memory.write_instruction(origin, stub) {
                warn!("Couldn't patch {:#010x}", origin);
                continue;
            }

            count += self.rebaseline(origin, stub, flag);
        }

        self.finish_row_action("stub patch", count)
    }

    fn set_edit_patches<A, T>(
        &mut self,
        keys: &[BranchKey],
        applies: A,
        transform: T,
        flag: InspectionFlags,
    ) -> usize
    where
        A: Fn(&ConditionSpec) -> bool,
        T: Fn(ConditionSpec) -> ConditionSpec,
    {
        let mut count = 0;

        for origin in self.present_origins(keys) {
            // Edit what's in memory now, which may already differ from the recorded word.
            let instruction = self
                .memory
                .read_instruction(origin)
                .and_then(|word| BranchInstruction::decode(word).ok())
                .filter(|instruction| {
                    instruction.has_condition_field() && applies(&instruction.condition)
                });

            let Some(instruction) = instruction else {
                warn!("No editable branch condition at {:#010x}", origin);
                continue;
            };

            let edited = instruction
                .with_condition(transform(instruction.condition))
                .encode();

            if !self.memory.write_instruction(origin, edited) {
                warn!("Couldn't patch {:#010x}", origin);
                continue;
            }

            count += self.rebaseline(origin, edited, flag);
        }

        self.finish_row_action("condition edit", count)
    }

    /// Makes `word` the expected instruction of every record at `origin`, so the
    /// operator's own patch isn't reported as an overwrite.
    fn rebaseline(&mut self, origin: Addr, word: Word, flag: InspectionFlags) -> usize {
        let condition = BranchInstruction::decode(word)
            .ok()
            .and_then(|instruction| instruction.condition_spec());

        self.branch_watch.edit_origin(origin, |record| {
            record.original_instruction = word;
            record.condition = condition;
            record.inspection.insert(flag);
        })
    }

    /// Distinct origins of the keys still present; keys removed in the meantime are skipped.
    fn present_origins(&self, keys: &[BranchKey]) -> BTreeSet<Addr> {
        keys.iter()
            .filter(|key| self.branch_watch.contains(key))
            .map(|key| key.origin)
            .collect()
    }

    fn finish_row_action(&mut self, action: &str, count: usize) -> usize {
        debug!("{}: {} records affected", action, count);

        if count != 0 {
            self.branch_watch.commit();
        }

        count
    }
}
