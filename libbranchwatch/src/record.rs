use bitflags::bitflags;
use libppc::{
    instruction::{condition::ConditionSpec, kind::BranchKind, BranchInstruction},
    Addr, Word,
};

/// Destination of an indirect branch whose target wasn't resolved.
pub const UNRESOLVED_DESTINATION: Addr = 0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HitFlags: u8 {
        /// Went taken at least once since the record was created or loaded.
        const TAKEN_SESSION    = 0b001;
        /// Went taken since the last narrowing checkpoint.
        const TAKEN_RECENT     = 0b010;
        /// Fell through since the last narrowing checkpoint.
        const NOT_TAKEN_RECENT = 0b100;

        const RECENT = Self::TAKEN_RECENT.bits() | Self::NOT_TAKEN_RECENT.bits();
    }
}

bitflags! {
    /// What the operator has done to a record's branch site.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InspectionFlags: u8 {
        const SET_ORIGIN_NOP           = 0b000001;
        const SET_ORIGIN_BLR           = 0b000010;
        const INVERTED_CONDITION       = 0b000100;
        const INVERTED_DECREMENT_CHECK = 0b001000;
        const MADE_UNCONDITIONAL       = 0b010000;
        const BREAKPOINT_SET           = 0b100000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchKey {
    pub origin: Addr,
    pub destination: Addr,
    pub kind: BranchKind,
}

impl BranchKey {
    pub const fn new(origin: Addr, destination: Addr, kind: BranchKind) -> Self {
        Self {
            origin,
            destination,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    pub key: BranchKey,
    /// Instruction word expected at the origin. Tracks the operator's own patches.
    pub original_instruction: Word,
    pub condition: Option<ConditionSpec>,
    pub hit_flags: HitFlags,
    pub total_hits: u64,
    /// `total_hits` at the last narrowing checkpoint.
    pub hits_snapshot: u64,
    pub inspection: InspectionFlags,
}

impl BranchRecord {
    pub fn new(key: BranchKey, original_instruction: Word) -> Self {
        Self {
            key,
            original_instruction,
            condition: BranchInstruction::decode(original_instruction)
                .ok()
                .and_then(|instruction| instruction.condition_spec()),
            hit_flags: HitFlags::empty(),
            total_hits: 0,
            hits_snapshot: 0,
            inspection: InspectionFlags::empty(),
        }
    }

    pub fn instruction(&self) -> Option<BranchInstruction> {
        BranchInstruction::decode(self.original_instruction).ok()
    }

    pub fn recent_hits(&self) -> u64 {
        self.total_hits.saturating_sub(self.hits_snapshot)
    }

    pub(crate) fn hit(&mut self, taken: bool) {
        self.total_hits += 1;
        self.hit_flags |= if taken {
            HitFlags::TAKEN_SESSION | HitFlags::TAKEN_RECENT
        } else {
            HitFlags::NOT_TAKEN_RECENT
        };
    }

    pub(crate) fn checkpoint(&mut self) {
        self.hit_flags.remove(HitFlags::RECENT);
        self.hits_snapshot = self.total_hits;
    }
}
