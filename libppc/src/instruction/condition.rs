use serde::{Deserialize, Serialize};

use crate::Word;

pub const BO_IGNORE_CONDITION: u8 = 0b10000;
pub const BO_BRANCH_IF_TRUE: u8 = 0b01000;
pub const BO_IGNORE_CTR: u8 = 0b00100;
pub const BO_BRANCH_IF_CTR_ZERO: u8 = 0b00010;

pub const BO_ALWAYS: u8 = BO_IGNORE_CONDITION | BO_IGNORE_CTR;

/// The BO and BI fields of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub bo: u8,
    pub bi: u8,
}

impl ConditionSpec {
    pub const fn new(bo: u8, bi: u8) -> Self {
        Self {
            bo: bo & 0x1F,
            bi: bi & 0x1F,
        }
    }

    pub const fn always() -> Self {
        Self::new(BO_ALWAYS, 0)
    }

    pub const fn checks_condition(&self) -> bool {
        self.bo & BO_IGNORE_CONDITION == 0
    }

    pub const fn decrements_ctr(&self) -> bool {
        self.bo & BO_IGNORE_CTR == 0
    }

    pub const fn is_always(&self) -> bool {
        !self.checks_condition() && !self.decrements_ctr()
    }

    pub const fn inverted(self) -> Self {
        Self::new(self.bo ^ BO_BRANCH_IF_TRUE, self.bi)
    }

    pub const fn decrement_check_inverted(self) -> Self {
        Self::new(self.bo ^ BO_BRANCH_IF_CTR_ZERO, self.bi)
    }

    pub const fn unconditional(self) -> Self {
        Self::new(BO_ALWAYS, self.bi)
    }

    /// Whether the branch goes taken, given the condition register and the
    /// count register after any decrement has already been applied.
    pub fn evaluate(&self, cr: Word, ctr: Word) -> bool {
        let ctr_ok = !self.decrements_ctr()
            || ((ctr != 0) != (self.bo & BO_BRANCH_IF_CTR_ZERO != 0));

        // CR bits are numbered from the most significant end.
        let cr_bit = (cr >> (31 - self.bi as u32)) & 1 == 1;
        let cond_ok = !self.checks_condition() || cr_bit == (self.bo & BO_BRANCH_IF_TRUE != 0);

        ctr_ok && cond_ok
    }
}
