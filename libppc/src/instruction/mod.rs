use std::fmt::Display;

use condition::ConditionSpec;
use kind::BranchKind;
use thiserror::Error;

use crate::{Addr, Word, WordSigned};

pub mod condition;
pub mod kind;

#[cfg(test)]
mod tests;

const OPCODE_BC: Word = 16;
const OPCODE_B: Word = 18;
const OPCODE_XL: Word = 19;

const XO_BCLR: Word = 16;
const XO_BCCTR: Word = 528;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InstructionDecodeError {
    #[error("Not a branch instruction ({0:#010x})")]
    NotABranch(Word),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchForm {
    /// `b`: 24-bit word displacement.
    Immediate { li: WordSigned },
    /// `bc`: 14-bit word displacement.
    Conditional { bd: WordSigned },
    /// `bclr`
    ToLinkRegister,
    /// `bcctr`
    ToCountRegister,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchInstruction {
    pub form: BranchForm,
    pub condition: ConditionSpec,
    pub absolute: bool,
    pub link: bool,
}

impl BranchInstruction {
    pub const fn new(form: BranchForm) -> Self {
        Self {
            form,
            condition: ConditionSpec::always(),
            absolute: false,
            link: false,
        }
    }

    pub const fn b(li: WordSigned) -> Self {
        Self::new(BranchForm::Immediate { li })
    }

    pub const fn bc(condition: ConditionSpec, bd: WordSigned) -> Self {
        Self::new(BranchForm::Conditional { bd }).with_condition(condition)
    }

    pub const fn blr() -> Self {
        Self::new(BranchForm::ToLinkRegister)
    }

    pub const fn bctr() -> Self {
        Self::new(BranchForm::ToCountRegister)
    }

    pub const fn with_condition(mut self, condition: ConditionSpec) -> Self {
        self.condition = condition;
        self
    }

    pub const fn with_link(mut self) -> Self {
        self.link = true;
        self
    }

    pub const fn with_absolute(mut self) -> Self {
        self.absolute = true;
        self
    }

    pub fn decode(word: Word) -> Result<Self, InstructionDecodeError> {
        let opcode = word >> 26;
        let bo = ((word >> 21) & 0x1F) as u8;
        let bi = ((word >> 16) & 0x1F) as u8;
        let absolute = word & 0b10 != 0;
        let link = word & 0b1 != 0;

        let (form, condition, absolute) = match opcode {
            OPCODE_B => (
                BranchForm::Immediate {
                    li: crate::sign_extend(word & 0x03FF_FFFC, 26),
                },
                ConditionSpec::always(),
                absolute,
            ),

            OPCODE_BC => (
                BranchForm::Conditional {
                    bd: crate::sign_extend(word & 0xFFFC, 16),
                },
                ConditionSpec::new(bo, bi),
                absolute,
            ),

            // Bit 1 belongs to the extended opcode in the XL form, there is no AA.
            OPCODE_XL => match (word >> 1) & 0x3FF {
                XO_BCLR => (BranchForm::ToLinkRegister, ConditionSpec::new(bo, bi), false),
                XO_BCCTR => (BranchForm::ToCountRegister, ConditionSpec::new(bo, bi), false),
                _ => return Err(InstructionDecodeError::NotABranch(word)),
            },

            _ => return Err(InstructionDecodeError::NotABranch(word)),
        };

        Ok(Self {
            form,
            condition,
            absolute,
            link,
        })
    }

    pub fn encode(&self) -> Word {
        let aa_lk = (self.absolute as Word) << 1 | self.link as Word;
        let bo_bi = (self.condition.bo as Word) << 21 | (self.condition.bi as Word) << 16;

        match self.form {
            BranchForm::Immediate { li } => OPCODE_B << 26 | (li as Word & 0x03FF_FFFC) | aa_lk,
            BranchForm::Conditional { bd } => {
                OPCODE_BC << 26 | bo_bi | (bd as Word & 0xFFFC) | aa_lk
            }
            BranchForm::ToLinkRegister => OPCODE_XL << 26 | bo_bi | XO_BCLR << 1 | self.link as Word,
            BranchForm::ToCountRegister => {
                OPCODE_XL << 26 | bo_bi | XO_BCCTR << 1 | self.link as Word
            }
        }
    }

    pub fn kind(&self) -> BranchKind {
        BranchKind::classify(self)
    }

    /// The BO/BI fields, for the forms that have them and don't always branch.
    pub fn condition_spec(&self) -> Option<ConditionSpec> {
        match self.form {
            BranchForm::Immediate { .. } => None,
            _ if self.condition.is_always() => None,
            _ => Some(self.condition),
        }
    }

    /// Target of the displacement forms, `None` for the register forms.
    pub fn direct_target(&self, pc: Addr) -> Option<Addr> {
        let displacement = match self.form {
            BranchForm::Immediate { li } => li,
            BranchForm::Conditional { bd } => bd,
            BranchForm::ToLinkRegister | BranchForm::ToCountRegister => return None,
        };

        Some(if self.absolute {
            displacement as Addr
        } else {
            pc.wrapping_add_signed(displacement)
        })
    }

    /// Whether the BO field can be edited in place.
    pub fn has_condition_field(&self) -> bool {
        !matches!(self.form, BranchForm::Immediate { .. })
    }
}

impl Display for BranchInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = match (self.link, self.absolute) {
            (false, false) => "",
            (true, false) => "l",
            (false, true) => "a",
            (true, true) => "la",
        };

        match self.form {
            BranchForm::Immediate { li } => {
                f.write_fmt(format_args!("b{} {}", suffix, Displacement(li)))
            }
            BranchForm::Conditional { bd } => f.write_fmt(format_args!(
                "bc{} {},{},{}",
                suffix,
                self.condition.bo,
                self.condition.bi,
                Displacement(bd)
            )),
            BranchForm::ToLinkRegister | BranchForm::ToCountRegister => {
                let register = if self.form == BranchForm::ToLinkRegister {
                    "lr"
                } else {
                    "ctr"
                };

                if self.condition.is_always() {
                    f.write_fmt(format_args!("b{}{}", register, suffix))
                } else {
                    f.write_fmt(format_args!(
                        "bc{}{} {},{}",
                        register, suffix, self.condition.bo, self.condition.bi
                    ))
                }
            }
        }
    }
}

struct Displacement(WordSigned);

impl Display for Displacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        f.write_fmt(format_args!("{}{:#x}", sign, self.0.unsigned_abs()))
    }
}
