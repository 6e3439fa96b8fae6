use std::{fmt::Display, str::FromStr};

use bimap::BiMap;
use lazy_static::lazy_static;

use super::{BranchForm, BranchInstruction};

lazy_static! {
    static ref KIND_TAG_BIMAP: BiMap<BranchKind, u8> = BiMap::from_iter([
        (BranchKind::Unconditional, 0),
        (BranchKind::Conditional, 1),
        (BranchKind::ConditionalDecrement, 2),
        (BranchKind::Indirect, 3),
    ]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BranchKind {
    Unconditional,
    Conditional,
    ConditionalDecrement,
    Indirect,
}

impl BranchKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        KIND_TAG_BIMAP.get_by_right(&tag).copied()
    }

    pub fn tag(&self) -> u8 {
        *KIND_TAG_BIMAP
            .get_by_left(self)
            .expect("No tag mapping for branch kind")
    }

    pub fn classify(instruction: &BranchInstruction) -> Self {
        match instruction.form {
            BranchForm::Immediate { .. } => Self::Unconditional,
            BranchForm::ToLinkRegister | BranchForm::ToCountRegister => Self::Indirect,
            BranchForm::Conditional { .. } => {
                if instruction.condition.decrements_ctr() {
                    Self::ConditionalDecrement
                } else if instruction.condition.checks_condition() {
                    Self::Conditional
                } else {
                    Self::Unconditional
                }
            }
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Self::Conditional | Self::ConditionalDecrement)
    }
}

impl Display for BranchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unconditional => "uncond",
            Self::Conditional => "cond",
            Self::ConditionalDecrement => "cond-dec",
            Self::Indirect => "indirect",
        })
    }
}

impl FromStr for BranchKind {
    type Err = UnknownBranchKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uncond" => Ok(Self::Unconditional),
            "cond" => Ok(Self::Conditional),
            "cond-dec" => Ok(Self::ConditionalDecrement),
            "indirect" => Ok(Self::Indirect),
            _ => Err(UnknownBranchKind(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("Unknown branch kind '{0}'")]
pub struct UnknownBranchKind(pub String);
