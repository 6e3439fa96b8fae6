use libppc::{
    instruction::{
        condition::{ConditionSpec, BO_IGNORE_CTR},
        BranchForm, BranchInstruction,
    },
    Addr, Word,
};
use log::info;
use thiserror::Error;

use crate::{cpu::breakpoints::BreakAction, memory::InstructionMemory, Core};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("Instruction fetch outside of memory at {0:#010x}")]
    MemoryAccessViolation(Addr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    /// Stopped before executing the instruction at the address.
    Breakpoint(Addr),
}

impl Core {
    pub fn step(&mut self) -> Result<StepOutcome, ExecuteError> {
        let pc = self.regs.pc;

        // Resuming from a break executes the instruction it stopped at.
        if self.resume_from_break.take() != Some(pc) {
            if let Some(action) = self.breakpoints.get(pc) {
                if action.contains(BreakAction::LOG) {
                    info!(
                        "Breakpoint at {:#010x}: lr={:#010x} ctr={:#x} cr={:#010x}",
                        pc, self.regs.lr, self.regs.ctr, self.regs.cr
                    );
                }

                if action.contains(BreakAction::BREAK) {
                    self.resume_from_break = Some(pc);
                    return Ok(StepOutcome::Breakpoint(pc));
                }
            }
        }

        let word = self
            .memory
            .read_instruction(pc)
            .ok_or(ExecuteError::MemoryAccessViolation(pc))?;

        match BranchInstruction::decode(word) {
            Ok(branch) => self.execute_branch(pc, word, branch),
            // Only control flow is modelled, everything else falls through.
            Err(_) => self.regs.pc = next_pc(pc),
        }

        Ok(StepOutcome::Executed)
    }

    /// Steps up to `count` instructions, stopping early at a breakpoint.
    pub fn run_slice(&mut self, count: usize) -> Result<StepOutcome, ExecuteError> {
        for _ in 0..count {
            if let StepOutcome::Breakpoint(addr) = self.step()? {
                return Ok(StepOutcome::Breakpoint(addr));
            }
        }

        Ok(StepOutcome::Executed)
    }

    fn execute_branch(&mut self, pc: Addr, word: Word, branch: BranchInstruction) {
        let condition = match branch.form {
            // bcctr can't decrement the register it branches through.
            BranchForm::ToCountRegister => {
                ConditionSpec::new(branch.condition.bo | BO_IGNORE_CTR, branch.condition.bi)
            }
            _ => branch.condition,
        };

        if condition.decrements_ctr() {
            self.regs.ctr = self.regs.ctr.wrapping_sub(1);
        }

        let taken = condition.evaluate(self.regs.cr, self.regs.ctr);

        let destination = match branch.form {
            BranchForm::ToLinkRegister => self.regs.lr & !0b11,
            BranchForm::ToCountRegister => self.regs.ctr & !0b11,
            BranchForm::Immediate { .. } | BranchForm::Conditional { .. } => branch
                .direct_target(pc)
                .unwrap_or(crate::record::UNRESOLVED_DESTINATION),
        };

        if branch.link {
            self.regs.lr = next_pc(pc);
        }

        self.regs.pc = if taken { destination } else { next_pc(pc) };

        self.branch_watch
            .record_hit(pc, destination, branch.kind(), word, taken);
    }
}

fn next_pc(pc: Addr) -> Addr {
    pc.wrapping_add(libppc::BYTES_PER_WORD as Addr)
}
