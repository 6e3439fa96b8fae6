use thiserror::Error;

pub mod actions;
pub mod cpu;
pub mod memory;
pub mod narrow;
pub mod persist;
pub mod record;
pub mod snapshot;
pub mod store;

pub use cpu::{guard::CpuThreadGuard, Core, Cpu, GuardError, RunState};
pub use persist::{FormatError, PersistError};
pub use record::{BranchKey, BranchRecord, HitFlags, InspectionFlags};
pub use snapshot::Snapshot;
pub use store::BranchWatch;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Execute(#[from] cpu::execute::ExecuteError),

    #[error(transparent)]
    Memory(#[from] memory::MemoryError),
}
