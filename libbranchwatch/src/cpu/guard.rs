use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

use log::debug;
use parking_lot::{MappedMutexGuard, MutexGuard};

use super::{execute::ExecuteError, execute::StepOutcome, Core, GuardError, RunState, Shared};

/// Exclusive access to the emulated CPU from the control thread.
///
/// While one exists the emulation thread is parked between run slices, so memory,
/// registers and the branch watch are seen torn-free. Dropping it lets emulation
/// continue in whatever run state it had, unless [`Self::stay_paused`] or
/// [`Self::resume_on_release`] asked for a different one.
pub struct CpuThreadGuard<'a> {
    core: MappedMutexGuard<'a, Core>,
    shared: &'a Shared,
    release_state: Option<RunState>,
}

impl<'a> CpuThreadGuard<'a> {
    pub(super) fn acquire(shared: &'a Shared, timeout: Duration) -> Result<Self, GuardError> {
        let machine = shared
            .machine
            .try_lock_for(timeout)
            .ok_or(GuardError::Timeout(timeout))?;

        let core = MutexGuard::try_map(machine, |machine| machine.as_mut())
            .map_err(|_| GuardError::NoTarget)?;

        debug!("CPU guard acquired");

        Ok(Self {
            core,
            shared,
            release_state: None,
        })
    }

    pub fn stay_paused(&mut self) {
        self.release_state = Some(RunState::Paused);
    }

    pub fn resume_on_release(&mut self) {
        self.release_state = Some(RunState::Running);
    }

    /// Single-steps while the guard is held; branches are recorded as usual.
    pub fn step(&mut self) -> Result<StepOutcome, ExecuteError> {
        self.core.step()
    }
}

impl Deref for CpuThreadGuard<'_> {
    type Target = Core;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl DerefMut for CpuThreadGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.core
    }
}

impl Drop for CpuThreadGuard<'_> {
    fn drop(&mut self) {
        // Hits recorded by single-stepping may still be waiting for an autosave.
        self.core.branch_watch.flush_autosave();

        if let Some(run_state) = self.release_state {
            self.shared.set_run_state(run_state);
        }

        debug!("CPU guard released");
    }
}
