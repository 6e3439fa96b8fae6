use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use breakpoints::BreakpointTable;
use execute::StepOutcome;
use guard::CpuThreadGuard;
use libppc::{Addr, Word};
use log::{debug, error, info};
use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

use crate::{memory::Memory, store::BranchWatch};

pub mod breakpoints;
pub mod execute;
pub mod guard;


pub const DEFAULT_GUARD_TIMEOUT: Duration = Duration::from_millis(500);

/// Instructions executed per lock hold on the emulation thread.
pub const RUN_SLICE: usize = 1024;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GuardError {
    #[error("No program is loaded")]
    NoTarget,

    #[error("Emulation didn't pause within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub pc: Addr,
    pub lr: Word,
    pub ctr: Word,
    pub cr: Word,
}

/// A loaded program: memory, registers, breakpoints and its branch watch.
pub struct Core {
    pub memory: Memory,
    pub regs: Registers,
    pub breakpoints: BreakpointTable,
    pub branch_watch: BranchWatch,

    pub(crate) resume_from_break: Option<Addr>,
}

impl Core {
    pub fn new(memory: Memory, entry: Addr) -> Self {
        Self {
            memory,
            regs: Registers {
                pc: entry,
                ..Default::default()
            },
            breakpoints: BreakpointTable::new(),
            branch_watch: BranchWatch::new(),
            resume_from_break: None,
        }
    }
}

struct RunControl {
    run_state: RunState,
    shutdown: bool,
}

pub(crate) struct Shared {
    machine: Mutex<Option<Core>>,
    control: Mutex<RunControl>,
    wake: Condvar,
}

impl Shared {
    pub(crate) fn set_run_state(&self, run_state: RunState) {
        self.control.lock().run_state = run_state;
        self.wake.notify_all();
    }
}

/// Handle to the emulated CPU and the thread that advances it.
pub struct Cpu {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Cpu {
    pub fn spawn() -> Self {
        let shared = Arc::new(Shared {
            machine: Mutex::new(None),
            control: Mutex::new(RunControl {
                run_state: RunState::Paused,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("emulation".to_string())
            .spawn(move || emulation_loop(&thread_shared))
            .ok();

        if thread.is_none() {
            error!("Couldn't spawn the emulation thread, only stepping will work");
        }

        Self { shared, thread }
    }

    /// Installs `core`, replacing (and dropping the branch watch of) any previous one.
    pub fn boot(&self, core: Core, timeout: Duration) -> Result<(), GuardError> {
        let mut machine = self
            .shared
            .machine
            .try_lock_for(timeout)
            .ok_or(GuardError::Timeout(timeout))?;

        info!("Booting program at {:#010x}", core.regs.pc);
        *machine = Some(core);

        Ok(())
    }

    pub fn shutdown_core(&self, timeout: Duration) -> Result<Option<Core>, GuardError> {
        let mut machine = self
            .shared
            .machine
            .try_lock_for(timeout)
            .ok_or(GuardError::Timeout(timeout))?;

        self.shared.set_run_state(RunState::Paused);
        Ok(machine.take())
    }

    pub fn run(&self) {
        self.shared.set_run_state(RunState::Running);
    }

    /// Requests a pause. The current run slice finishes first.
    pub fn pause(&self) {
        self.shared.set_run_state(RunState::Paused);
    }

    pub fn run_state(&self) -> RunState {
        self.shared.control.lock().run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn guard(&self, timeout: Duration) -> Result<CpuThreadGuard<'_>, GuardError> {
        CpuThreadGuard::acquire(&self.shared, timeout)
    }
}

impl Drop for Cpu {
    fn drop(&mut self) {
        {
            let mut control = self.shared.control.lock();
            control.shutdown = true;
        }
        self.shared.wake.notify_all();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Emulation thread panicked");
            }
        }
    }
}

fn emulation_loop(shared: &Shared) {
    loop {
        {
            let mut control = shared.control.lock();
            while control.run_state == RunState::Paused && !control.shutdown {
                shared.wake.wait(&mut control);
            }

            if control.shutdown {
                debug!("Emulation thread exiting");
                return;
            }
        }

        let mut machine = shared.machine.lock();

        let stop = match machine.as_mut() {
            None => true,
            Some(core) => {
                let outcome = core.run_slice(RUN_SLICE);
                core.branch_watch.flush_autosave();

                match outcome {
                    Ok(StepOutcome::Executed) => false,
                    Ok(StepOutcome::Breakpoint(addr)) => {
                        info!("Paused at breakpoint {:#010x}", addr);
                        true
                    }
                    Err(e) => {
                        error!("Emulation stopped: {}", e);
                        true
                    }
                }
            }
        };

        if stop {
            shared.set_run_state(RunState::Paused);
        }

        // Hand the CPU straight to a waiting guard instead of racing it for the next slice.
        MutexGuard::unlock_fair(machine);
    }
}
