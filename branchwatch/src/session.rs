use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::Context;
use libbranchwatch::{
    cpu::{breakpoints::BreakAction, execute::StepOutcome, Registers},
    memory::Memory,
    narrow::Narrowed,
    persist::DEFAULT_FILE_NAME,
    BranchKey, BranchRecord, BranchWatch, Core, Cpu, HitFlags,
};
use libppc::{instruction::kind::BranchKind, Addr};
use log::{info, warn};

use crate::{
    command::{parse_number, Command, CommandError},
    Args,
};

pub struct Session {
    args: Args,
    cpu: Cpu,
    /// Last generation announced by the booted program's branch watch.
    generation: Arc<AtomicU64>,
    reported_generation: u64,
}

impl Session {
    pub fn start(args: Args) -> anyhow::Result<Self> {
        let session = Self {
            args,
            cpu: Cpu::spawn(),
            generation: Arc::new(AtomicU64::new(0)),
            reported_generation: 0,
        };

        session.boot()?;
        Ok(session)
    }

    /// Loads the program image afresh. The previous branch watch goes with the old core.
    fn boot(&self) -> anyhow::Result<()> {
        let path = &self.args.program_path;
        let image = fs::read(path).with_context(|| format!("Couldn't read {}", path.display()))?;

        let core = self.build_core(&image)?;
        self.cpu.boot(core, self.args.guard_timeout())?;

        Ok(())
    }

    fn build_core(&self, image: &[u8]) -> Result<Core, libbranchwatch::Error> {
        let memory = Memory::with_image(
            self.args.load_addr,
            self.args.memory_size as usize,
            self.args.load_addr,
            image,
        )?;
        let mut core = Core::new(memory, self.args.entry.unwrap_or(self.args.load_addr));

        let generation = Arc::clone(&self.generation);
        core.branch_watch.subscribe(Box::new(move |current| {
            generation.store(current, Ordering::Relaxed);
        }));

        if let Some(watch_file) = self.args.watch_file.as_deref().filter(|path| path.exists()) {
            core.branch_watch.load(watch_file)?;
            info!("Loaded {} branch records", core.branch_watch.len());
        }

        core.branch_watch.set_autosave(self.args.autosave);
        if self.args.record {
            core.branch_watch.start_recording();
        }

        Ok(core)
    }

    pub fn report_status(&mut self) {
        let generation = self.generation.load(Ordering::Relaxed);

        if generation != self.reported_generation {
            self.reported_generation = generation;
            println!(
                "<<<   Branch watch generation {}, {:?}   >>>",
                generation,
                self.cpu.run_state()
            );
        }
    }

    /// Runs one command line, `false` once the operator asked to quit.
    pub fn execute(&mut self, cmd: &Command) -> anyhow::Result<bool> {
        let mut args = cmd.args();
        let timeout = self.args.guard_timeout();

        let Some(name) = args.next_optional() else {
            return Ok(true);
        };

        match name {
            "boot" => self.boot()?,
            "run" => self.cpu.run(),
            "pause" => self.cpu.pause(),
            "step" => {
                let count = match args.next_optional() {
                    Some(arg) => parse_number(arg)
                        .map_err(|e| CommandError::ParseError(format!("{arg}: {e}")))?,
                    None => 1,
                };

                self.cpu.pause();
                let mut guard = self.cpu.guard(timeout)?;

                for _ in 0..count {
                    if let StepOutcome::Breakpoint(addr) = guard.step()? {
                        println!("Breakpoint at {:#010x}", addr);
                        break;
                    }
                }

                print_registers(&guard.regs);
            }
            "regs" => print_registers(&self.cpu.guard(timeout)?.regs),
            "cr" => {
                let cr = args.next_number()?;
                let mut guard = self.cpu.guard(timeout)?;
                guard.regs.cr = cr;
            }
            "ctr" => {
                let ctr = args.next_number()?;
                let mut guard = self.cpu.guard(timeout)?;
                guard.regs.ctr = ctr;
            }

            "start" => self.cpu.guard(timeout)?.branch_watch.start_recording(),
            "stop" => self.cpu.guard(timeout)?.branch_watch.pause_recording(),
            "clear" => self.cpu.guard(timeout)?.branch_watch.clear(),
            "taken" => print_narrowed(self.cpu.guard(timeout)?.branch_watch.isolate_was_taken()),
            "nottaken" => print_narrowed(self.cpu.guard(timeout)?.branch_watch.isolate_not_taken()),
            "overwritten" => {
                let mut guard = self.cpu.guard(timeout)?;
                let core = &mut *guard;
                print_narrowed(core.branch_watch.isolate_was_overwritten(&core.memory));
            }
            "notoverwritten" => {
                let mut guard = self.cpu.guard(timeout)?;
                let core = &mut *guard;
                print_narrowed(core.branch_watch.isolate_not_overwritten(&core.memory));
            }
            "wipe" => self.cpu.guard(timeout)?.branch_watch.wipe_recent_hits(),
            "wipeinspect" => self.cpu.guard(timeout)?.branch_watch.wipe_inspection(),
            "ignore" => {
                let origins = match args.next()? {
                    "off" => None,
                    start => {
                        let start = parse_number(start)
                            .map_err(|e| CommandError::ParseError(format!("{start}: {e}")))?;
                        Some(start..=args.next_number()?)
                    }
                };

                self.cpu.guard(timeout)?.branch_watch.set_ignored_origins(origins);
            }
            "list" => {
                let kind = args
                    .next_optional()
                    .map(str::parse::<BranchKind>)
                    .transpose()
                    .map_err(|e| CommandError::ParseError(e.to_string()))?;

                let guard = self.cpu.guard(timeout)?;
                let mut listed = 0;

                for record in guard
                    .branch_watch
                    .iter()
                    .filter(|record| kind.map_or(true, |kind| record.key.kind == kind))
                {
                    print_record(record);
                    listed += 1;
                }

                println!("{} of {} records", listed, guard.branch_watch.len());
            }

            "del" | "nop" | "blr" | "invert" | "invdec" | "uncond" | "bpclear" => {
                let origins = args.remaining_numbers()?;
                let mut guard = self.cpu.guard(timeout)?;
                let keys = selected_keys(&guard.branch_watch, &origins);

                let affected = match name {
                    "del" => guard.delete_records(&keys),
                    "nop" => guard.set_nop_patches(&keys),
                    "blr" => guard.set_blr_patches(&keys),
                    "invert" => guard.invert_condition(&keys),
                    "invdec" => guard.invert_decrement_check(&keys),
                    "uncond" => guard.make_unconditional(&keys),
                    _ => guard.clear_breakpoints(&keys),
                };

                println!("{} of {} selected records affected", affected, keys.len());
            }
            "bp" => {
                let action = match args.next()? {
                    "break" => BreakAction::BREAK,
                    "log" => BreakAction::LOG,
                    "both" => BreakAction::BREAK | BreakAction::LOG,
                    other => Err(CommandError::ParseError(other.to_string()))?,
                };

                let origins = args.remaining_numbers()?;
                let mut guard = self.cpu.guard(timeout)?;
                let keys = selected_keys(&guard.branch_watch, &origins);

                let affected = guard.set_breakpoints(&keys, action);
                println!("{} of {} selected records affected", affected, keys.len());
            }

            "save" => {
                let mut guard = self.cpu.guard(timeout)?;
                let path =
                    self.watch_path(args.next_optional(), guard.branch_watch.autosave_path());

                guard.branch_watch.save(&path)?;
                println!("Saved {} records to {}", guard.branch_watch.len(), path.display());
            }
            "load" => {
                let mut guard = self.cpu.guard(timeout)?;
                let path =
                    self.watch_path(args.next_optional(), guard.branch_watch.autosave_path());

                guard.branch_watch.load(&path)?;
                println!("Loaded {} records from {}", guard.branch_watch.len(), path.display());
            }
            "autosave" => {
                let enabled = match args.next()? {
                    "on" => true,
                    "off" => false,
                    other => Err(CommandError::ParseError(other.to_string()))?,
                };

                let mut guard = self.cpu.guard(timeout)?;
                guard.branch_watch.set_autosave(enabled);

                if enabled && guard.branch_watch.autosave_path().is_none() {
                    println!("Autosave starts after the first save");
                }
            }
            "status" => self.print_status()?,

            "quit" => return Ok(false),
            _ => Err(CommandError::UnknownCommand)?,
        }

        let unused_arg_count = args.unused();
        if unused_arg_count != 0 {
            eprintln!("{} unused command arguments!", unused_arg_count);
        }

        Ok(true)
    }

    fn watch_path(&self, arg: Option<&str>, autosave_path: Option<&Path>) -> PathBuf {
        arg.map(PathBuf::from)
            .or_else(|| autosave_path.map(Path::to_path_buf))
            .or_else(|| self.args.watch_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_NAME))
    }

    fn print_status(&self) -> anyhow::Result<()> {
        let guard = self.cpu.guard(self.args.guard_timeout())?;
        let watch = &guard.branch_watch;

        println!("{:?} at {:#010x}", self.cpu.run_state(), guard.regs.pc);
        println!(
            "Recording {}, {} records, generation {}, {} breakpoints",
            if watch.is_recording() { "on" } else { "off" },
            watch.len(),
            watch.generation(),
            guard.breakpoints.len(),
        );

        if let Some(ignored) = watch.ignored_origins() {
            println!("Ignoring origins {:#010x}..={:#010x}", ignored.start(), ignored.end());
        }

        match (watch.is_autosave_enabled(), watch.autosave_path()) {
            (true, Some(path)) => println!("Autosaving to {}", path.display()),
            (true, None) => println!("Autosave waiting for a save path"),
            (false, _) => println!("Autosave off"),
        }

        if let Some(e) = watch.take_autosave_error() {
            println!("Last autosave failed: {}", e);
        }

        Ok(())
    }

    /// Stops emulation and waits for pending autosaves.
    pub fn shutdown(self) {
        match self.cpu.shutdown_core(self.args.guard_timeout()) {
            Ok(Some(mut core)) => {
                core.branch_watch.flush_autosave();
                core.branch_watch.sync_autosave();

                if let Some(e) = core.branch_watch.take_autosave_error() {
                    warn!("Last autosave failed: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Couldn't stop emulation: {}", e),
        }
    }
}

fn selected_keys(watch: &BranchWatch, origins: &[Addr]) -> Vec<BranchKey> {
    origins
        .iter()
        .flat_map(|origin| watch.keys_at(*origin))
        .collect()
}

fn print_registers(regs: &Registers) {
    println!(
        "PC: {:#010x}, LR: {:#010x}, CTR: {:#x}, CR: {:#010x}",
        regs.pc, regs.lr, regs.ctr, regs.cr
    );
}

fn print_narrowed(narrowed: Narrowed) {
    println!("{} kept, {} removed", narrowed.kept, narrowed.removed);
}

fn print_record(record: &BranchRecord) {
    let instruction = record.instruction().map_or_else(
        || format!("{:#010x}", record.original_instruction),
        |instruction| instruction.to_string(),
    );

    let inspection = record
        .inspection
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(",");

    println!(
        "{:#010x} -> {:#010x}  {:<8}  {:>8} (+{})  {}  {:<20}  {}",
        record.key.origin,
        record.key.destination,
        record.key.kind.to_string(),
        record.total_hits,
        record.recent_hits(),
        hit_marks(record.hit_flags),
        instruction,
        inspection,
    );
}

fn hit_marks(flags: HitFlags) -> String {
    [
        (HitFlags::TAKEN_SESSION, 'T'),
        (HitFlags::TAKEN_RECENT, 't'),
        (HitFlags::NOT_TAKEN_RECENT, 'n'),
    ]
    .iter()
    .map(|(flag, mark)| if flags.contains(*flag) { *mark } else { '-' })
    .collect()
}
