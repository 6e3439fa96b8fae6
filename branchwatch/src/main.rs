use std::{path::PathBuf, process::exit, time::Duration};

use clap::Parser;
use command::{parse_number, Command};
use log::error;
use session::Session;

mod command;
mod session;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Raw big-endian program image.
    #[arg(short, long)]
    pub program_path: PathBuf,

    #[arg(short, long, default_value = "0x80000000", value_parser = parse_number)]
    pub load_addr: u32,

    /// Defaults to the load address.
    #[arg(short, long, value_parser = parse_number)]
    pub entry: Option<u32>,

    #[arg(short, long, default_value = "0x100000", value_parser = parse_number)]
    pub memory_size: u32,

    #[arg(short, long, default_value_t = 500)]
    pub guard_timeout_ms: u64,

    /// Branch watch loaded on boot and used by `save`/`load` without a path.
    #[arg(short, long)]
    pub watch_file: Option<PathBuf>,

    #[arg(short, long)]
    pub autosave: bool,

    /// Start recording branches as soon as the program boots.
    #[arg(short, long)]
    pub record: bool,
}

impl Args {
    pub fn guard_timeout(&self) -> Duration {
        Duration::from_millis(self.guard_timeout_ms)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut session = match Session::start(args) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to start: {:#}", e);
            exit(1);
        }
    };

    loop {
        session.report_status();

        let cmd = match Command::prompt() {
            Ok(Some(cmd)) => cmd,
            Ok(None) => break,
            Err(e) => {
                error!("{:#}", e);
                break;
            }
        };

        match session.execute(&cmd) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("!> {:#}", e),
        }
    }

    session.shutdown();
}
