// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fs,
    io::{self, Read, Write},
    path::PathBuf,
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use clap::{ArgAction, Args, Parser, Subcommand};
use dirq::{Message, Queue};
use dirq_common_telemetry::{logging, panic_hook};
use snafu::{ResultExt, Whatever};

mod build_info;
mod settings;

use settings::Settings;

#[derive(Debug, Parser)]
#[clap(
name = "dirq",
about = "Broker-less persistent queue on a shared directory",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON, by extension)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Queue root directory
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Permission mask for created files and directories, in octal
    #[arg(long, global = true, value_name = "OCTAL", value_parser = parse_umask)]
    umask: Option<u32>,

    /// More logging: -v for debug, -vv for trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Produce(ProduceArgs),
    Consume(ConsumeArgs),
    Purge(PurgeArgs),
    Count(CountArgs),
    Empty(EmptyArgs),
}

impl Cli {
    fn settings(&self) -> Result<Settings, Whatever> {
        let mut settings = Settings::load(self.config.as_deref())
            .whatever_context("failed to load configuration")?;
        if let Some(root) = &self.root {
            settings.queue.root = Some(root.clone());
        }
        if let Some(umask) = self.umask {
            settings.queue.umask = umask;
        }
        match self.verbose {
            0 => {}
            1 => settings.logging.level = Some("debug".to_string()),
            _ => settings.logging.level = Some("trace".to_string()),
        }
        Ok(settings)
    }
}

fn parse_umask(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mask {s:?}: {e}"))
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Publish messages. Each MESSAGE argument and each --file becomes one entry;
with neither, stdin is read as a single message. Prints the entry paths.
Examples:

dirq --root /var/spool/jobs produce HELLO GOODBYE
tar c src | dirq --root /var/spool/jobs produce

")]
struct ProduceArgs {
    /// Messages to publish
    messages: Vec<String>,

    /// Publish a copy of this file's contents
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,
}

impl ProduceArgs {
    fn run(&self, queue: &Queue) -> Result<ExitCode, Whatever> {
        let mut stdout = io::stdout().lock();
        let mut publish = |payload: &[u8]| -> Result<(), Whatever> {
            let entry = queue
                .produce(payload)
                .whatever_context("failed to produce message")?;
            writeln!(stdout, "{}", entry.display()).whatever_context("failed to write to stdout")
        };

        if self.messages.is_empty() && self.files.is_empty() {
            let mut payload = Vec::new();
            io::stdin()
                .read_to_end(&mut payload)
                .whatever_context("failed to read stdin")?;
            publish(&payload)?;
        }
        for message in &self.messages {
            publish(message.as_bytes())?;
        }
        for file in &self.files {
            let payload = fs::read(file)
                .with_whatever_context(|_| format!("failed to read {}", file.display()))?;
            publish(&payload)?;
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Claim messages and write their payloads to stdout, one per line.
With --once, exits 1 when no message could be claimed.
Examples:

dirq --root /var/spool/jobs consume
dirq --root /var/spool/jobs consume --follow --interval 5

")]
struct ConsumeArgs {
    /// Stop after one message
    #[arg(long)]
    once: bool,

    /// Keep polling for new messages until interrupted
    #[arg(long)]
    follow: bool,

    /// Seconds between polls with --follow
    #[arg(long, value_name = "SECS", default_value_t = 1)]
    interval: u64,

    /// Do not append a newline after each payload
    #[arg(long)]
    raw: bool,
}

impl ConsumeArgs {
    fn run(&self, queue: &Queue) -> Result<ExitCode, Whatever> {
        let running = Arc::new(AtomicBool::new(true));
        if self.follow {
            let running = running.clone();
            ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
                .whatever_context("failed to install Ctrl-C handler")?;
        }

        let mut stdout = io::stdout().lock();
        let mut consumed = 0usize;
        while running.load(Ordering::SeqCst) {
            for message in queue.consume() {
                let message = message.whatever_context("failed to consume message")?;
                self.emit(&mut stdout, &message)?;
                consumed += 1;
                if self.once {
                    return Ok(ExitCode::SUCCESS);
                }
            }
            if !self.follow {
                break;
            }
            sleep_while(&running, Duration::from_secs(self.interval));
        }

        tracing::debug!(consumed, "consume finished");
        if self.once && consumed == 0 {
            return Ok(ExitCode::FAILURE);
        }
        Ok(ExitCode::SUCCESS)
    }

    fn emit(&self, out: &mut impl Write, message: &Message) -> Result<(), Whatever> {
        out.write_all(&message.payload)
            .whatever_context("failed to write payload")?;
        if !self.raw {
            out.write_all(b"\n")
                .whatever_context("failed to write payload")?;
        }
        out.flush().whatever_context("failed to flush stdout")
    }
}

fn sleep_while(running: &AtomicBool, total: Duration) {
    const STEP: Duration = Duration::from_millis(100);
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STEP.min(deadline - now));
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Delete stale temp and lock files and remove empty buckets.
Lifetimes default to the configured queue values.
Examples:

dirq --root /var/spool/jobs purge
dirq --root /var/spool/jobs purge --max-lock-life 60

")]
struct PurgeArgs {
    /// Age in seconds after which .tmp files are deleted
    #[arg(long, value_name = "SECS")]
    max_temp_life: Option<u64>,

    /// Age in seconds after which .lck files are deleted
    #[arg(long, value_name = "SECS")]
    max_lock_life: Option<u64>,
}

impl PurgeArgs {
    fn run(&self, queue: &Queue) -> Result<ExitCode, Whatever> {
        let config = queue.config();
        let max_temp_life = self
            .max_temp_life
            .map_or(config.max_temp_life, Duration::from_secs);
        let max_lock_life = self
            .max_lock_life
            .map_or(config.max_lock_life, Duration::from_secs);

        let report = queue
            .purge_with(max_temp_life, max_lock_life)
            .whatever_context("failed to purge queue")?;
        println!(
            "removed {} buckets, {} temp files, {} lock files",
            report.buckets_removed, report.temps_removed, report.locks_removed
        );
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Print the number of messages waiting to be consumed.

")]
struct CountArgs {}

impl CountArgs {
    fn run(&self, queue: &Queue) -> Result<ExitCode, Whatever> {
        let count = queue.count().whatever_context("failed to count messages")?;
        println!("{count}");
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Exit 0 when no message is waiting, 1 otherwise.
Examples:

dirq --root /var/spool/jobs empty && echo drained

")]
struct EmptyArgs {}

impl EmptyArgs {
    fn run(&self, queue: &Queue) -> Result<ExitCode, Whatever> {
        let empty = queue.is_empty().whatever_context("failed to inspect queue")?;
        Ok(if empty {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

fn main() -> Result<ExitCode, Whatever> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    let settings = cli.settings()?;
    let _guards = logging::init_global_logging("dirq", &settings.logging);
    panic_hook::set_panic_hook();

    let queue = Queue::with_config(settings.queue.to_config()?)
        .whatever_context("failed to open queue")?;
    let code = match &cli.commands {
        Commands::Produce(args) => args.run(&queue),
        Commands::Consume(args) => args.run(&queue),
        Commands::Purge(args) => args.run(&queue),
        Commands::Count(args) => args.run(&queue),
        Commands::Empty(args) => args.run(&queue),
    };
    queue.close();
    code
}
