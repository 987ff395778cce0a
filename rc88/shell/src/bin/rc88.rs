use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rc88_core::io::{AlwaysReady, NoKeys, SleepTicks};
use rc88_core::program::{ProgramAddress, Region};
use rc88_core::runner::{RunReason, Runner};
use rc88_core::state::Machine;
use rc88_shell::console::ConsoleDisplay;
use rc88_shell::{asm, backup};

#[derive(Parser)]
#[command(name = "rc88", about = "RC-88 calculator core, hosted")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a program listing and run it from the first step.
    Run {
        /// Program listing file.
        program: PathBuf,
        /// Stop after this many instructions even if still running.
        #[arg(long)]
        steps: Option<u64>,
        /// Restore machine state from a backup before loading the program.
        #[arg(long)]
        load: Option<PathBuf>,
        /// Write a backup archive after the run.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Assemble a listing and print it back with step numbers.
    List {
        program: PathBuf,
    },
    /// Show the metadata of a backup archive.
    Info {
        backup: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run {
            program,
            steps,
            load,
            save,
        } => run(program, steps, load, save),
        Command::List { program } => list(program),
        Command::Info { backup } => info(backup),
    }
}

fn run(
    program: PathBuf,
    steps: Option<u64>,
    load: Option<PathBuf>,
    save: Option<PathBuf>,
) -> Result<()> {
    let mut machine = Machine::with_display(Box::new(ConsoleDisplay));
    if let Some(path) = &load {
        backup::load_backup(path, &mut machine)
            .with_context(|| format!("loading backup {}", path.display()))?;
        machine.program.clear_ram();
    }

    let source = std::fs::read_to_string(&program)
        .with_context(|| format!("reading {}", program.display()))?;
    let count = asm::load_into(&mut machine, &source)?;

    machine.state.pc = ProgramAddress::ram(machine.program.first_step(Region::Ram));
    machine.state.running = true;

    let mut runner = Runner::new(NoKeys, AlwaysReady, SleepTicks::default());
    runner.step_limit = steps;
    let reason = runner.run(&mut machine);

    println!("loaded {count} instructions; stopped: {reason:?}");
    println!("  X = {}", machine.state.user.format(machine.state.regs.x()));
    println!("  Y = {}", machine.state.user.format(machine.state.regs.y()));
    println!("  PC = {}", machine.state.pc);
    if reason == RunReason::StepLimit {
        bail!("step limit reached before the program halted");
    }

    if let Some(path) = &save {
        backup::save_backup(path, &machine)
            .with_context(|| format!("writing backup {}", path.display()))?;
        println!("saved backup to {}", path.display());
    }
    Ok(())
}

fn list(program: PathBuf) -> Result<()> {
    let source = std::fs::read_to_string(&program)
        .with_context(|| format!("reading {}", program.display()))?;
    let mut machine = Machine::new();
    asm::load_into(&mut machine, &source)?;
    for (idx, line) in asm::disassemble(&machine).lines().enumerate() {
        println!("{:03} {line}", idx + 1);
    }
    Ok(())
}

fn info(path: PathBuf) -> Result<()> {
    let mut machine = Machine::new();
    let metadata = backup::load_backup(&path, &mut machine)
        .with_context(|| format!("reading backup {}", path.display()))?;
    println!("magic:    {}", metadata.magic);
    println!("version:  {}", metadata.version);
    println!("created:  {}", metadata.created);
    println!("program:  {} cells", metadata.program_len);
    for (slot, len) in metadata.lib_lens.iter().enumerate() {
        println!("lib{slot}:     {len} cells");
    }
    println!("PC:       {}", machine.state.pc);
    Ok(())
}
