use std::{path::PathBuf, time::Instant};

use anyhow::Context;
use apex_sim::{
    config::{load_config, SimConfig},
    cpu::{Cpu, CpuState, ExecResult},
    emulated::Emulated,
    inst::Opcode,
    out_of_order::OutOfOrder,
    pipelined::Pipelined,
    program::Program,
    regs::PrfEntry,
};
use clap::{Parser, ValueEnum};
use strum::IntoEnumIterator;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Print every stage after each cycle.
    Display,
    /// Print only the final state.
    Simulate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CpuKind {
    OutOfOrder,
    Pipelined,
    Emulated,
}

/// Cycle-level simulator for the APEX instruction set.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Assembly file, one instruction per line.
    file: PathBuf,

    /// YAML file overriding the machine sizes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many cycles instead of running to HALT.
    #[arg(short = 'n', long)]
    cycles: Option<u64>,

    #[arg(short, long, value_enum, default_value_t = Mode::Simulate)]
    mode: Mode,

    #[arg(long, value_enum, default_value_t = CpuKind::OutOfOrder)]
    cpu: CpuKind,

    /// Number of data memory words to print.
    #[arg(long, default_value_t = 50)]
    mem_cells: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let start = Instant::now();

    let contents = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let prog = contents
        .parse::<Program>()
        .with_context(|| format!("failed to parse {}", args.file.display()))?;

    let config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };

    let res = match args.cpu {
        CpuKind::OutOfOrder => simulate::<OutOfOrder>(prog, &config, &args)?,
        CpuKind::Pipelined => simulate::<Pipelined>(prog, &config, &args)?,
        CpuKind::Emulated => simulate::<Emulated>(prog, &config, &args)?,
    };

    print_result(&res, args.mem_cells);
    println!(
        "  Simulator time elapsed: {:.2}s",
        start.elapsed().as_secs_f32()
    );

    Ok(())
}

fn simulate<C: Cpu>(prog: Program, config: &SimConfig, args: &Args) -> anyhow::Result<ExecResult> {
    let mut cpu = C::new(prog, config)?;
    let limit = args.cycles.unwrap_or(u64::MAX);

    let mut cycle = 0;
    while cycle < limit {
        let state = cpu.step()?;
        cycle += 1;

        if args.mode == Mode::Display {
            println!("--------------------------------");
            println!("Clock Cycle #: {cycle}");
            println!("--------------------------------");
            for stage in cpu.stage_trace() {
                println!("{stage}");
            }
        }

        if state == CpuState::Stopped {
            break;
        }
    }

    Ok(cpu.snapshot())
}

fn print_result(res: &ExecResult, mem_cells: usize) {
    println!("=============== STATE OF ARCHITECTURAL REGISTER FILE ==========");
    for (reg, val) in res.regs.iter() {
        println!("|\t{reg:<4}\t|\tValue = {val:<8}\t|");
    }

    if !res.phys_regs.is_empty() {
        println!("=============== STATE OF PHYSICAL REGISTER FILE ==========");
        for (i, entry) in res.phys_regs.iter().enumerate() {
            let (val, status) = match entry {
                PrfEntry::Free => ("-".to_owned(), "Free"),
                PrfEntry::Pending => ("-".to_owned(), "Invalid"),
                PrfEntry::Ready(v) => (v.to_string(), "Valid"),
            };
            println!("|\tP{i:<3}\t|\tValue = {val:<8}\t|\tStatus = {status}\t|");
        }
    }

    println!("============== STATE OF DATA MEMORY =============");
    for (addr, val) in res.mem.words().iter().take(mem_cells).enumerate() {
        println!("|\tMEM[{addr}]\t|\tData Value = {val}\t|");
    }

    let stats = &res.stats;
    println!();
    println!("    EXECUTION COMPLETED");
    println!("    =====================");
    println!("    Instructions retired: {}", stats.insts_retired);
    println!("            Cycles taken: {}", stats.cycles);
    println!("  Instructions per clock: {:.2}", stats.ipc());
    println!("          Branches taken: {}", stats.branches_taken);
    println!("       Zero flag (final): {}", res.zero_flag);
    println!(
        "     Stalls (ROB/queue/PRF/hazard): {}/{}/{}/{}",
        stats.rob_full_stalls, stats.queue_full_stalls, stats.phys_reg_stalls, stats.hazard_stalls
    );

    for op in Opcode::iter() {
        if let Some(n) = stats.retired_by_opcode.get(&op) {
            println!("{op:>24}: {n}");
        }
    }
}
