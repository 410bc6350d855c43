use std::fs;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::IntoDiagnostic;

use otto::isa::{self, Cycles};
use otto::runtime::{Bus, Cpu, RunOptions, Snapshot, StopReason, DEFAULT_STEP_LIMIT};
use otto::trace::{first_divergence, Coverage, Monitor, Profile};
use otto::Program;

mod env;

/// Otto is a complete & convenient assembler toolchain for Intel 8085
/// assembly.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and run a program, printing the final machine state
    Run {
        /// `.asm`, `.a85`, or `.8085` source file
        name: PathBuf,
        /// Remove the runaway-loop safety bound
        #[arg(long = "unsafe")]
        unbounded: bool,
        /// Maximum instructions to execute
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Assemble without running and report diagnostics
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the address/bytes/source listing
    Listing {
        /// File to list
        name: PathBuf,
    },
    /// Disassemble the assembled image
    Dis {
        /// File to disassemble
        name: PathBuf,
        /// Start address (e.g. 8000H); defaults to the program origin
        #[arg(long)]
        addr: Option<String>,
        /// Number of instructions to decode
        #[arg(long, default_value_t = 16)]
        count: u16,
    },
    /// Dump the symbol table
    Symbols {
        /// File to inspect
        name: PathBuf,
    },
    /// Run with a coverage bitmap and report unexecuted lines
    Coverage {
        /// File to run
        name: PathBuf,
        #[arg(long = "unsafe")]
        unbounded: bool,
    },
    /// Run with per-address counters and report the hottest spots
    Profile {
        /// File to run
        name: PathBuf,
        /// Rows to show
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Run two programs in lock step and report the first divergence
    Diff {
        /// Baseline program
        left: PathBuf,
        /// Candidate program
        right: PathBuf,
        #[arg(long, default_value_t = DEFAULT_STEP_LIMIT)]
        limit: u64,
    },
}

fn main() -> miette::Result<ExitCode> {
    env::init();
    let args = Args::parse();

    match args.command {
        Command::Run {
            name,
            unbounded,
            limit,
        } => {
            let program = assemble_file(&name)?;
            if program.has_errors() {
                return Ok(ExitCode::from(1));
            }
            run_program(&name, &program, resolve_limit(unbounded, limit))
        }
        Command::Check { name } => {
            let program = assemble_file(&name)?;
            if program.has_errors() {
                return Ok(ExitCode::from(1));
            }
            println!(
                "{:>12} with {} warnings",
                "Finished".green().bold(),
                program
                    .diagnostics
                    .len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Listing { name } => {
            let program = assemble_file(&name)?;
            for row in &program.listing {
                let bytes = row
                    .bytes
                    .iter()
                    .map(|b| format!("{b:02X}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{:04X}  {bytes:<9} {}", row.addr, row.text);
            }
            Ok(exit_for(&program))
        }
        Command::Dis { name, addr, count } => {
            let program = assemble_file(&name)?;
            let mut pc = match addr {
                Some(text) => parse_address(&text)?,
                None => program.origin,
            };
            for _ in 0..count {
                match isa::disassemble_at(&program.memory, pc) {
                    Some(dis) => {
                        let cycles = match dis.cycles {
                            Cycles::Fixed(n) => format!("{n}T"),
                            Cycles::Branch { taken, not_taken } => {
                                format!("{taken}/{not_taken}T")
                            }
                        };
                        println!("{pc:04X}  {:<14} ; {cycles}", dis.text);
                        pc = pc.wrapping_add(dis.len as u16);
                    }
                    None => {
                        println!("{pc:04X}  DB {}", isa::hex8(program.memory[pc as usize]));
                        pc = pc.wrapping_add(1);
                    }
                }
            }
            Ok(exit_for(&program))
        }
        Command::Symbols { name } => {
            let program = assemble_file(&name)?;
            for symbol in program.symbols.sorted() {
                println!(
                    "{:<16} = {}  ; line {}, {} refs",
                    symbol.name,
                    isa::hex16(symbol.value),
                    symbol.defined_at.line(),
                    symbol.references.len()
                );
            }
            Ok(exit_for(&program))
        }
        Command::Coverage { name, unbounded } => {
            let program = assemble_file(&name)?;
            if program.has_errors() {
                return Ok(ExitCode::from(1));
            }
            run_coverage(&program, resolve_limit(unbounded, None))
        }
        Command::Profile { name, top } => {
            let program = assemble_file(&name)?;
            if program.has_errors() {
                return Ok(ExitCode::from(1));
            }
            run_profile(&program, top)
        }
        Command::Diff { left, right, limit } => {
            let program_a = assemble_file(&left)?;
            let program_b = assemble_file(&right)?;
            if program_a.has_errors() || program_b.has_errors() {
                return Ok(ExitCode::from(1));
            }
            run_diff(&program_a, &program_b, limit)
        }
    }
}

const SOURCE_EXTENSIONS: &[&str] = &["asm", "a85", "8085"];

/// Load and assemble a file, rendering every diagnostic it produced.
fn assemble_file(name: &Path) -> miette::Result<Program> {
    let known = name
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if !known {
        eprintln!(
            "{:>12} {} does not look like an 8085 source file (.asm, .a85, .8085)",
            "Warning".yellow().bold(),
            name.display()
        );
    }
    let contents = fs::read_to_string(name).into_diagnostic()?;
    println!(
        "{:>12} target {}",
        "Assembling".green().bold(),
        name.display()
    );
    let program = otto::assemble(&contents);
    for report in program.reports() {
        eprintln!("{report:?}");
    }
    if program.has_errors() {
        eprintln!(
            "{:>12} with {} errors",
            "Failed".red().bold(),
            program.error_count()
        );
    }
    Ok(program)
}

fn exit_for(program: &Program) -> ExitCode {
    if program.has_errors() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn resolve_limit(unbounded: bool, limit: Option<u64>) -> Option<u64> {
    if unbounded {
        return None;
    }
    limit.or_else(env::step_limit).or(Some(DEFAULT_STEP_LIMIT))
}

/// Console port convention: IN 00H reads a byte from stdin, OUT 01H writes
/// one to stdout.
struct ConsoleBus;

impl Bus for ConsoleBus {
    fn input(&mut self, port: u8) -> Option<u8> {
        if port != 0x00 {
            return None;
        }
        let mut byte = [0u8; 1];
        match std::io::stdin().read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => Some(0),
        }
    }

    fn output(&mut self, port: u8, value: u8) -> bool {
        if port != 0x01 {
            return false;
        }
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(&[value]);
        let _ = stdout.flush();
        true
    }
}

fn run_program(name: &Path, program: &Program, limit: Option<u64>) -> miette::Result<ExitCode> {
    println!("{:>12} binary", "Running".green().bold());
    let mut cpu = Cpu::new(program);
    let opts = RunOptions {
        limit,
        ..Default::default()
    };
    let outcome = cpu.run(&opts, &mut Monitor::default(), &mut ConsoleBus);

    match outcome.stop {
        StopReason::Halted => {
            println!("{:>12} after {} T-states", "Halted".cyan(), outcome.cycles);
            println!("{}", format_registers(&cpu.snapshot()));
            println!(
                "{:>12} target {}",
                "Completed".green().bold(),
                name.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        StopReason::StepLimit => {
            eprintln!(
                "{:>12} step limit of {} exceeded (use --unsafe to remove it)",
                "Stopped".red().bold(),
                outcome.instructions
            );
            Ok(ExitCode::from(2))
        }
        StopReason::Illegal(op) => {
            eprintln!(
                "{:>12} illegal opcode {} at {}",
                "Stopped".red().bold(),
                isa::hex8(op),
                isa::hex16(cpu.pc)
            );
            Ok(ExitCode::from(2))
        }
        StopReason::Cancelled => Ok(ExitCode::from(130)),
        // No breakpoints or watches are armed on a plain run
        StopReason::Breakpoint(_) | StopReason::WatchHit(_) => unreachable!(),
    }
}

fn run_coverage(program: &Program, limit: Option<u64>) -> miette::Result<ExitCode> {
    let mut cpu = Cpu::new(program);
    let mut monitor = Monitor {
        coverage: Some(Coverage::new()),
        ..Default::default()
    };
    let opts = RunOptions {
        limit,
        ..Default::default()
    };
    let outcome = cpu.run(&opts, &mut monitor, &mut ConsoleBus);
    let coverage = monitor.coverage.as_ref().unwrap();

    println!(
        "{:>12} {:.1}% of instructions over {} steps",
        "Covered".green().bold(),
        coverage.percent_of(program),
        outcome.instructions
    );
    let unhit = coverage.unhit_lines(program);
    if !unhit.is_empty() {
        println!("{:>12} lines {}", "Missed".yellow().bold(), join_lines(&unhit));
    }
    Ok(runtime_exit(outcome.stop))
}

fn run_profile(program: &Program, top: usize) -> miette::Result<ExitCode> {
    let mut cpu = Cpu::new(program);
    let mut monitor = Monitor {
        profile: Some(Profile::new()),
        ..Default::default()
    };
    let outcome = cpu.run(&RunOptions::bounded(), &mut monitor, &mut ConsoleBus);
    let profile = monitor.profile.as_ref().unwrap();

    println!(
        "{:>12} {} T-states across {} instructions",
        "Profiled".green().bold(),
        profile.total_cycles(),
        outcome.instructions
    );
    for (addr, spot) in profile.top_by_cycles(top) {
        let text = isa::disassemble_at(&program.memory, addr)
            .map(|dis| dis.text)
            .unwrap_or_else(|| "??".into());
        let share = spot.cycles as f64 * 100.0 / profile.total_cycles().max(1) as f64;
        println!(
            "{addr:04X}  {text:<14} {:>8} hits {:>10} T ({share:.1}%)",
            spot.hits, spot.cycles
        );
    }
    Ok(runtime_exit(outcome.stop))
}

fn run_diff(program_a: &Program, program_b: &Program, limit: u64) -> miette::Result<ExitCode> {
    let mut cpu_a = Cpu::new(program_a);
    let mut cpu_b = Cpu::new(program_b);
    match first_divergence(&mut cpu_a, &mut cpu_b, limit) {
        None => {
            println!("{:>12} runs are identical", "Matched".green().bold());
            Ok(ExitCode::SUCCESS)
        }
        Some(divergence) => {
            println!(
                "{:>12} at step {}",
                "Diverged".yellow().bold(),
                divergence.step
            );
            for change in divergence.a.changes(&divergence.b) {
                println!(
                    "             {}: {:04X} vs {:04X}",
                    change.name, change.before, change.after
                );
            }
            println!("left : {}", format_registers(&divergence.a));
            println!("right: {}", format_registers(&divergence.b));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn runtime_exit(stop: StopReason) -> ExitCode {
    match stop {
        StopReason::Halted => ExitCode::SUCCESS,
        StopReason::Cancelled => ExitCode::from(130),
        _ => ExitCode::from(2),
    }
}

fn format_registers(snap: &Snapshot) -> String {
    format!(
        "A={:02X} B={:02X} C={:02X} D={:02X} E={:02X} H={:02X} L={:02X} SP={:04X} \
         Flags=S={} Z={} AC={} P={} CY={}",
        snap.a,
        snap.b,
        snap.c,
        snap.d,
        snap.e,
        snap.h,
        snap.l,
        snap.sp,
        (snap.flags >> 7) & 1,
        (snap.flags >> 6) & 1,
        (snap.flags >> 4) & 1,
        (snap.flags >> 2) & 1,
        snap.flags & 1,
    )
}

fn join_lines(lines: &[u32]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Accepts `8000H`, `0x8000`, or decimal.
fn parse_address(text: &str) -> miette::Result<u16> {
    let upper = text.trim().to_ascii_uppercase();
    let parsed = if let Some(hex) = upper.strip_suffix('H') {
        u16::from_str_radix(hex, 16)
    } else if let Some(hex) = upper.strip_prefix("0X") {
        u16::from_str_radix(hex, 16)
    } else {
        upper.parse()
    };
    parsed
        .map_err(|_| miette::miette!("`{text}` is not a valid 16-bit address"))
}
