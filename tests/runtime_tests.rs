use otto::runtime::{Cpu, NullBus, RunOptions, StopReason};
use otto::trace::{Coverage, Monitor, Profile, Watch};
use otto::{assemble, Program};

fn program(src: &str) -> Program {
    let program = assemble(src);
    assert!(
        !program.has_errors(),
        "unexpected diagnostics: {:?}",
        program.diagnostics
    );
    program
}

fn run_to_halt(src: &str) -> (Cpu, Monitor) {
    let program = program(src);
    let mut cpu = Cpu::new(&program);
    let mut monitor = Monitor {
        coverage: Some(Coverage::new()),
        profile: Some(Profile::new()),
        ..Default::default()
    };
    let outcome = cpu.run(&RunOptions::bounded(), &mut monitor, &mut NullBus);
    assert_eq!(outcome.stop, StopReason::Halted);
    (cpu, monitor)
}

#[test]
fn arithmetic_scenario() {
    let (cpu, _) = run_to_halt("MVI A,05H\nMVI B,03H\nADD B\nHLT\n");
    assert_eq!(cpu.a, 0x08);
    assert_eq!(cpu.b, 0x03);
    assert!(!cpu.flags.cy);
    assert!(!cpu.flags.z);
    assert!(cpu.halted);
    assert_eq!(cpu.cycles, 25);
}

#[test]
fn conditional_jump_not_taken_scenario() {
    let (cpu, _) = run_to_halt("ORG 0000H\nMVI A,01H\nCPI 01H\nJNZ 1000H\nHLT\n");
    assert!(cpu.flags.z);
    // JNZ contributed its not-taken cost of 7 T-states
    assert_eq!(cpu.cycles, 7 + 7 + 7 + 7);
}

#[test]
fn memory_indirect_scenario() {
    let (cpu, _) = run_to_halt("LXI H,2000H\nMVI M,42H\nMOV A,M\nHLT\n");
    assert_eq!(cpu.memory()[0x2000], 0x42);
    assert_eq!(cpu.a, 0x42);
}

#[test]
fn stack_scenario() {
    let (cpu, _) = run_to_halt(
        "LXI SP,0FFFFH\nLXI H,1234H\nPUSH H\nLXI H,0000H\nPOP H\nHLT\n",
    );
    assert_eq!(cpu.h, 0x12);
    assert_eq!(cpu.l, 0x34);
    assert_eq!(cpu.sp, 0xFFFF);
    assert_eq!(cpu.memory()[0xFFFE], 0x34);
    assert_eq!(cpu.memory()[0xFFFD], 0x12);
}

/// Every conditional jump charges 10 T-states taken, 7 not taken.
#[test]
fn conditional_branch_timing_matches_table() {
    let jumps: &[(&str, fn(&mut Cpu), fn(&mut Cpu))] = &[
        ("JNZ", |c| c.flags.z = false, |c| c.flags.z = true),
        ("JZ", |c| c.flags.z = true, |c| c.flags.z = false),
        ("JNC", |c| c.flags.cy = false, |c| c.flags.cy = true),
        ("JC", |c| c.flags.cy = true, |c| c.flags.cy = false),
        ("JPO", |c| c.flags.p = false, |c| c.flags.p = true),
        ("JPE", |c| c.flags.p = true, |c| c.flags.p = false),
        ("JP", |c| c.flags.s = false, |c| c.flags.s = true),
        ("JM", |c| c.flags.s = true, |c| c.flags.s = false),
    ];

    for (mnemonic, make_taken, make_not_taken) in jumps {
        let prog = program(&format!("{mnemonic} 1000H\nHLT\n"));

        let mut cpu = Cpu::new(&prog);
        make_taken(&mut cpu);
        let result = cpu.step(&mut NullBus);
        assert_eq!(result.branch_taken, Some(true), "{mnemonic} taken");
        assert_eq!(result.cycles, 10, "{mnemonic} taken");
        assert_eq!(cpu.pc, 0x1000, "{mnemonic} taken");

        let mut cpu = Cpu::new(&prog);
        make_not_taken(&mut cpu);
        let result = cpu.step(&mut NullBus);
        assert_eq!(result.branch_taken, Some(false), "{mnemonic} not taken");
        assert_eq!(result.cycles, 7, "{mnemonic} not taken");
        assert_eq!(cpu.pc, 0x0003, "{mnemonic} not taken");
    }
}

#[test]
fn conditional_call_and_return_timing() {
    let prog = program("LXI SP,0FFFFH\nCZ 000AH\nHLT\n");
    let mut cpu = Cpu::new(&prog);
    cpu.step(&mut NullBus);
    cpu.flags.z = true;
    let result = cpu.step(&mut NullBus);
    assert_eq!(result.cycles, 18);
    assert_eq!(cpu.pc, 0x000A);

    let prog = program("LXI SP,0FFFFH\nRNZ\nHLT\n");
    let mut cpu = Cpu::new(&prog);
    cpu.step(&mut NullBus);
    cpu.flags.z = true;
    let result = cpu.step(&mut NullBus);
    assert_eq!(result.branch_taken, Some(false));
    assert_eq!(result.cycles, 6);
}

/// Exhaustive ADD flag algebra against the reference formulas.
#[test]
fn add_flags_match_reference_for_all_inputs() {
    let prog = program("ADD B\nHLT\n");
    for x in (0u16..=0xFF).step_by(7) {
        for y in (0u16..=0xFF).step_by(5) {
            let mut cpu = Cpu::new(&prog);
            cpu.a = x as u8;
            cpu.b = y as u8;
            cpu.step(&mut NullBus);

            let sum = x + y;
            let result = (sum & 0xFF) as u8;
            assert_eq!(cpu.a, result);
            assert_eq!(cpu.flags.z, result == 0, "Z for {x}+{y}");
            assert_eq!(cpu.flags.cy, sum > 0xFF, "CY for {x}+{y}");
            assert_eq!(
                cpu.flags.ac,
                (x & 0xF) + (y & 0xF) > 0xF,
                "AC for {x}+{y}"
            );
            assert_eq!(
                cpu.flags.p,
                result.count_ones() % 2 == 0,
                "P for {x}+{y}"
            );
            assert_eq!(cpu.flags.s, result & 0x80 != 0, "S for {x}+{y}");
        }
    }
}

/// PUSH then POP restores the pair and SP exactly, for every pair.
#[test]
fn push_pop_round_trips_every_pair() {
    for (push, pop) in [("B", "B"), ("D", "D"), ("H", "H"), ("PSW", "PSW")] {
        let prog = program(&format!("LXI SP,0F000H\nPUSH {push}\nPOP {pop}\nHLT\n"));
        let mut cpu = Cpu::new(&prog);
        cpu.a = 0xA5;
        cpu.b = 0x12;
        cpu.c = 0x34;
        cpu.d = 0x56;
        cpu.e = 0x78;
        cpu.h = 0x9A;
        cpu.l = 0xBC;
        cpu.flags.cy = true;
        cpu.flags.s = true;
        let before = cpu.snapshot();

        let outcome = cpu.run(&RunOptions::bounded(), &mut Monitor::default(), &mut NullBus);
        assert_eq!(outcome.stop, StopReason::Halted);
        let after = cpu.snapshot();
        assert_eq!(after.sp, 0xF000, "SP restored for {push}");
        assert_eq!((after.a, after.flags), (before.a, before.flags));
        assert_eq!(
            (after.b, after.c, after.d, after.e, after.h, after.l),
            (before.b, before.c, before.d, before.e, before.h, before.l),
            "registers restored for {push}"
        );
    }
}

#[test]
fn coverage_matches_instructions_executed() {
    let (cpu, monitor) = run_to_halt(
        "MVI B,3\nLOOP: DCR B\nJNZ LOOP\nHLT\n",
    );
    let coverage = monitor.coverage.unwrap();
    assert_eq!(coverage.fetches(), cpu.instructions);
    // Loop body addresses were fetched, and only those
    for addr in [0x0000u16, 0x0002, 0x0003, 0x0006] {
        assert!(coverage.is_hit(addr), "{addr:04X} should be covered");
    }
    assert!(!coverage.is_hit(0x0007));
}

#[test]
fn profiler_attributes_loop_cycles() {
    let (_, monitor) = run_to_halt("MVI B,10\nLOOP: DCR B\nJNZ LOOP\nHLT\n");
    let profile = monitor.profile.unwrap();
    // DCR at 0x0002 ran 10 times at 4 T-states each
    assert_eq!(profile.get(0x0002).hits, 10);
    assert_eq!(profile.get(0x0002).cycles, 40);
    // The jump is the hottest spot: 9 taken at 10 + 1 fall-through at 7
    let top = profile.top_by_cycles(1);
    assert_eq!(top[0].0, 0x0003);
    assert_eq!(top[0].1.cycles, 9 * 10 + 7);
}

#[test]
fn breakpoint_stops_before_fetch_and_resumes() {
    let prog = program("MVI A,1\nMVI B,2\nHLT\n");
    let mut cpu = Cpu::new(&prog);
    let mut monitor = Monitor::default();
    monitor.breakpoints.insert(0x0002);

    let outcome = cpu.run(&RunOptions::bounded(), &mut monitor, &mut NullBus);
    assert_eq!(outcome.stop, StopReason::Breakpoint(0x0002));
    assert_eq!(cpu.a, 1);
    assert_eq!(cpu.b, 0, "stopped before the breakpointed instruction ran");

    let opts = RunOptions {
        resume: true,
        ..RunOptions::bounded()
    };
    let outcome = cpu.run(&opts, &mut monitor, &mut NullBus);
    assert_eq!(outcome.stop, StopReason::Halted);
    assert_eq!(cpu.b, 2);
}

#[test]
fn watch_hit_reports_changed_address() {
    let prog = program("LXI H,2000H\nMVI M,7\nMVI M,7\nMVI A,1\nHLT\n");
    let mut cpu = Cpu::new(&prog);
    let mut monitor = Monitor::default();
    monitor.watches.watch(Watch::new(0x2000, 0x20FF));

    let outcome = cpu.run(&RunOptions::bounded(), &mut monitor, &mut NullBus);
    assert_eq!(outcome.stop, StopReason::WatchHit(0x2000));
    assert_eq!(cpu.memory()[0x2000], 7);

    // Rewriting the same value is not a change; the run reaches HLT
    let outcome = cpu.run(&RunOptions::bounded(), &mut monitor, &mut NullBus);
    assert_eq!(outcome.stop, StopReason::Halted);
    assert_eq!(cpu.a, 1);
}

#[test]
fn cancellation_bounds_executed_instructions() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let prog = program("SPIN: NOP\nJMP SPIN\n");
    let mut cpu = Cpu::new(&prog);
    let cancel = AtomicBool::new(false);

    // Run a bounded chunk, then cancel before the next one
    let opts = RunOptions {
        limit: Some(5),
        cancel: Some(&cancel),
        resume: false,
    };
    let outcome = cpu.run(&opts, &mut Monitor::default(), &mut NullBus);
    assert_eq!(outcome.stop, StopReason::StepLimit);
    assert_eq!(outcome.instructions, 5);

    cancel.store(true, Ordering::Relaxed);
    let pc_before = cpu.pc;
    let outcome = cpu.run(&opts, &mut Monitor::default(), &mut NullBus);
    assert_eq!(outcome.stop, StopReason::Cancelled);
    assert_eq!(outcome.instructions, 0);
    assert_eq!(cpu.pc, pc_before, "PC still at the unexecuted instruction");
}

#[test]
fn hooks_do_not_change_behaviour() {
    let src = "MVI B,5\nLOOP: DCR B\nJNZ LOOP\nHLT\n";
    let (bare_cpu, _) = {
        let prog = program(src);
        let mut cpu = Cpu::new(&prog);
        let outcome = cpu.run(&RunOptions::bounded(), &mut Monitor::default(), &mut NullBus);
        assert_eq!(outcome.stop, StopReason::Halted);
        (cpu, ())
    };
    let (hooked_cpu, _) = run_to_halt(src);
    assert_eq!(bare_cpu.snapshot(), hooked_cpu.snapshot());
    assert_eq!(bare_cpu.cycles, hooked_cpu.cycles);
}
