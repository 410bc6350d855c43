use crate::runtime::{Cpu, NullBus, Snapshot, StepEvent};

/// First point at which two runs disagree.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Divergence {
    /// 1-based step index of the diverging instruction.
    pub step: u64,
    pub a: Snapshot,
    pub b: Snapshot,
}

/// Drive two CPUs in lock step and report the first step after which their
/// register files differ. Returns `None` when both halt (or the limit runs
/// out) still in agreement.
///
/// Both sides run without I/O intercepts so the comparison stays
/// deterministic.
pub fn first_divergence(a: &mut Cpu, b: &mut Cpu, limit: u64) -> Option<Divergence> {
    let mut bus = NullBus;
    for step in 1..=limit {
        if a.halted && b.halted {
            return None;
        }
        let result_a = a.step(&mut bus);
        let result_b = b.step(&mut bus);
        if let (StepEvent::Illegal(_), StepEvent::Illegal(_)) =
            (result_a.event, result_b.event)
        {
            // Neither side can make progress
            return None;
        }
        let snap_a = a.snapshot();
        let snap_b = b.snapshot();
        if snap_a != snap_b {
            return Some(Divergence {
                step,
                a: snap_a,
                b: snap_b,
            });
        }
    }
    None
}
