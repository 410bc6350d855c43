use fxhash::FxHashMap;

/// Execution weight of one instruction address.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct HotSpot {
    pub hits: u64,
    pub cycles: u64,
}

/// Per-address execution counters for hot-spot reporting.
#[derive(Default, Debug)]
pub struct Profile {
    counters: FxHashMap<u16, HotSpot>,
    total_cycles: u64,
}

impl Profile {
    pub fn new() -> Profile {
        Profile::default()
    }

    pub fn record(&mut self, pc: u16, cycles: u8) {
        let spot = self.counters.entry(pc).or_default();
        spot.hits += 1;
        spot.cycles += cycles as u64;
        self.total_cycles += cycles as u64;
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn get(&self, pc: u16) -> HotSpot {
        self.counters.get(&pc).copied().unwrap_or_default()
    }

    pub fn top_by_cycles(&self, n: usize) -> Vec<(u16, HotSpot)> {
        self.top_by(n, |spot| spot.cycles)
    }

    pub fn top_by_hits(&self, n: usize) -> Vec<(u16, HotSpot)> {
        self.top_by(n, |spot| spot.hits)
    }

    fn top_by(&self, n: usize, key: impl Fn(&HotSpot) -> u64) -> Vec<(u16, HotSpot)> {
        let mut spots: Vec<(u16, HotSpot)> =
            self.counters.iter().map(|(pc, spot)| (*pc, *spot)).collect();
        spots.sort_by(|a, b| key(&b.1).cmp(&key(&a.1)).then(a.0.cmp(&b.0)));
        spots.truncate(n);
        spots
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ranks_by_cycles_then_address() {
        let mut profile = Profile::new();
        for _ in 0..10 {
            profile.record(0x0100, 4);
        }
        profile.record(0x0200, 18);
        profile.record(0x0300, 18);

        let top = profile.top_by_cycles(2);
        assert_eq!(top[0].0, 0x0100);
        assert_eq!(top[0].1.cycles, 40);
        assert_eq!(top[1].0, 0x0200, "ties break on address");
        assert_eq!(profile.total_cycles(), 76);

        let top = profile.top_by_hits(1);
        assert_eq!(top[0].0, 0x0100);
        assert_eq!(top[0].1.hits, 10);
    }
}
