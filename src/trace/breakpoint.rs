/// A set of instruction addresses that stop a `run` before their fetch.
#[derive(Default, Debug)]
pub struct Breakpoints(Vec<u16>);

impl Breakpoints {
    pub fn contains(&self, address: u16) -> bool {
        self.0.contains(&address)
    }

    pub fn insert(&mut self, address: u16) {
        if !self.contains(address) {
            self.0.push(address);
        }
    }

    /// Returns whether a breakpoint existed at the address.
    pub fn remove(&mut self, address: u16) -> bool {
        let initial_len = self.0.len();
        self.0.retain(|bp| *bp != address);
        initial_len != self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<u16>> for Breakpoints {
    fn from(vec: Vec<u16>) -> Self {
        let mut set = Breakpoints::default();
        for address in vec {
            set.insert(address);
        }
        set
    }
}
