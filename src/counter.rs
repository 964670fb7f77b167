/// Row count of the most recent buffered fetch or update.
///
/// Only meaningful right after one of those operations. Single-row fetches
/// reset it without counting, and ad-hoc queries leave it alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchedRowCounter {
    value: u64,
}

impl FetchedRowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }

    pub fn increment(&mut self) {
        self.value += 1;
    }

    pub fn set(&mut self, value: u64) {
        self.value = value;
    }

    pub fn get(&self) -> u64 {
        self.value
    }
}
