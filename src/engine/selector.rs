//! Bounded selection over an ordered option list.

/// Cursor over a fixed option list; `increase`/`decrease` saturate at the
/// bounds instead of wrapping.
#[derive(Debug, Clone)]
pub struct Selector<T> {
    index: usize,
    options: Vec<T>,
}

impl<T: Copy> Selector<T> {
    /// Builds a selector starting at `initial_index` (clamped into range).
    /// `options` must be non-empty.
    pub fn new(options: Vec<T>, initial_index: usize) -> Self {
        debug_assert!(!options.is_empty());
        let index = initial_index.min(options.len() - 1);
        Self { index, options }
    }

    pub fn increase(&mut self) {
        if self.index + 1 < self.options.len() {
            self.index += 1;
        }
    }

    pub fn decrease(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    pub fn get(&self) -> T {
        self.options[self.index]
    }
}
