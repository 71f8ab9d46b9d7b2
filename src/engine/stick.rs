//! Current state of one continuous axis.

/// Latest filtered reading of a stick axis. The periodic jog evaluator reads
/// this independently of the event path.
#[derive(Debug, Clone, Copy, Default)]
pub struct StickState {
    value: i16,
}

impl StickState {
    pub fn set(&mut self, value: i16) {
        self.value = value;
    }

    pub fn value(&self) -> i16 {
        self.value
    }

    pub fn active(&self) -> bool {
        self.value != 0
    }

    /// -1.0 or 1.0 depending on deflection direction; 0.0 at rest.
    pub fn sign(&self) -> f64 {
        match self.value {
            0 => 0.0,
            v if v > 0 => 1.0,
            _ => -1.0,
        }
    }
}
