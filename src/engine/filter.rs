//! Per-axis debouncing of raw readings.
//!
//! Two independent layers, applied in order:
//!
//! 1. sensitivity squelch against sensor jitter, on the raw value;
//! 2. deadzone clamp, then duplicate suppression on the clamped value.
//!
//! The duplicate layer exists because the deadzone alone would re-emit the
//! same zero for every jittering near-center reading.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct FilterState {
    last_raw_value: Option<i16>,
    last_emitted_value: Option<i16>,
}

/// Debounce pipeline for all axis controls. Button events bypass it.
#[derive(Debug)]
pub struct AxisFilter {
    deadzone: i16,
    sensitivity: i16,
    states: HashMap<u8, FilterState>,
}

impl AxisFilter {
    pub fn new(deadzone: i16, sensitivity: i16) -> Self {
        Self {
            deadzone,
            sensitivity,
            states: HashMap::new(),
        }
    }

    /// Runs one raw axis value through the pipeline. Returns the value to
    /// forward, or `None` when the reading is squelched.
    pub fn filter(&mut self, control_index: u8, value: i16) -> Option<i16> {
        let state = self.states.entry(control_index).or_default();

        if let Some(last_raw) = state.last_raw_value {
            if self.sensitivity > 0
                && (value as i32 - last_raw as i32).unsigned_abs() < self.sensitivity as u32
                && value != 0
            {
                return None;
            }
        }
        state.last_raw_value = Some(value);

        let mut value = value;
        if self.deadzone > 0 && value.unsigned_abs() < self.deadzone as u16 {
            value = 0;
        }

        if state.last_emitted_value == Some(value) {
            return None;
        }
        state.last_emitted_value = Some(value);
        Some(value)
    }
}
