//! Jog command construction and the single-in-flight throttle.
//!
//! Continuous jogs are re-planned every tick from current stick state. The
//! per-tick travel distance is `(feedrate / 60) * tick_seconds * 1.2`; the
//! 1.2 factor budgets acceleration overhead so the controller never starves
//! between ticks. When several axes are active the lowest-feedrate axis
//! dominates, so no single axis is driven past its capability.

use crate::engine::stick::StickState;
use std::time::Duration;
use tokio::time::Instant;

/// Distance used for long-press sustained moves; release sends the cancel
/// long before this is reached.
pub const LONG_JOG_DISTANCE: f64 = 999.0;

/// At-most-one-in-flight discipline for jog commands, per output channel.
/// Cleared by an acknowledgement or by the timeout, whichever comes first.
#[derive(Debug)]
pub struct JogSession {
    in_flight: bool,
    issued_at: Option<Instant>,
    timeout: Duration,
}

impl JogSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            in_flight: false,
            issued_at: None,
            timeout,
        }
    }

    /// Claims the channel for one jog command. Returns `false` while an
    /// earlier command is still in flight; the timeout is checked lazily
    /// here, so an expired flight frees the channel on the next attempt.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.in_flight {
            match self.issued_at {
                Some(issued_at) if now.duration_since(issued_at) >= self.timeout => {
                    self.clear();
                }
                _ => return false,
            }
        }
        self.in_flight = true;
        self.issued_at = Some(now);
        true
    }

    /// Clears the flag on an `ok`/`error` acknowledgement.
    pub fn acknowledge(&mut self) {
        self.clear();
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    fn clear(&mut self) {
        self.in_flight = false;
        self.issued_at = None;
    }
}

/// One planned relative move: per-axis signed distances plus the feedrate.
#[derive(Debug, Clone, PartialEq)]
pub struct JogPlan {
    pub moves: Vec<(char, f64)>,
    pub feedrate: f64,
}

impl JogPlan {
    /// Relative single-axis step (short press: selected distance; long
    /// press: [`LONG_JOG_DISTANCE`]).
    pub fn step(axis: char, distance: f64, feedrate: f64) -> Self {
        Self {
            moves: vec![(axis, distance)],
            feedrate,
        }
    }

    /// Renders the relative-move line: only active axes appear, the
    /// feedrate comes last.
    pub fn to_gcode(&self) -> String {
        let mut line = String::from("G91 G0");
        for (axis, distance) in &self.moves {
            line.push_str(&format!(" {}{:.3}", axis, distance));
        }
        line.push_str(&format!(" F{:.2}", self.feedrate));
        line
    }
}

/// Plans the continuous jog for one tick from current stick values, or
/// `None` when every stick is at rest.
pub fn plan_continuous(
    x: StickState,
    y: StickState,
    z: StickState,
    axis_max: i16,
    max_jog_feedrate: f64,
    tick: Duration,
) -> Option<JogPlan> {
    let axis_feed =
        |stick: StickState| (stick.value() as f64 / axis_max as f64 * max_jog_feedrate).abs();

    let planar_feed = if x.active() || y.active() {
        axis_feed(x).hypot(axis_feed(y))
    } else {
        0.0
    };

    let feedrate = if z.active() {
        let depth_feed = axis_feed(z);
        if planar_feed > 0.0 {
            planar_feed.min(depth_feed)
        } else {
            depth_feed
        }
    } else if planar_feed > 0.0 {
        planar_feed
    } else {
        return None;
    };

    let distance = feedrate / 60.0 * tick.as_secs_f64() * 1.2;

    let mut moves = Vec::new();
    if x.active() {
        moves.push(('X', distance * x.sign()));
    }
    if y.active() {
        moves.push(('Y', distance * y.sign()));
    }
    if z.active() {
        moves.push(('Z', distance * z.sign()));
    }

    Some(JogPlan { moves, feedrate })
}

/// Maps the spindle trigger linearly into the configured speed range.
/// Negative deflection counts as zero.
pub fn spindle_speed(value: i16, axis_max: i16, range: [f64; 2]) -> f64 {
    let ratio = (value.max(0) as f64 / axis_max as f64).clamp(0.0, 1.0);
    range[0] + (range[1] - range[0]) * ratio
}
