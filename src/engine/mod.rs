//! Pendant engine: dispatch, gesture handling, jog planning.
//!
//! One task owns every piece of mutable control state and processes, in
//! arrival order: decoded device events, acknowledgement lines from the
//! command channel, the periodic jog/spindle ticks and gesture deadlines.
//!
//! ```text
//! RawEvent ──► Filter ──► Dispatch ──► {Gesture SM | Selector | StickState}
//!                                             │
//!                         ticks ──────────────┴──► JogSession ──► Channel
//! ```

pub mod filter;
pub mod gesture;
pub mod jog;
pub mod selector;
pub mod stick;

use crate::channel::{ChannelRequest, JOG_CANCEL};
use crate::config::PendantConfig;
use crate::device::decoder::{EventKind, RawEvent};
use crate::engine::filter::AxisFilter;
use crate::engine::gesture::{ButtonGesture, GestureEvent};
use crate::engine::jog::{plan_continuous, spindle_speed, JogPlan, JogSession, LONG_JOG_DISTANCE};
use crate::engine::selector::Selector;
use crate::engine::stick::StickState;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant};
use tracing::{debug, info, warn};

/// Closed set of known buttons, standard gamepad numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Back,
    Start,
    Guide,
}

impl ButtonId {
    fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::X),
            3 => Some(Self::Y),
            4 => Some(Self::LeftBumper),
            5 => Some(Self::RightBumper),
            6 => Some(Self::Back),
            7 => Some(Self::Start),
            8 => Some(Self::Guide),
            _ => None,
        }
    }
}

/// Closed set of known axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisId {
    LeftStickX,
    LeftStickY,
    RightStickY,
    RightTrigger,
    PadX,
    PadY,
}

impl AxisId {
    fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::LeftStickX),
            1 => Some(Self::LeftStickY),
            3 => Some(Self::RightStickY),
            5 => Some(Self::RightTrigger),
            6 => Some(Self::PadX),
            7 => Some(Self::PadY),
            _ => None,
        }
    }
}

/// Gesture-driven step-jog sources: two gated buttons plus the four pad
/// deflection edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureId {
    ZDown,
    ZUp,
    PadLeft,
    PadRight,
    PadUp,
    PadDown,
}

impl GestureId {
    const ALL: [GestureId; 6] = [
        Self::ZDown,
        Self::ZUp,
        Self::PadLeft,
        Self::PadRight,
        Self::PadUp,
        Self::PadDown,
    ];

    /// Machine axis letter and jog direction this gesture drives.
    fn motion(self) -> (char, f64) {
        match self {
            Self::ZDown => ('Z', -1.0),
            Self::ZUp => ('Z', 1.0),
            Self::PadLeft => ('X', -1.0),
            Self::PadRight => ('X', 1.0),
            Self::PadUp => ('Y', 1.0),
            Self::PadDown => ('Y', -1.0),
        }
    }
}

/// Owns all per-control state; see the module docs for the data flow.
pub struct PendantEngine {
    axis_max: i16,
    max_jog_feedrate: f64,
    spindle_speed_range: [f64; 2],
    jog_tick: Duration,
    spindle_tick: Duration,

    filter: AxisFilter,
    gestures: [ButtonGesture; 6],

    stick_x: StickState,
    stick_y: StickState,
    stick_z: StickState,
    spindle_input: i16,

    deadman_held: bool,
    spindle_modifier_held: bool,
    spindle_on: bool,

    step_distance: Selector<f64>,
    step_feedrate: Selector<f64>,

    session: JogSession,
    request_sender: mpsc::Sender<ChannelRequest>,
}

impl PendantEngine {
    pub fn new(config: &PendantConfig, request_sender: mpsc::Sender<ChannelRequest>) -> Self {
        let press_timeout = Duration::from_millis(config.press_timeout_ms);
        Self {
            axis_max: config.axis_max,
            max_jog_feedrate: config.max_jog_feedrate,
            spindle_speed_range: config.spindle_speed_range,
            jog_tick: Duration::from_millis(config.jog_tick_ms),
            spindle_tick: Duration::from_millis(config.spindle_tick_ms),
            filter: AxisFilter::new(config.deadzone, config.sensitivity),
            gestures: std::array::from_fn(|_| ButtonGesture::new(press_timeout)),
            stick_x: StickState::default(),
            stick_y: StickState::default(),
            stick_z: StickState::default(),
            spindle_input: 0,
            deadman_held: false,
            spindle_modifier_held: false,
            spindle_on: false,
            step_distance: Selector::new(config.step_distances.clone(), 0),
            step_feedrate: Selector::new(config.step_feedrates.clone(), 0),
            session: JogSession::new(Duration::from_millis(config.jog_in_flight_timeout_ms)),
            request_sender,
        }
    }

    /// Runs until the device and channel tasks are gone.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RawEvent>,
        mut acks: mpsc::Receiver<String>,
    ) {
        let mut jog_tick = interval(self.jog_tick);
        let mut spindle_tick = interval(self.spindle_tick);
        info!(
            "Engine running: jog tick {:?}, spindle tick {:?}",
            self.jog_tick, self.spindle_tick
        );

        loop {
            let deadline = self.next_gesture_deadline();
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => {
                        info!("Device event channel closed, stopping engine");
                        return;
                    }
                },
                line = acks.recv() => match line {
                    Some(line) => self.handle_ack(&line),
                    None => {
                        info!("Acknowledgement channel closed, stopping engine");
                        return;
                    }
                },
                _ = jog_tick.tick() => self.evaluate_continuous_jog(Instant::now()),
                _ = spindle_tick.tick() => self.evaluate_spindle(),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_gesture_deadlines(Instant::now());
                }
            }
        }
    }

    /// Dispatches one decoded device event.
    fn handle_event(&mut self, event: RawEvent, now: Instant) {
        if event.is_init {
            debug!(
                "Device reports {:?} control {} (value {})",
                event.kind, event.control_index, event.value
            );
            return;
        }

        match event.kind {
            EventKind::Button => match ButtonId::from_index(event.control_index) {
                Some(id) => self.handle_button(id, event.value != 0, now),
                None => debug!("Unknown button control {}, dropped", event.control_index),
            },
            EventKind::Axis => {
                let Some(value) = self.filter.filter(event.control_index, event.value) else {
                    return;
                };
                match AxisId::from_index(event.control_index) {
                    Some(id) => self.handle_axis(id, value, now),
                    None => debug!("Unknown axis control {}, dropped", event.control_index),
                }
            }
            EventKind::Unknown => {
                debug!("Unclassified control {}, dropped", event.control_index)
            }
        }
    }

    fn handle_button(&mut self, id: ButtonId, pressed: bool, now: Instant) {
        debug!("Button {:?} {}", id, if pressed { "pressed" } else { "released" });
        match id {
            ButtonId::LeftBumper => {
                self.deadman_held = pressed;
                if !pressed {
                    self.release_deadman();
                }
            }
            ButtonId::RightBumper => {
                self.spindle_modifier_held = pressed;
                if !pressed {
                    self.spindle_off_edge();
                }
            }
            ButtonId::A => self.gated_gesture(GestureId::ZDown, pressed, now),
            ButtonId::Y => self.gated_gesture(GestureId::ZUp, pressed, now),
            ButtonId::Start if pressed => self.send_command("cyclestart", Vec::new()),
            ButtonId::Back if pressed => self.send_command("feedhold", Vec::new()),
            ButtonId::Guide if pressed => self.send_command("homing", Vec::new()),
            ButtonId::B if pressed => self.send_command("reset", Vec::new()),
            ButtonId::X if pressed => self.send_command("unlock", Vec::new()),
            _ => {}
        }
    }

    fn handle_axis(&mut self, id: AxisId, value: i16, now: Instant) {
        match id {
            AxisId::LeftStickX => self.stick_x.set(value),
            AxisId::LeftStickY => self.stick_y.set(value),
            AxisId::RightStickY => self.stick_z.set(value),
            AxisId::RightTrigger => self.spindle_input = value,
            AxisId::PadX => self.pad_edge(GestureId::PadRight, GestureId::PadLeft, value, now),
            AxisId::PadY => self.pad_edge(GestureId::PadUp, GestureId::PadDown, value, now),
        }
    }

    /// Pad deflection: gated gestures while the deadman is held, selector
    /// steps otherwise.
    fn pad_edge(&mut self, plus: GestureId, minus: GestureId, value: i16, now: Instant) {
        if self.deadman_held {
            if value > 0 {
                self.gated_gesture(minus, false, now);
                self.gated_gesture(plus, true, now);
            } else if value < 0 {
                self.gated_gesture(plus, false, now);
                self.gated_gesture(minus, true, now);
            } else {
                self.gated_gesture(plus, false, now);
                self.gated_gesture(minus, false, now);
            }
            return;
        }

        if value == 0 {
            return;
        }
        if plus == GestureId::PadRight {
            if value > 0 {
                self.step_distance.increase();
            } else {
                self.step_distance.decrease();
            }
            info!("Step distance: {}", self.step_distance.get());
        } else {
            if value > 0 {
                self.step_feedrate.increase();
            } else {
                self.step_feedrate.decrease();
            }
            info!("Step feedrate: {}", self.step_feedrate.get());
        }
    }

    /// Press is gated on the deadman; release always reaches the machine so
    /// a gesture begun under the deadman can still finish.
    fn gated_gesture(&mut self, id: GestureId, pressed: bool, now: Instant) {
        if pressed {
            if self.deadman_held {
                self.gestures[id as usize].press(now);
            }
        } else if let Some(event) = self.gestures[id as usize].release() {
            self.gesture_event(id, event, now);
        }
    }

    fn gesture_event(&mut self, id: GestureId, event: GestureEvent, now: Instant) {
        let (axis, direction) = id.motion();
        debug!("Gesture {:?} on {:?}", event, id);
        match event {
            GestureEvent::ShortPress => {
                let plan = JogPlan::step(
                    axis,
                    direction * self.step_distance.get(),
                    self.step_feedrate.get(),
                );
                self.send_jog(plan, now);
            }
            GestureEvent::LongPress => {
                let plan = JogPlan::step(
                    axis,
                    direction * LONG_JOG_DISTANCE,
                    self.step_feedrate.get(),
                );
                self.send_jog(plan, now);
            }
            GestureEvent::LongCancel => self.send_jog_cancel(),
        }
    }

    /// Deadman released: reset all gated gestures without their callbacks
    /// and cancel whatever motion is running. The cancel is edge-triggered
    /// and never throttled.
    fn release_deadman(&mut self) {
        for id in GestureId::ALL {
            self.gestures[id as usize].reset();
        }
        self.send_jog_cancel();
        self.spindle_off_edge();
    }

    /// Continuous-jog evaluator, driven by the fast tick.
    fn evaluate_continuous_jog(&mut self, now: Instant) {
        if !self.deadman_held {
            return;
        }
        let plan = plan_continuous(
            self.stick_x,
            self.stick_y,
            self.stick_z,
            self.axis_max,
            self.max_jog_feedrate,
            self.jog_tick,
        );
        if let Some(plan) = plan {
            self.send_jog(plan, now);
        }
    }

    /// Spindle evaluator, driven by the slow tick.
    fn evaluate_spindle(&mut self) {
        if self.deadman_held && self.spindle_modifier_held {
            let speed = spindle_speed(self.spindle_input, self.axis_max, self.spindle_speed_range);
            self.spindle_on = true;
            self.send_command("gcode", vec![format!("M3 S{:.0}", speed)]);
        } else {
            self.spindle_off_edge();
        }
    }

    /// Spindle-off fires exactly once per on-phase.
    fn spindle_off_edge(&mut self) {
        if self.spindle_on && !(self.deadman_held && self.spindle_modifier_held) {
            self.spindle_on = false;
            self.send_command("gcode", vec!["M5".to_string()]);
        }
    }

    /// Clears the in-flight jog on `ok`/`error`; anything else is logged as
    /// unhandled and left to the timeout fallback.
    fn handle_ack(&mut self, line: &str) {
        if line.contains("error") {
            warn!("Channel reported: {}", line);
            self.session.acknowledge();
        } else if line.contains("ok") {
            debug!("Channel acknowledged: {}", line);
            self.session.acknowledge();
        } else {
            info!("Unhandled channel message: {}", line);
        }
    }

    fn next_gesture_deadline(&self) -> Option<Instant> {
        self.gestures.iter().filter_map(|g| g.deadline()).min()
    }

    fn fire_gesture_deadlines(&mut self, now: Instant) {
        for id in GestureId::ALL {
            if let Some(event) = self.gestures[id as usize].fire_deadline(now) {
                self.gesture_event(id, event, now);
            }
        }
    }

    /// Sends one jog command under the single-in-flight discipline.
    fn send_jog(&mut self, plan: JogPlan, now: Instant) {
        if !self.session.try_acquire(now) {
            debug!("Jog still in flight, skipping");
            return;
        }
        self.send_command("gcode", vec![plan.to_gcode()]);
    }

    fn send_jog_cancel(&mut self) {
        debug!("Sending jog cancel");
        self.send_raw(JOG_CANCEL.to_vec());
    }

    fn send_command(&mut self, name: &str, args: Vec<String>) {
        let request = ChannelRequest::Command {
            name: name.to_string(),
            args,
        };
        if let Err(e) = self.request_sender.try_send(request) {
            warn!("Failed to queue command for channel: {}", e);
        }
    }

    fn send_raw(&mut self, bytes: Vec<u8>) {
        if let Err(e) = self.request_sender.try_send(ChannelRequest::WriteRaw(bytes)) {
            warn!("Failed to queue raw write for channel: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEADMAN: u8 = 4;
    const SPINDLE_MOD: u8 = 5;
    const BUTTON_A: u8 = 0;
    const AXIS_X: u8 = 0;
    const AXIS_TRIGGER: u8 = 5;
    const AXIS_PAD_X: u8 = 6;

    fn engine() -> (PendantEngine, mpsc::Receiver<ChannelRequest>) {
        let (tx, rx) = mpsc::channel(32);
        (PendantEngine::new(&PendantConfig::default(), tx), rx)
    }

    fn axis(index: u8, value: i16) -> RawEvent {
        RawEvent {
            timestamp: 0,
            value,
            control_index: index,
            kind: EventKind::Axis,
            is_init: false,
        }
    }

    fn button(index: u8, pressed: bool) -> RawEvent {
        RawEvent {
            timestamp: 0,
            value: pressed as i16,
            control_index: index,
            kind: EventKind::Button,
            is_init: false,
        }
    }

    fn gcode_of(request: ChannelRequest) -> String {
        match request {
            ChannelRequest::Command { name, mut args } => {
                assert_eq!(name, "gcode");
                args.remove(0)
            }
            other => panic!("expected gcode command, got {:?}", other),
        }
    }

    #[test]
    fn init_records_do_not_reach_the_filter_and_squelch_holds() {
        let (mut engine, _rx) = engine();
        let now = Instant::now();

        let mut init = axis(AXIS_X, 0);
        init.is_init = true;
        engine.handle_event(init, now);
        engine.handle_event(axis(AXIS_X, 20000), now);
        engine.handle_event(axis(AXIS_X, 20050), now);

        // Delta 50 < sensitivity 100: the third record is squelched.
        assert_eq!(engine.stick_x.value(), 20000);
    }

    #[test]
    fn unknown_controls_are_dropped_safely() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        engine.handle_event(button(9, true), now);
        engine.handle_event(axis(4, 30000), now);
        engine.handle_event(
            RawEvent {
                timestamp: 0,
                value: 1,
                control_index: 200,
                kind: EventKind::Unknown,
                is_init: false,
            },
            now,
        );

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn short_press_sends_one_step_jog() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        engine.handle_event(button(DEADMAN, true), now);
        engine.handle_event(button(BUTTON_A, true), now);
        engine.handle_event(button(BUTTON_A, false), now);

        assert_eq!(gcode_of(rx.try_recv().unwrap()), "G91 G0 Z-0.010 F100.00");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn long_press_sends_sustained_jog_then_cancel_on_release() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        engine.handle_event(button(DEADMAN, true), now);
        engine.handle_event(button(BUTTON_A, true), now);
        engine.fire_gesture_deadlines(now + Duration::from_millis(600));
        engine.handle_event(button(BUTTON_A, false), now + Duration::from_millis(900));

        assert_eq!(gcode_of(rx.try_recv().unwrap()), "G91 G0 Z-999.000 F100.00");
        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelRequest::WriteRaw(JOG_CANCEL.to_vec())
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn deadman_release_cancels_without_firing_short_press() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        engine.handle_event(button(DEADMAN, true), now);
        engine.handle_event(button(BUTTON_A, true), now);
        engine.handle_event(button(DEADMAN, false), now);

        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelRequest::WriteRaw(JOG_CANCEL.to_vec())
        );

        // The pending gesture was reset; releasing A emits nothing, and the
        // armed deadline must not fire later either.
        engine.handle_event(button(BUTTON_A, false), now);
        engine.fire_gesture_deadlines(now + Duration::from_secs(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn continuous_jog_is_throttled_until_ack_or_timeout() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        engine.handle_event(button(DEADMAN, true), now);
        engine.handle_event(axis(AXIS_X, 20000), now);

        engine.evaluate_continuous_jog(now);
        assert!(gcode_of(rx.try_recv().unwrap()).starts_with("G91 G0 X"));

        engine.evaluate_continuous_jog(now + Duration::from_millis(75));
        assert!(rx.try_recv().is_err());

        engine.handle_ack("ok");
        engine.evaluate_continuous_jog(now + Duration::from_millis(150));
        assert!(rx.try_recv().is_ok());

        // No ack this time: only the 1000 ms timeout frees the channel.
        engine.evaluate_continuous_jog(now + Duration::from_millis(300));
        assert!(rx.try_recv().is_err());
        engine.evaluate_continuous_jog(now + Duration::from_millis(1200));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn continuous_jog_requires_the_deadman() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        engine.handle_event(axis(AXIS_X, 20000), now);
        engine.evaluate_continuous_jog(now);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn pad_selects_without_deadman_and_jogs_with_it() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        // Two deflections step the distance selector 0.01 -> 1.0.
        engine.handle_event(axis(AXIS_PAD_X, i16::MAX), now);
        engine.handle_event(axis(AXIS_PAD_X, 0), now);
        engine.handle_event(axis(AXIS_PAD_X, i16::MAX), now);
        engine.handle_event(axis(AXIS_PAD_X, 0), now);
        assert!(rx.try_recv().is_err());

        // Same deflection under the deadman is a step jog instead.
        engine.handle_event(button(DEADMAN, true), now);
        engine.handle_event(axis(AXIS_PAD_X, i16::MAX), now);
        engine.handle_event(axis(AXIS_PAD_X, 0), now + Duration::from_millis(100));

        assert_eq!(gcode_of(rx.try_recv().unwrap()), "G91 G0 X1.000 F100.00");
    }

    #[test]
    fn spindle_follows_the_modifiers_and_stops_once() {
        let (mut engine, mut rx) = engine();
        let now = Instant::now();

        engine.handle_event(button(DEADMAN, true), now);
        engine.handle_event(button(SPINDLE_MOD, true), now);
        engine.handle_event(axis(AXIS_TRIGGER, i16::MAX), now);

        engine.evaluate_spindle();
        assert_eq!(gcode_of(rx.try_recv().unwrap()), "M3 S24000");

        engine.handle_event(button(SPINDLE_MOD, false), now);
        assert_eq!(gcode_of(rx.try_recv().unwrap()), "M5");

        // Off is edge-triggered: further ticks repeat nothing.
        engine.evaluate_spindle();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unhandled_ack_lines_leave_the_session_in_flight() {
        let (mut engine, _rx) = engine();
        let now = Instant::now();

        assert!(engine.session.try_acquire(now));
        engine.handle_ack("<Idle|MPos:0.000,0.000,0.000>");
        assert!(engine.session.in_flight());

        engine.handle_ack("error:15");
        assert!(!engine.session.in_flight());
    }
}
