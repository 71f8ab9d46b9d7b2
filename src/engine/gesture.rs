//! Short/long press discrimination for gated buttons and pad edges.
//!
//! The machine never sleeps on its own: deadlines are plain data, and the
//! engine loop is responsible for calling [`ButtonGesture::fire_deadline`]
//! once the earliest deadline has passed. Releasing a pending press simply
//! clears the deadline, so a stale long-press can never fire after release.

use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a gesture transition, to be turned into a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    ShortPress,
    LongPress,
    LongCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureState {
    Idle,
    PressPending { deadline: Instant },
    LongActive,
}

#[derive(Debug)]
pub struct ButtonGesture {
    press_timeout: Duration,
    state: GestureState,
}

impl ButtonGesture {
    pub fn new(press_timeout: Duration) -> Self {
        Self {
            press_timeout,
            state: GestureState::Idle,
        }
    }

    /// Effective only from `Idle`; arms the press deadline.
    pub fn press(&mut self, now: Instant) {
        if self.state == GestureState::Idle {
            self.state = GestureState::PressPending {
                deadline: now + self.press_timeout,
            };
        }
    }

    /// Release before the deadline yields a short press; release from a
    /// long hold yields the cancel. Release while idle is a no-op.
    pub fn release(&mut self) -> Option<GestureEvent> {
        match self.state {
            GestureState::Idle => None,
            GestureState::PressPending { .. } => {
                self.state = GestureState::Idle;
                Some(GestureEvent::ShortPress)
            }
            GestureState::LongActive => {
                self.state = GestureState::Idle;
                Some(GestureEvent::LongCancel)
            }
        }
    }

    /// Promotes a pending press whose deadline has elapsed.
    pub fn fire_deadline(&mut self, now: Instant) -> Option<GestureEvent> {
        if let GestureState::PressPending { deadline } = self.state {
            if now >= deadline {
                self.state = GestureState::LongActive;
                return Some(GestureEvent::LongPress);
            }
        }
        None
    }

    /// Silently returns to `Idle` without invoking any callback. Used when
    /// the deadman gate opens while a gesture is active.
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }

    /// Deadline the engine loop has to wake up for, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            GestureState::PressPending { deadline } => Some(deadline),
            _ => None,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn release_before_deadline_is_a_short_press() {
        let mut gesture = ButtonGesture::new(TIMEOUT);
        let t0 = Instant::now();

        gesture.press(t0);
        assert_eq!(gesture.fire_deadline(t0 + Duration::from_millis(499)), None);
        assert_eq!(gesture.release(), Some(GestureEvent::ShortPress));
        assert_eq!(gesture.release(), None);
    }

    #[test]
    fn hold_past_deadline_is_a_long_press_then_cancel() {
        let mut gesture = ButtonGesture::new(TIMEOUT);
        let t0 = Instant::now();

        gesture.press(t0);
        assert_eq!(
            gesture.fire_deadline(t0 + TIMEOUT),
            Some(GestureEvent::LongPress)
        );
        // Deadline only fires once.
        assert_eq!(gesture.fire_deadline(t0 + TIMEOUT * 2), None);
        assert_eq!(gesture.release(), Some(GestureEvent::LongCancel));
    }

    #[test]
    fn release_clears_the_deadline() {
        let mut gesture = ButtonGesture::new(TIMEOUT);
        let t0 = Instant::now();

        gesture.press(t0);
        assert_eq!(gesture.release(), Some(GestureEvent::ShortPress));
        // A stale deadline must not fire after the release.
        assert_eq!(gesture.fire_deadline(t0 + TIMEOUT * 2), None);
        assert_eq!(gesture.deadline(), None);
    }

    #[test]
    fn press_is_only_effective_from_idle() {
        let mut gesture = ButtonGesture::new(TIMEOUT);
        let t0 = Instant::now();

        gesture.press(t0);
        let deadline = gesture.deadline();
        gesture.press(t0 + Duration::from_millis(100));
        assert_eq!(gesture.deadline(), deadline);
    }

    #[test]
    fn release_while_idle_emits_nothing() {
        let mut gesture = ButtonGesture::new(TIMEOUT);
        assert_eq!(gesture.release(), None);
    }
}
