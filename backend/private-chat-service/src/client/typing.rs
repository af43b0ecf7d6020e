use std::time::{Duration, Instant};

/// Inactivity after which a typing indicator is withdrawn.
pub const TYPING_IDLE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

impl TypingSignal {
    /// Value for the `isTyping` field of `private-chat-typing`.
    pub fn is_typing(self) -> bool {
        matches!(self, TypingSignal::Start)
    }
}

/// Turns keystrokes into at most one start and one stop per burst.
///
/// Time is passed in so callers can drive it from their own timer.
#[derive(Debug)]
pub struct TypingDebouncer {
    idle: Duration,
    last_input: Option<Instant>,
    typing: bool,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(TYPING_IDLE)
    }
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            last_input: None,
            typing: false,
        }
    }

    pub fn on_input(&mut self, now: Instant) -> Option<TypingSignal> {
        self.last_input = Some(now);
        if self.typing {
            None
        } else {
            self.typing = true;
            Some(TypingSignal::Start)
        }
    }

    /// Emit `Stop` once the burst has been idle long enough.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.last_input {
            Some(last) if self.typing && now.saturating_duration_since(last) >= self.idle => {
                self.typing = false;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Sending the message ends the burst immediately.
    pub fn on_send(&mut self) -> Option<TypingSignal> {
        self.last_input = None;
        if std::mem::take(&mut self.typing) {
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }

    /// When the caller should next call [`poll`](Self::poll).
    pub fn deadline(&self) -> Option<Instant> {
        match (self.typing, self.last_input) {
            (true, Some(last)) => Some(last + self.idle),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_start_and_one_stop_per_burst() {
        let t0 = Instant::now();
        let mut d = TypingDebouncer::default();

        assert_eq!(d.on_input(t0), Some(TypingSignal::Start));
        assert_eq!(d.on_input(t0 + Duration::from_secs(1)), None);
        assert_eq!(d.on_input(t0 + Duration::from_secs(2)), None);

        // Idle is measured from the last keystroke.
        assert_eq!(d.poll(t0 + Duration::from_secs(4)), None);
        assert_eq!(d.deadline(), Some(t0 + Duration::from_secs(5)));
        assert_eq!(d.poll(t0 + Duration::from_secs(5)), Some(TypingSignal::Stop));
        assert_eq!(d.poll(t0 + Duration::from_secs(9)), None);
        assert_eq!(d.deadline(), None);

        assert_eq!(d.on_input(t0 + Duration::from_secs(10)), Some(TypingSignal::Start));
    }

    #[test]
    fn send_stops_immediately() {
        let t0 = Instant::now();
        let mut d = TypingDebouncer::default();
        assert_eq!(d.on_send(), None);

        d.on_input(t0);
        assert_eq!(d.on_send(), Some(TypingSignal::Stop));
        assert!(!TypingSignal::Stop.is_typing());
        assert_eq!(d.poll(t0 + TYPING_IDLE), None);
    }
}
