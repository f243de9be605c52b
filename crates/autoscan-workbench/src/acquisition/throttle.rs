use std::time::Duration;

/// Rate limiter for continuous capture.
///
/// A frame is accepted when it is the first one since the throttle was armed, or when strictly
/// more than `pitch` elapsed since the last accepted frame. Rejected frames are not queued.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    pitch: Duration,
    last_accepted: Option<Duration>,
}

impl FrameThrottle {
    /// Create an armed throttle.
    pub fn new(pitch: Duration) -> Self {
        Self {
            pitch,
            last_accepted: None,
        }
    }

    /// The minimum spacing between accepted frames.
    pub fn pitch(&self) -> Duration {
        self.pitch
    }

    /// Forget the last accepted frame so the next one is accepted.
    pub fn rearm(&mut self) {
        self.last_accepted = None;
    }

    /// Whether a frame captured at `timestamp` would be accepted. Does not change the state.
    pub fn is_due(&self, timestamp: Duration) -> bool {
        match self.last_accepted {
            Some(last) => timestamp.saturating_sub(last) > self.pitch,
            None => true,
        }
    }

    /// Record a frame captured at `timestamp` as accepted.
    pub fn mark(&mut self, timestamp: Duration) {
        self.last_accepted = Some(timestamp);
    }

    /// Decide on a frame captured at `timestamp` and remember it when accepted.
    pub fn accept(&mut self, timestamp: Duration) -> bool {
        let due = self.is_due(timestamp);
        if due {
            self.mark(timestamp);
        }
        due
    }
}
