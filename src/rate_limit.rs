use chrono::{ DateTime, Duration, Utc };
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_MAX_SENDS: u32 = 30;
pub const DEFAULT_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window send limiter keyed by sender id.
///
/// Process-local and never persisted; a restart starts every sender with a
/// fresh window.
pub struct SendRateLimiter {
    max_sends: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl SendRateLimiter {
    pub fn new(max_sends: u32, window: Duration) -> Self {
        Self {
            max_sends,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admits one send for `sender_id` at `now`, or returns false when the
    /// current window is already full. Rejected sends are not queued.
    pub fn try_admit(&self, sender_id: &str, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() > 10_000 {
            windows.retain(|_, w| now <= w.reset_at);
        }

        let entry = windows
            .entry(sender_id.to_string())
            .or_insert(Window { count: 0, reset_at: now + self.window });

        if now > entry.reset_at {
            *entry = Window { count: 0, reset_at: now + self.window };
        }

        if entry.count >= self.max_sends {
            return false;
        }
        entry.count += 1;
        true
    }

    pub fn tracked_senders(&self) -> usize {
        self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

impl Default for SendRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SENDS, Duration::seconds(DEFAULT_WINDOW_SECS))
    }
}
