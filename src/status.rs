//! Status reporting boundary and the shipped display buffer
//!
//! The device surfaces its lifecycle through short human-readable lines
//! and a single connectivity indicator. On the original hardware these
//! feed a panel; here the sink is a trait so the connectivity monitor and
//! session manager stay independent of any rendering stack.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Sink for human-readable status lines and the connectivity indicator.
///
/// Called concurrently from the network-stack event context and the
/// session task. Implementations serialize internally, never deadlock
/// callers, and always complete; brief blocking is acceptable.
pub trait StatusSink: Send + Sync {
    /// Append one status line. Best-effort; failures are swallowed.
    fn append_line(&self, text: &str);

    /// Toggle the connectivity indicator.
    fn set_connectivity_indicator(&self, connected: bool);
}

/// One buffered status line with its arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// Bounded, timestamped line buffer backing a status panel.
///
/// Keeps the newest `capacity` lines and drops the oldest beyond that.
/// The indicator mirrors the panel's connectivity icon.
pub struct DisplayBuffer {
    lines: Mutex<VecDeque<StatusLine>>,
    capacity: usize,
    indicator: AtomicBool,
}

impl DisplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            indicator: AtomicBool::new(false),
        }
    }

    /// Snapshot of the buffered lines, oldest first.
    pub fn lines(&self) -> Vec<StatusLine> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current indicator value.
    pub fn indicator(&self) -> bool {
        self.indicator.load(Ordering::Relaxed)
    }

    /// Render the buffer as display text, one line per entry.
    pub fn render(&self) -> String {
        self.lines
            .lock()
            .map(|lines| {
                lines
                    .iter()
                    .map(|line| line.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new(40)
    }
}

impl StatusSink for DisplayBuffer {
    fn append_line(&self, text: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(StatusLine {
                at: Utc::now(),
                text: text.to_string(),
            });
        }
    }

    fn set_connectivity_indicator(&self, connected: bool) {
        self.indicator.store(connected, Ordering::Relaxed);
    }
}
