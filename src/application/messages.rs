// Human-readable message feed shown to the operator
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::broadcast;

pub const FEED_HISTORY: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Result,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub text: String,
}

pub struct MessageFeed {
    history: Mutex<VecDeque<Message>>,
    capacity: usize,
    tx: broadcast::Sender<Message>,
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new(FEED_HISTORY)
    }
}

impl MessageFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            tx,
        }
    }

    /// Records a message; multi-line text becomes one entry per line.
    pub fn push(&self, severity: Severity, text: impl AsRef<str>) {
        for line in text.as_ref().lines().map(str::trim).filter(|l| !l.is_empty()) {
            match severity {
                Severity::Debug => tracing::debug!("{}", line),
                Severity::Info | Severity::Success | Severity::Result => tracing::info!("{}", line),
                Severity::Warning => tracing::warn!("{}", line),
                Severity::Error => tracing::error!("{}", line),
            }

            let message = Message {
                timestamp: Local::now(),
                severity,
                text: line.to_string(),
            };

            {
                let mut history = self.history.lock();
                if history.len() == self.capacity {
                    history.pop_front();
                }
                history.push_back(message.clone());
            }

            // No subscribers is fine
            let _ = self.tx.send(message);
        }
    }

    pub fn debug(&self, text: impl AsRef<str>) {
        self.push(Severity::Debug, text);
    }

    pub fn info(&self, text: impl AsRef<str>) {
        self.push(Severity::Info, text);
    }

    pub fn success(&self, text: impl AsRef<str>) {
        self.push(Severity::Success, text);
    }

    pub fn warn(&self, text: impl AsRef<str>) {
        self.push(Severity::Warning, text);
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.push(Severity::Error, text);
    }

    pub fn recent(&self) -> Vec<Message> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_messages_are_split() {
        let feed = MessageFeed::new(10);
        feed.info("Phase 1:\n    - Testing standard load increase\n");
        let recent = feed.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].text, "- Testing standard load increase");
    }

    #[test]
    fn test_history_is_bounded() {
        let feed = MessageFeed::new(3);
        for i in 0..5 {
            feed.debug(format!("tick {i}"));
        }
        let texts: Vec<String> = feed.recent().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["tick 2", "tick 3", "tick 4"]);
    }

    #[test]
    fn test_subscribers_receive_new_messages() {
        let feed = MessageFeed::new(3);
        let mut rx = feed.subscribe();
        feed.warn("Adapter isn't connected");
        let message = rx.try_recv().unwrap();
        assert_eq!(message.severity, Severity::Warning);
    }
}
