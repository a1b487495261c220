//! Mock radio command session.
//!
//! [`MockCommandSession`] behaves like a radio's register file: `set <path>
//! <value>` stores a value and `get <path>` reads it back. Every command is
//! logged so tests can assert on the exact sequence a session issued.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vrtlink_core::transport::CommandSession;
//! use vrtlink_test_harness::MockCommandSession;
//!
//! # async fn example() -> vrtlink_core::Result<()> {
//! let radio = MockCommandSession::new();
//! radio.send_command("set tx/0/duc/0/rate 9", Duration::from_secs(1)).await?;
//!
//! let reply = radio.send_command("get tx/0/duc/0/rate", Duration::from_secs(1)).await?;
//! assert_eq!(reply, vec!["9".to_string()]);
//! assert_eq!(radio.value("tx/0/duc/0/rate").as_deref(), Some("9"));
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use vrtlink_core::error::{Error, Result};
use vrtlink_core::transport::CommandSession;

#[derive(Debug, Default)]
struct RadioState {
    values: HashMap<String, String>,
    /// Paths whose setters are rejected with an `err` reply.
    rejected: HashSet<String>,
    /// Paths whose setters are acknowledged but not applied.
    frozen: HashSet<String>,
    log: Vec<String>,
    offline: bool,
}

/// A register-file [`CommandSession`].
///
/// Clones share state, so a test keeps one handle while the session under
/// test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockCommandSession {
    state: Arc<Mutex<RadioState>>,
}

impl MockCommandSession {
    /// Create a radio with no registers set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset a register value.
    pub fn with_value(self, path: &str, value: &str) -> Self {
        self.lock()
            .values
            .insert(path.to_string(), value.to_string());
        self
    }

    /// Current value of a register.
    pub fn value(&self, path: &str) -> Option<String> {
        self.lock().values.get(path).cloned()
    }

    /// Reject every setter on `path` with a protocol error.
    pub fn reject(&self, path: &str) {
        self.lock().rejected.insert(path.to_string());
    }

    /// Acknowledge setters on `path` without changing its value, so a
    /// verifying query reads back the old value.
    pub fn freeze(&self, path: &str) {
        self.lock().frozen.insert(path.to_string());
    }

    /// Fail every following command with [`Error::ConnectionLost`].
    pub fn go_offline(&self) {
        self.lock().offline = true;
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RadioState> {
        // Poisoned only by a test that already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CommandSession for MockCommandSession {
    async fn send_command(&self, text: &str, _timeout: Duration) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.log.push(text.to_string());

        if state.offline {
            return Err(Error::ConnectionLost);
        }

        let mut words = text.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("set"), Some(path), Some(value)) => {
                if state.rejected.contains(path) {
                    return Err(Error::Protocol(format!("{} is read-only", path)));
                }
                if !state.frozen.contains(path) {
                    state.values.insert(path.to_string(), value.to_string());
                }
                Ok(Vec::new())
            }
            (Some("get"), Some(path), None) => state
                .values
                .get(path)
                .map(|v| vec![v.clone()])
                .ok_or_else(|| Error::Protocol(format!("no such path: {}", path))),
            _ => Err(Error::Protocol(format!("unrecognized command: {}", text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn set_then_get() {
        let radio = MockCommandSession::new();
        let reply = radio.send_command("set tx/1/stream_id 42", T).await.unwrap();
        assert!(reply.is_empty());

        let reply = radio.send_command("get tx/1/stream_id", T).await.unwrap();
        assert_eq!(reply, vec!["42".to_string()]);
        assert_eq!(
            radio.commands(),
            vec!["set tx/1/stream_id 42", "get tx/1/stream_id"]
        );
    }

    #[tokio::test]
    async fn unknown_path_is_protocol_error() {
        let radio = MockCommandSession::new();
        let err = radio.send_command("get rx/0/freq", T).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn frozen_path_keeps_old_value() {
        let radio = MockCommandSession::new().with_value("tx/0/duc/0/rate", "4");
        radio.freeze("tx/0/duc/0/rate");

        radio.send_command("set tx/0/duc/0/rate 9", T).await.unwrap();
        assert_eq!(radio.value("tx/0/duc/0/rate").as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn rejected_and_offline() {
        let radio = MockCommandSession::new();
        radio.reject("tx/0/duc/0/pause");
        assert!(matches!(
            radio.send_command("set tx/0/duc/0/pause 1", T).await,
            Err(Error::Protocol(_))
        ));

        radio.go_offline();
        assert!(matches!(
            radio.send_command("get tx/0/duc/0/pause", T).await,
            Err(Error::ConnectionLost)
        ));
    }
}
