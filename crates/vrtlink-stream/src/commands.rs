//! Radio command text and DUC control.
//!
//! Registers are addressed by slash-separated paths and written with
//! `set <path> <value>`. Every setter is followed by `get <path>` and the
//! last reply line must read back the value just written.

use std::sync::Arc;
use std::time::Duration;

use vrtlink_core::error::{Error, Result};
use vrtlink_core::transport::CommandSession;

/// Default time to wait for a command reply.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Path of the DUC pause register.
pub fn duc_pause_path(tx_channel: u8, duc_channel: u8) -> String {
    format!("tx/{}/duc/{}/pause", tx_channel, duc_channel)
}

/// Path of the DUC rate-index register.
pub fn duc_rate_path(tx_channel: u8, duc_channel: u8) -> String {
    format!("tx/{}/duc/{}/rate", tx_channel, duc_channel)
}

/// Path of a TX channel's stream id register.
pub fn stream_id_path(tx_channel: u8) -> String {
    format!("tx/{}/stream_id", tx_channel)
}

/// Build a setter command.
pub fn cmd_set(path: &str, value: &str) -> String {
    format!("set {} {}", path, value)
}

/// Build a query command.
pub fn cmd_get(path: &str) -> String {
    format!("get {}", path)
}

/// Write `value` to `path` and read it back.
///
/// # Errors
///
/// [`Error::Protocol`] if the query returns nothing or a different value;
/// any error of the underlying session is returned as is.
pub async fn set_and_verify(
    session: &dyn CommandSession,
    path: &str,
    value: &str,
    timeout: Duration,
) -> Result<()> {
    session.send_command(&cmd_set(path, value), timeout).await?;
    let reply = session.send_command(&cmd_get(path), timeout).await?;

    let readback = reply.last().map(|l| l.trim()).unwrap_or_default();
    if readback != value {
        tracing::warn!(path, expected = value, readback, "Register readback mismatch");
        return Err(Error::Protocol(format!(
            "{} reads back {:?}, expected {:?}",
            path, readback, value
        )));
    }

    tracing::debug!(path, value, "Register set");
    Ok(())
}

/// Command access to one DUC of one TX channel.
#[derive(Clone)]
pub struct DucControl {
    session: Arc<dyn CommandSession>,
    tx_channel: u8,
    duc_channel: u8,
    timeout: Duration,
}

impl std::fmt::Debug for DucControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DucControl")
            .field("tx_channel", &self.tx_channel)
            .field("duc_channel", &self.duc_channel)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DucControl {
    /// Control DUC `duc_channel` of TX channel `tx_channel`.
    pub fn new(
        session: Arc<dyn CommandSession>,
        tx_channel: u8,
        duc_channel: u8,
        timeout: Duration,
    ) -> Self {
        DucControl {
            session,
            tx_channel,
            duc_channel,
            timeout,
        }
    }

    /// Pause or unpause the DUC.
    pub async fn set_paused(&self, paused: bool) -> Result<()> {
        let path = duc_pause_path(self.tx_channel, self.duc_channel);
        set_and_verify(&*self.session, &path, if paused { "1" } else { "0" }, self.timeout).await
    }

    /// Select the DUC rate index.
    pub async fn set_rate_index(&self, index: u8) -> Result<()> {
        let path = duc_rate_path(self.tx_channel, self.duc_channel);
        set_and_verify(&*self.session, &path, &index.to_string(), self.timeout).await
    }

    /// Assign the TX channel's stream id.
    pub async fn set_stream_id(&self, stream_id: u32) -> Result<()> {
        let path = stream_id_path(self.tx_channel);
        set_and_verify(&*self.session, &path, &stream_id.to_string(), self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrtlink_test_harness::MockCommandSession;

    const T: Duration = Duration::from_secs(1);

    fn control(radio: &MockCommandSession) -> DucControl {
        DucControl::new(Arc::new(radio.clone()), 1, 0, T)
    }

    #[test]
    fn paths_and_commands() {
        assert_eq!(duc_pause_path(1, 2), "tx/1/duc/2/pause");
        assert_eq!(duc_rate_path(0, 0), "tx/0/duc/0/rate");
        assert_eq!(stream_id_path(3), "tx/3/stream_id");
        assert_eq!(cmd_set("a/b", "7"), "set a/b 7");
        assert_eq!(cmd_get("a/b"), "get a/b");
    }

    #[tokio::test]
    async fn set_and_verify_issues_setter_then_query() {
        let radio = MockCommandSession::new();
        set_and_verify(&radio, "tx/0/duc/0/rate", "9", T).await.unwrap();
        assert_eq!(
            radio.commands(),
            vec!["set tx/0/duc/0/rate 9", "get tx/0/duc/0/rate"]
        );
    }

    #[tokio::test]
    async fn readback_mismatch_is_protocol_error() {
        let radio = MockCommandSession::new().with_value("tx/0/duc/0/rate", "4");
        radio.freeze("tx/0/duc/0/rate");
        let err = set_and_verify(&radio, "tx/0/duc/0/rate", "9", T)
            .await
            .unwrap_err();
        match err {
            Error::Protocol(msg) => assert!(msg.contains("expected \"9\""), "{}", msg),
            other => panic!("expected Protocol, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn session_errors_propagate() {
        let radio = MockCommandSession::new();
        radio.reject("tx/1/duc/0/pause");
        assert!(matches!(
            control(&radio).set_paused(true).await,
            Err(Error::Protocol(_))
        ));

        radio.go_offline();
        assert!(matches!(
            control(&radio).set_rate_index(9).await,
            Err(Error::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn duc_control_writes_registers() {
        let radio = MockCommandSession::new();
        let duc = control(&radio);
        duc.set_paused(true).await.unwrap();
        duc.set_rate_index(9).await.unwrap();
        duc.set_stream_id(0x8400_0001).await.unwrap();
        duc.set_paused(false).await.unwrap();

        assert_eq!(radio.value("tx/1/duc/0/pause").as_deref(), Some("0"));
        assert_eq!(radio.value("tx/1/duc/0/rate").as_deref(), Some("9"));
        assert_eq!(radio.value("tx/1/stream_id").as_deref(), Some("2214592513"));
    }
}
