//! Recording transport for tests and in-process loopback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traits::{DeviceTransport, TransportError};

/// A payload captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub endpoint: u8,
    pub data: Vec<u8>,
}

/// Mock transport capturing everything the device sends.
///
/// Clones share the same log, so a test can hand one clone to the engine and
/// inspect the other.
#[derive(Debug, Clone)]
pub struct MockTransport {
    /// Captured sends, oldest first.
    send_log: Arc<Mutex<Vec<SentPacket>>>,
    /// Whether the host is "attached".
    connected: Arc<Mutex<bool>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            send_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// All captured sends.
    pub fn get_sends(&self) -> Vec<SentPacket> {
        lock(&self.send_log).clone()
    }

    /// Payloads only, in send order.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        lock(&self.send_log).iter().map(|p| p.data.clone()).collect()
    }

    /// Remove and return everything sent so far.
    pub fn take_sends(&self) -> Vec<SentPacket> {
        std::mem::take(&mut *lock(&self.send_log))
    }

    /// Most recent payload, if any.
    pub fn last_payload(&self) -> Option<Vec<u8>> {
        lock(&self.send_log).last().map(|p| p.data.clone())
    }

    /// Clear captured sends.
    pub fn clear_sends(&self) {
        lock(&self.send_log).clear();
    }

    /// Simulate host detach.
    pub fn disconnect(&self) {
        *lock(&self.connected) = false;
    }

    /// Simulate host re-attach.
    pub fn reconnect(&self) {
        *lock(&self.connected) = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTransport for MockTransport {
    fn send(&self, endpoint: u8, data: &[u8]) -> Result<(), TransportError> {
        if !*lock(&self.connected) {
            return Err(TransportError::Disconnected);
        }
        lock(&self.send_log).push(SentPacket {
            endpoint,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *lock(&self.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_send_capture() {
        let mock = MockTransport::new();
        mock.send(3, b"Hello").unwrap();
        mock.send(3, b"World").unwrap();

        let sends = mock.get_sends();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].endpoint, 3);
        assert_eq!(sends[0].data, b"Hello");
        assert_eq!(mock.last_payload().unwrap(), b"World");
    }

    #[test]
    fn test_clones_share_log() {
        let mock = MockTransport::new();
        let other = mock.clone();
        other.send(3, &[1, 2, 3]).unwrap();
        assert_eq!(mock.take_sends().len(), 1);
        assert!(other.get_sends().is_empty());
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.disconnect();
        assert!(!mock.is_connected());
        assert!(mock.send(3, b"test").is_err());

        mock.reconnect();
        assert!(mock.send(3, b"test").is_ok());
    }
}
