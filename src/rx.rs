// Single-byte receive channels
//
// Each serial link delivers one byte at a time to a handler. A channel is
// disarmed as soon as a byte is taken from it and is only polled again once
// the handler hands back a `Rearm` token, so a handler that forgets to
// re-arm fails to compile instead of silently stalling the link.

use tokio::sync::mpsc;
use tracing::debug;

/// Proof that a byte handler finished and the next receive may be armed
#[must_use = "a receive channel stays disarmed until its Rearm token is handed back"]
#[derive(Debug)]
pub struct Rearm(());

impl Rearm {
    pub fn next() -> Self {
        Rearm(())
    }
}

/// A byte stream fed by a reader thread, gated by the re-arm contract
pub struct RxChannel {
    name: &'static str,
    rx: mpsc::Receiver<u8>,
    armed: bool,
    received: u64,
}

impl RxChannel {
    pub fn new(name: &'static str, rx: mpsc::Receiver<u8>) -> Self {
        Self {
            name,
            rx,
            armed: true,
            received: 0,
        }
    }

    /// Create a channel together with the sender its producer writes into
    pub fn with_capacity(name: &'static str, capacity: usize) -> (mpsc::Sender<u8>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(name, rx))
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Wait for the next byte. The channel is disarmed once a byte is delivered.
    ///
    /// Returns `None` when the channel is disarmed or its producer has gone away.
    pub async fn recv(&mut self) -> Option<u8> {
        if !self.armed {
            return None;
        }
        let byte = self.rx.recv().await?;
        self.armed = false;
        self.received += 1;
        Some(byte)
    }

    /// Arm the next single-byte receive
    pub fn rearm(&mut self, _token: Rearm) {
        if self.armed {
            debug!("{} channel re-armed twice", self.name);
        }
        self.armed = true;
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_disarms_until_rearmed() {
        let (tx, mut channel) = RxChannel::with_capacity("test", 8);
        tx.send(b'1').await.unwrap();
        tx.send(b'2').await.unwrap();

        assert_eq!(channel.recv().await, Some(b'1'));
        assert!(!channel.is_armed());
        // Disarmed: the second byte stays queued
        assert_eq!(channel.recv().await, None);

        channel.rearm(Rearm::next());
        assert_eq!(channel.recv().await, Some(b'2'));
        assert_eq!(channel.received(), 2);
    }

    #[tokio::test]
    async fn test_closed_producer_yields_none() {
        let (tx, mut channel) = RxChannel::with_capacity("test", 1);
        drop(tx);
        assert_eq!(channel.recv().await, None);
        assert!(channel.is_armed());
    }
}
