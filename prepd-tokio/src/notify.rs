//! # `notify` channel
//!
//! A minimal notification channel wrapping a capacity-1
//! [`tokio::sync::mpsc`]. If multiple notifications are sent before the
//! receiver calls [`Receiver::recv`], the receiver is only woken once, so it
//! never does duplicate work for a burst of notifications.
//!
//! The rest is sugar: [`Sender::send`] never blocks and doesn't care whether
//! the channel is full or the receiver is gone, and [`Receiver::recv`] never
//! resolves if all senders have been dropped.

use tokio::sync::mpsc;

/// Create a new `notify` channel returning a [`Sender`] (cloneable) and
/// [`Receiver`] (not cloneable), analogous to `mpsc::channel(1)`.
pub fn channel() -> (Sender, Receiver) {
    let (tx, rx) = mpsc::channel(1);
    (Sender(tx), Receiver(rx))
}

/// `notify` sender, analogous to `mpsc::Sender<()>`.
#[derive(Clone)]
pub struct Sender(mpsc::Sender<()>);

/// `notify` receiver, analogous to `mpsc::Receiver<()>`.
pub struct Receiver(mpsc::Receiver<()>);

impl Sender {
    /// Sends a notification to the [`Receiver`].
    pub fn send(&self) {
        let _ = self.0.try_send(());
    }
}

impl Receiver {
    /// Waits until a notification is received over the channel. Completes
    /// immediately if a notification has already been sent. NOTE: If all
    /// [`Sender`]s have been dropped, this future never completes!
    pub async fn recv(&mut self) {
        match self.0.recv().await {
            Some(()) => (),
            None => std::future::pending().await,
        }
    }

    /// Immediately returns whether a notification has been sent.
    #[must_use]
    pub fn try_recv(&mut self) -> bool {
        self.0.try_recv().is_ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn burst_coalesces_to_one() {
        let (tx, mut rx) = channel();
        tx.send();
        tx.send();
        tx.send();

        assert!(rx.try_recv());
        // the burst collapsed into a single notification
        assert!(!rx.try_recv());
    }

    #[tokio::test]
    async fn recv_sees_prior_send() {
        let (tx, mut rx) = channel();
        tx.send();
        rx.recv().await;
    }
}
