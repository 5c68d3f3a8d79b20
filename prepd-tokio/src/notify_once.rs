use std::sync::Arc;

use tokio::sync::Semaphore;

/// Synchronization utility which sends a notification to all consumers
/// *once*, most commonly used as a shutdown signal.
///
/// - Multi-producer and multi-consumer; clone to get another handle.
/// - Every clone observes the signal at-most-once. Clones made after the
///   signal was sent can still observe it once.
/// - Sending more than once is safe and has no further effect.
///
/// The implementation (ab)uses the fact that [`Semaphore::acquire`] on a
/// semaphore with 0 permits only returns once the semaphore has been closed:
/// closing the semaphore is "send", and getting an `AcquireError` back from
/// `acquire` is "recv".
#[derive(Debug)]
pub struct NotifyOnce {
    inner: Arc<Semaphore>,
    have_recved: bool,
}

impl NotifyOnce {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Semaphore::new(0)),
            have_recved: false,
        }
    }

    /// Send the signal, causing all actors waiting on this channel to
    /// complete their call to [`recv`](Self::recv).
    pub fn send(&self) {
        self.inner.close();
    }

    /// Wait for the signal.
    ///
    /// NOTE: If this handle has already observed the signal, _this future
    /// will never resolve!_
    pub async fn recv(&mut self) {
        if self.have_recved {
            std::future::pending().await
        } else {
            self.inner
                .acquire()
                .await
                .map(|_permit| ())
                .expect_err("Shouldn't've been able to acquire a permit");
            // This handle has seen the signal; later calls won't yield it.
            self.have_recved = true;
        }
    }

    /// Waits for the signal, taking ownership of the handle. Useful for APIs
    /// which require `impl Future<Output = ()> + 'static`.
    pub async fn recv_owned(mut self) {
        self.recv().await
    }

    /// Immediately returns whether the signal has been sent. Does NOT consume
    /// the signal for a later call to [`recv`](Self::recv).
    #[must_use]
    pub fn try_recv(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Clone for NotifyOnce {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            // Every clone gets its own chance to see the signal.
            have_recved: false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time;
    use tokio_test::{assert_pending, assert_ready};

    use super::*;

    #[test]
    fn multiple_sends_dont_panic() {
        let shutdown = NotifyOnce::new();
        shutdown.send();
        shutdown.send();
        shutdown.send();
    }

    #[test]
    fn each_handle_yields_once() {
        let shutdown1 = NotifyOnce::new();
        let mut shutdown2 = shutdown1.clone();

        let mut recv1 = tokio_test::task::spawn(shutdown2.recv());
        assert_pending!(recv1.poll());

        shutdown1.send();

        assert!(recv1.is_woken());
        assert_ready!(recv1.poll());
        drop(recv1);

        // recv'ing again on the same handle stays pending forever
        let mut recv2 = tokio_test::task::spawn(shutdown2.recv());
        assert_pending!(recv2.poll());
        shutdown1.send();
        assert_pending!(recv2.poll());
        drop(recv2);

        // but a fresh clone gets a fresh chance to observe the signal
        let mut shutdown3 = shutdown2.clone();
        let mut recv3 = tokio_test::task::spawn(shutdown3.recv());
        assert_ready!(recv3.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_after_send_is_ok() {
        let shutdown1 = NotifyOnce::new();
        let mut shutdown2 = shutdown1.clone();
        time::sleep(Duration::from_secs(1)).await;
        shutdown1.send();
        time::timeout(Duration::from_nanos(1), shutdown2.recv())
            .await
            .expect("Did not finish immediately");

        let mut shutdown3 = shutdown2.clone();
        assert!(shutdown3.try_recv());
        time::timeout(Duration::from_nanos(1), shutdown3.recv())
            .await
            .expect("Did not finish immediately");
    }
}
