use std::{
    borrow::Cow,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, Instrument};

/// A thin wrapper around [`tokio::task::JoinHandle`] that:
///
/// (1) propagates panics instead of catching them, and
/// (2) adds the `#[must_use]` lint so all spawned tasks are either joined or
///     explicitly [`detach`]ed.
///
/// Joining every task keeps control flow sane, avoids leaking zombie tasks,
/// and ensures panics inside spawned tasks reach the poller. [`detach`] is for
/// the rare fire-and-forget task and should be used sparingly.
///
/// `PdTask` also carries a task name for debuggability, and instruments the
/// spawned future with the current [`tracing`] span so logs keep their
/// context across the spawn boundary.
///
/// [`detach`]: PdTask::detach
#[must_use]
pub struct PdTask<T> {
    task: JoinHandle<T>,
    name: Cow<'static, str>,
}

impl<T> PdTask<T> {
    /// Spawns a named task which inherits the current span. This is generally
    /// what you want to use.
    #[inline]
    pub fn spawn<F>(
        name: impl Into<Cow<'static, str>>,
        future: F,
    ) -> PdTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
        F::Output: Send + 'static,
    {
        let span = tracing::Span::current();
        Self::spawn_with_span(name, span, future)
    }

    /// Spawns a task without a name. Use this for trivial tasks where you
    /// don't care about joining later.
    #[inline]
    pub fn spawn_unnamed<F>(future: F) -> PdTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
        F::Output: Send + 'static,
    {
        let span = tracing::Span::current();
        Self::spawn_with_span(String::new(), span, future)
    }

    /// Spawns a named task instrumented with a custom span.
    #[inline]
    pub fn spawn_with_span<F>(
        name: impl Into<Cow<'static, str>>,
        span: tracing::Span,
        future: F,
    ) -> PdTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
        F::Output: Send + 'static,
    {
        let name = name.into();
        debug!("Spawning task: {name}");
        PdTask {
            task: tokio::spawn(future.instrument(span)),
            name,
        }
    }

    /// Drop the handle, detaching the task so it continues running in the
    /// background. Without a handle the task's output (or panic) can no
    /// longer be observed.
    #[inline]
    pub fn detach(self) {
        std::mem::drop(self)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls [`is_finished`] on the underlying [`JoinHandle`].
    ///
    /// [`is_finished`]: tokio::task::JoinHandle::is_finished
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    #[inline]
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl<T> Future for PdTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        let result = match result {
            Ok(val) => Ok(val),
            Err(join_err) => match join_err.try_into_panic() {
                // Propagate the panic to the `PdTask` poller.
                Ok(panic_reason) => {
                    error!("Task '{name}' panicked!", name = self.name());
                    std::panic::resume_unwind(panic_reason)
                }
                Err(join_err) => Err(join_err),
            },
        };

        Poll::Ready(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn join_returns_output() {
        let task = PdTask::spawn("adder", async { 1 + 2 });
        assert_eq!(task.await.unwrap(), 3);
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn panics_propagate_to_poller() {
        let task: PdTask<()> = PdTask::spawn("bomb", async { panic!("boom") });
        let _ = task.await;
    }
}
