//! Request coalescing for interactive search fields.
//!
//! A [`Coalescer`] sits in front of an expensive call (normally
//! [`SearchClient::search`](crate::engine::SearchClient::search)) and lets at
//! most one call through per cool-down window: every [`submit`](Coalescer::submit)
//! arms a fresh timer and supersedes whatever was armed before it. Only the
//! submission that is still the latest when its timer fires reaches the
//! underlying call.
//!
//! ```text
//! submit(a) ──┐ timer a ✗ (superseded by b)
//! submit(b) ──┼─┐ timer b ✗ (superseded by c)
//! submit(c) ──┴─┴─── timer c ──▶ run(c) ──▶ Some(result)
//! ```
//!
//! Supersession is tracked with a generation counter, so no timer handle is
//! ever shared or mutated. Use one coalescer per search field; separate
//! coalescers never interact.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

type RunFn<I, R> = dyn Fn(I) -> BoxFuture<'static, R> + Send + Sync;

/// Single-flight debouncer keyed on a generation counter.
///
/// A superseded submission does not stay pending: its future resolves to
/// `None` as soon as a newer one arrives. Callers that only want the latest
/// result can drop `None`s without further bookkeeping.
pub struct Coalescer<I, R> {
    window: Duration,
    generation: watch::Sender<u64>,
    run: Arc<RunFn<I, R>>,
}

impl<I, R> Coalescer<I, R>
where
    I: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(window: Duration, run: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, R> + Send + Sync + 'static,
    {
        let (generation, _) = watch::channel(0);
        Self {
            window,
            generation,
            run: Arc::new(run),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Submit an intent.
    ///
    /// The intent becomes the latest one as soon as `submit` is called, not
    /// when the returned future is first polled. The future resolves to
    /// `Some(result)` if this intent was still the latest when the window
    /// elapsed, or to `None` as soon as a newer submission supersedes it. A
    /// superseded intent never reaches the underlying call.
    pub fn submit(&self, intent: I) -> impl Future<Output = Option<R>> + Send + '_ {
        let mut mine = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            mine = *g;
        });
        let mut changes = self.generation.subscribe();

        async move {
            let timer = tokio::time::sleep(self.window);
            tokio::pin!(timer);

            loop {
                tokio::select! {
                    _ = &mut timer => break,
                    changed = changes.changed() => {
                        if changed.is_err() || *changes.borrow_and_update() != mine {
                            trace!(generation = mine, "intent superseded");
                            return None;
                        }
                    }
                }
            }

            if *self.generation.borrow() != mine {
                trace!(generation = mine, "intent superseded at fire time");
                return None;
            }

            trace!(generation = mine, "intent fired");
            Some((self.run)(intent).await)
        }
    }
}
