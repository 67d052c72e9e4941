//! Event dispatch to registered handlers.
//!
//! # Architecture
//!
//! ```text
//! read pump ──dispatch()──► FIFO queue ──► worker 1 ─► handler(ctx, event)
//!                                      ├─► worker 2
//!                                      └─► worker N
//! ```
//!
//! `dispatch` never blocks: it looks up the handlers registered for the
//! event's kind and enqueues one job per handler. A fixed pool of worker
//! tasks pulls jobs in FIFO order, so for any single handler, invocations
//! start in the order events were produced. Handlers for the same event run
//! concurrently on different workers.
//!
//! The registry is append-only. Unregistered kinds are ignored.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};

use super::types::Event;

/// A registered handler.
///
/// The context is the client itself in production; tests may use anything
/// cheap to clone.
pub type Handler<C> = Arc<dyn Fn(C, Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// One queued handler invocation.
struct Job<C> {
    handler: Handler<C>,
    context: C,
    event: Arc<Event>,
}

/// Registry of handlers plus the worker pool that runs them.
pub struct Dispatcher<C> {
    handlers: RwLock<HashMap<String, Vec<Handler<C>>>>,
    queue: mpsc::UnboundedSender<Job<C>>,
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("Dispatcher")
            .field("kinds", &handlers.len())
            .field("handlers", &handlers.values().map(Vec::len).sum::<usize>())
            .finish_non_exhaustive()
    }
}

impl<C: Clone + Send + 'static> Dispatcher<C> {
    /// Create a dispatcher and spawn `workers` worker tasks.
    ///
    /// Must be called from within a Tokio runtime. Workers exit once the
    /// dispatcher is dropped and the queue has drained.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let (queue, rx) = mpsc::unbounded_channel::<Job<C>>();
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    // Hold the lock only while taking a job so other workers
                    // can pick up the next one while this one runs.
                    let job = rx.lock().await.recv().await;
                    let Some(Job {
                        handler,
                        context,
                        event,
                    }) = job
                    else {
                        break;
                    };

                    let kind = event.kind.clone();
                    // Calling the handler inside the future also catches
                    // panics raised before it returns its future.
                    let invocation =
                        AssertUnwindSafe(async move { handler(context, event).await })
                            .catch_unwind();
                    if invocation.await.is_err() {
                        log::error!("[Dispatch] Handler for '{kind}' panicked (worker {worker})");
                    }
                }
                log::debug!("[Dispatch] Worker {worker} stopped");
            });
        }

        Self {
            handlers: RwLock::new(HashMap::new()),
            queue,
        }
    }

    /// Append a handler for `kind`.
    pub fn register(&self, kind: &str, handler: Handler<C>) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers.entry(kind.to_string()).or_default().push(handler);
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Queue one invocation per handler registered for the event's kind.
    pub fn dispatch(&self, context: &C, event: Event) {
        let handlers = {
            let registry = self
                .handlers
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match registry.get(&event.kind) {
                Some(list) if !list.is_empty() => list.clone(),
                _ => {
                    log::trace!("[Dispatch] No handlers for '{}'", event.kind);
                    return;
                }
            }
        };

        let event = Arc::new(event);
        for handler in handlers {
            let job = Job {
                handler,
                context: context.clone(),
                event: Arc::clone(&event),
            };
            if self.queue.send(job).is_err() {
                log::warn!("[Dispatch] Worker pool gone, dropping '{}'", event.kind);
                return;
            }
        }
    }
}

/// Wrap an async closure as a [`Handler`].
pub fn handler<C, F, Fut>(f: F) -> Handler<C>
where
    F: Fn(C, Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |context, event| f(context, event).boxed())
}
