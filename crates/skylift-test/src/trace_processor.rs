//! Order-preserving bridge from synchronous trace emission to async handling.
//!
//! Resources emit traces on the calling stack and must never wait for
//! output. [`TraceProcessor::add_event`] only enqueues; one worker task
//! drains the queue and awaits the handler for each event before taking the
//! next, so handling order is emission order. [`TraceProcessor::finish`]
//! resolves once everything queued before it has been handled.
//!
//! The queue is unbounded: a producer may run arbitrarily far ahead of the
//! handler and no event is ever dropped.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use skylift_core::TraceEvent;

/// Handles one trace at a time.
#[async_trait]
pub trait TraceHandler: Send + Sync + 'static {
    async fn handle(&self, event: TraceEvent);
}

#[async_trait]
impl<F, Fut> TraceHandler for F
where
    F: Fn(TraceEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, event: TraceEvent) {
        (self)(event).await
    }
}

enum Command {
    Event(TraceEvent),
    Finish(oneshot::Sender<()>),
}

/// Cheap, cloneable producer side of a [`TraceProcessor`].
///
/// Safe to call from synchronous callbacks: sending never blocks.
#[derive(Clone)]
pub struct TraceQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl TraceQueue {
    pub fn add_event(&self, event: TraceEvent) {
        if self.tx.send(Command::Event(event)).is_err() {
            debug!("trace processor already finished; dropping event");
        }
    }
}

pub struct TraceProcessor {
    queue: TraceQueue,
    worker: JoinHandle<()>,
}

impl TraceProcessor {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn new<H: TraceHandler>(handler: H) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let handler = Arc::new(handler);
        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Event(event) => handler.handle(event).await,
                    Command::Finish(done) => {
                        let _ = done.send(());
                        break;
                    }
                }
            }
        });
        Self {
            queue: TraceQueue { tx },
            worker,
        }
    }

    pub fn add_event(&self, event: TraceEvent) {
        self.queue.add_event(event);
    }

    /// Producer handle for subscribers that outlive a borrow of the processor.
    pub fn queue(&self) -> TraceQueue {
        self.queue.clone()
    }

    /// Wait for every event queued so far to be handled, then stop the worker.
    ///
    /// Events added through a [`TraceQueue`] after this resolves are dropped.
    pub async fn finish(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.queue.tx.send(Command::Finish(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        if let Err(e) = self.worker.await {
            warn!(error = %e, "trace worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn event(n: usize) -> TraceEvent {
        TraceEvent::log("root/env0/test:t/Handler", "cloud.Function", format!("e{n}"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_handles_in_enqueue_order_despite_delays() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor = TraceProcessor::new(move |event: TraceEvent| {
            let sink = Arc::clone(&sink);
            async move {
                // Earlier events sleep longer; order must still hold.
                let n: u64 = event.data.message[1..].parse().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(50 - n)).await;
                sink.lock().unwrap().push(event.data.message);
            }
        });

        for n in 0..20 {
            processor.add_event(event(n));
        }
        processor.finish().await;

        let expected: Vec<String> = (0..20).map(|n| format!("e{n}")).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_finish_waits_for_in_flight_handler() {
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        let processor = TraceProcessor::new(move |_event: TraceEvent| {
            let sink = Arc::clone(&sink);
            async move {
                tokio::task::yield_now().await;
                *sink.lock().unwrap() += 1;
            }
        });
        let queue = processor.queue();
        for n in 0..5 {
            queue.add_event(event(n));
        }
        processor.finish().await;
        assert_eq!(*seen.lock().unwrap(), 5);

        // Late events are ignored rather than panicking.
        queue.add_event(event(99));
    }

    #[tokio::test]
    async fn test_finish_with_no_events() {
        let processor = TraceProcessor::new(|_event: TraceEvent| async {});
        processor.finish().await;
    }
}
