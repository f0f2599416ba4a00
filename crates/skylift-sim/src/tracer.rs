//! Synchronous trace fan-out for a simulator instance.

use std::sync::{Arc, Mutex, MutexGuard};

use skylift_core::TraceEvent;

type Subscriber = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

#[derive(Default)]
struct TracerInner {
    subscribers: Vec<Subscriber>,
    capture: Option<Vec<TraceEvent>>,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<TracerInner>,
    /// Held for a whole delivery so concurrent emitters cannot interleave.
    delivery: Mutex<()>,
}

/// Delivers every emitted trace to subscribers on the emitting call stack,
/// and records traces while a capture is active.
///
/// Emission is serialized: subscribers and the capture see one total order
/// even when several threads emit. A subscriber must not emit on the tracer
/// that is calling it.
#[derive(Clone, Default)]
pub struct Tracer {
    shared: Arc<Shared>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TracerInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a callback invoked synchronously for every trace.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&TraceEvent) + Send + Sync + 'static,
    {
        self.lock().subscribers.push(Arc::new(callback));
    }

    pub fn emit(&self, event: TraceEvent) {
        let _delivery = self
            .shared
            .delivery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Subscribers run outside the state lock so they may subscribe or
        // end a capture.
        let subscribers = {
            let mut inner = self.lock();
            if let Some(capture) = inner.capture.as_mut() {
                capture.push(event.clone());
            }
            inner.subscribers.clone()
        };
        for subscriber in subscribers {
            subscriber(&event);
        }
    }

    /// Start recording traces, discarding any unfinished capture.
    pub fn begin_capture(&self) {
        self.lock().capture = Some(Vec::new());
    }

    /// Stop recording and return what was captured.
    pub fn end_capture(&self) -> Vec<TraceEvent> {
        self.lock().capture.take().unwrap_or_default()
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Tracer")
            .field("subscribers", &inner.subscribers.len())
            .field("capturing", &inner.capture.is_some())
            .finish()
    }
}
