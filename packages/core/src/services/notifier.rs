//! Event publication
//!
//! Every change notification leaves the annotation model through
//! [`EventNotifier::publish`]. Two kinds of subscribers exist:
//!
//! - **Listeners** registered with [`EventNotifier::add_listener`]: synchronous
//!   callbacks run through the configured [`UiDispatcher`], which is how a
//!   view layer gets them on its own UI thread
//! - **Broadcast receivers** from [`EventNotifier::subscribe`]: async consumers
//!   reading a `tokio::sync::broadcast` channel
//!
//! Within one `publish` call data events go out before selection events
//! regardless of the order the caller listed them in.

use crate::db::AnnotationEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, mpsc};

/// Schedules work on the view layer's UI thread
///
/// The core never assumes a particular UI toolkit; an application provides a
/// dispatcher that queues jobs onto its event loop.
pub trait UiDispatcher: Send + Sync {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>);
}

/// Runs jobs immediately on the publishing thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl UiDispatcher for InlineDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

/// Queues jobs for a UI loop that drains a [`UiQueue`]
#[derive(Clone)]
pub struct QueuedDispatcher {
    tx: mpsc::UnboundedSender<Box<dyn FnOnce() + Send>>,
}

/// Receiving side of a [`QueuedDispatcher`]
pub struct UiQueue {
    rx: mpsc::UnboundedReceiver<Box<dyn FnOnce() + Send>>,
}

impl QueuedDispatcher {
    pub fn new() -> (Self, UiQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UiQueue { rx })
    }
}

impl UiDispatcher for QueuedDispatcher {
    fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
        if self.tx.send(job).is_err() {
            tracing::warn!("UI queue closed, dropping notification");
        }
    }
}

impl UiQueue {
    /// Run every queued job, returning how many ran
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it; `false` once every dispatcher is gone
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

/// Synchronous change callback
pub trait AnnotationListener: Send + Sync {
    fn on_event(&self, event: &AnnotationEvent);
}

impl<F> AnnotationListener for F
where
    F: Fn(&AnnotationEvent) + Send + Sync,
{
    fn on_event(&self, event: &AnnotationEvent) {
        self(event)
    }
}

/// Handle returned by [`EventNotifier::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerList = Vec<(ListenerId, Arc<dyn AnnotationListener>)>;

pub struct EventNotifier {
    listeners: Arc<RwLock<ListenerList>>,
    next_listener: AtomicU64,
    dispatcher: Arc<dyn UiDispatcher>,
    event_tx: broadcast::Sender<AnnotationEvent>,
}

impl EventNotifier {
    pub fn new(dispatcher: Arc<dyn UiDispatcher>, capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_listener: AtomicU64::new(1),
            dispatcher,
            event_tx,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn AnnotationListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns whether the listener was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnnotationEvent> {
        self.event_tx.subscribe()
    }

    /// Publish the events of one completed operation
    pub fn publish(&self, events: Vec<AnnotationEvent>) {
        if events.is_empty() {
            return;
        }
        let (mut ordered, selection): (Vec<_>, Vec<_>) =
            events.into_iter().partition(|e| !e.is_selection_event());
        ordered.extend(selection);

        for event in &ordered {
            tracing::debug!(event = event.event_type(), "publishing annotation event");
            // No receivers is fine
            let _ = self.event_tx.send(event.clone());
        }

        let listeners = self.listeners.clone();
        self.dispatcher.dispatch(Box::new(move || {
            let snapshot: ListenerList = listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for event in &ordered {
                for (_, listener) in &snapshot {
                    listener.on_event(event);
                }
            }
        }));
    }
}
