//! Event fan-out used by every subsystem for observability.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait implemented by each subsystem's event enum.
pub trait PipelineEvent: Send + Sync + fmt::Debug {
    /// Short event discriminator, e.g. `"StateTransition"` or `"CacheHit"`.
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// The configured name of the component instance that emitted it.
    fn component(&self) -> &str;
}

/// Trait for consuming events.
pub trait EventListener<E: PipelineEvent>: Send + Sync {
    /// Called synchronously for each event.
    fn on_event(&self, event: &E);
}

/// Shared, type-erased listener handle.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// An ordered collection of listeners.
///
/// Emission is synchronous and in registration order. A listener that panics
/// is isolated: the panic is caught, logged, and the remaining listeners
/// still run.
#[derive(Clone)]
pub struct EventListeners<E: PipelineEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: PipelineEvent> EventListeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to every listener, isolating panics.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if outcome.is_err() {
                tracing::warn!(
                    listener_index = index,
                    component = event.component(),
                    event_type = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    /// True when no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: PipelineEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A closure-backed listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps a closure as a listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: PipelineEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
