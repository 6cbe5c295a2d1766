//! Event routing.
//!
//! Handlers declare the [`EventKind`]s they accept; the dispatcher keeps a
//! lookup table from kind to handlers and runs them in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use super::reconciler::{BuildStateReconciler, ReconcileError};
use crate::domain::{Event, EventKind};
use crate::store::BuildStore;

/// Errors raised by handlers
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{handler}: {source}")]
    Reconcile {
        handler: &'static str,
        #[source]
        source: ReconcileError,
    },
}

/// Something that reacts to events
pub trait Handler: Send + Sync {
    /// Human-readable handler name
    fn name(&self) -> &'static str;

    /// Event kinds this handler accepts
    fn kinds(&self) -> &'static [EventKind];

    /// Handle an event, returning any follow-on events
    fn handle(&self, event: &Event, store: &dyn BuildStore) -> Result<Vec<Event>, HandlerError>;
}

impl Handler for BuildStateReconciler {
    fn name(&self) -> &'static str {
        "build-state-reconciler"
    }

    fn kinds(&self) -> &'static [EventKind] {
        &[EventKind::TaskStateChanged]
    }

    fn handle(&self, event: &Event, store: &dyn BuildStore) -> Result<Vec<Event>, HandlerError> {
        match event {
            Event::TaskStateChanged(task) => {
                self.reconcile(task, store)
                    .map_err(|source| HandlerError::Reconcile {
                        handler: self.name(),
                        source,
                    })?;
            }
        }
        Ok(Vec::new())
    }
}

/// Routes events to the handlers registered for their kind
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Arc<dyn Handler>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with every built-in handler registered
    pub fn with_default_handlers() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(BuildStateReconciler::new()));
        dispatcher
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        for kind in handler.kinds() {
            self.handlers
                .entry(*kind)
                .or_default()
                .push(Arc::clone(&handler));
        }
    }

    /// Handlers that would receive an event of this kind
    pub fn handlers_for(&self, kind: EventKind) -> impl Iterator<Item = &str> + '_ {
        self.handlers
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|h| h.name())
    }

    /// Run every matching handler. The first error stops dispatch.
    #[instrument(skip(self, event, store), fields(kind = ?event.kind()))]
    pub fn dispatch(&self, event: &Event, store: &dyn BuildStore) -> Result<Vec<Event>, HandlerError> {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            debug!("No handler registered for event");
            return Ok(Vec::new());
        };

        let mut follow_ups = Vec::new();
        for handler in handlers {
            debug!(handler = handler.name(), "Dispatching event");
            follow_ups.extend(handler.handle(event, store)?);
        }
        Ok(follow_ups)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{BuildState, NewArtifactBuild, TaskStateEvent};
    use crate::store::MemoryBuildStore;

    /// Records events it sees and emits a fixed follow-up
    struct Echo {
        seen: Mutex<Vec<Event>>,
    }

    impl Handler for Echo {
        fn name(&self) -> &'static str {
            "Echo"
        }

        fn kinds(&self) -> &'static [EventKind] {
            &[EventKind::TaskStateChanged]
        }

        fn handle(&self, event: &Event, _store: &dyn BuildStore) -> Result<Vec<Event>, HandlerError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(vec![TaskStateEvent::new("follow-up", "OPEN").into()])
        }
    }

    #[test]
    fn test_default_dispatch_updates_build() {
        let store = MemoryBuildStore::new();
        let build = store.insert(&NewArtifactBuild::image("foo", "42")).unwrap();
        let dispatcher = Dispatcher::with_default_handlers();

        let follow_ups = dispatcher
            .dispatch(&TaskStateEvent::new("42", "CLOSED").into(), &store)
            .unwrap();

        assert!(follow_ups.is_empty());
        assert_eq!(store.get(build.id).unwrap().state, BuildState::Done);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let echo = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let mut dispatcher = Dispatcher::with_default_handlers();
        dispatcher.register(echo.clone());

        let names: Vec<&str> = dispatcher.handlers_for(EventKind::TaskStateChanged).collect();
        assert_eq!(names, vec!["build-state-reconciler", "Echo"]);

        let store = MemoryBuildStore::new();
        let follow_ups = dispatcher
            .dispatch(&TaskStateEvent::new("7", "OPEN").into(), &store)
            .unwrap();

        assert_eq!(follow_ups.len(), 1);
        assert_eq!(echo.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_dispatcher_acknowledges() {
        let store = MemoryBuildStore::new();
        let follow_ups = Dispatcher::new()
            .dispatch(&TaskStateEvent::new("42", "CLOSED").into(), &store)
            .unwrap();
        assert!(follow_ups.is_empty());
    }

    #[test]
    fn test_handler_error_stops_dispatch() {
        let store = MemoryBuildStore::new();
        store.insert(&NewArtifactBuild::image("a", "42")).unwrap();
        store.insert(&NewArtifactBuild::image("b", "42")).unwrap();

        let echo = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let mut dispatcher = Dispatcher::with_default_handlers();
        dispatcher.register(echo.clone());

        let err = dispatcher
            .dispatch(&TaskStateEvent::new("42", "CLOSED").into(), &store)
            .unwrap_err();

        assert!(err.to_string().starts_with("build-state-reconciler:"));
        assert!(echo.seen.lock().unwrap().is_empty());
        assert_eq!(store.commit_count(), 0);
    }
}
