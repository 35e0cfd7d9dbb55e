//! Host event bus.
//!
//! The board fires named events; listeners registered for a name run in
//! registration order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::application::display::TemplateSink;
use crate::application::session::UserSession;
use crate::application::stats::StatsError;

/// Events this crate subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// The index page title is being built; template variables may be added.
    IndexModifyPageTitle,
    /// A post was submitted.
    SubmitPostEnd,
    /// Topics were deleted.
    DeleteTopicsAfterQuery,
}

impl EventName {
    pub const ALL: [EventName; 3] = [
        EventName::IndexModifyPageTitle,
        EventName::SubmitPostEnd,
        EventName::DeleteTopicsAfterQuery,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EventName::IndexModifyPageTitle => "core.index_modify_page_title",
            EventName::SubmitPostEnd => "core.submit_post_end",
            EventName::DeleteTopicsAfterQuery => "core.delete_topics_after_query",
        }
    }

    /// Whether the event changes which topics exist.
    pub const fn is_mutation(self) -> bool {
        matches!(
            self,
            EventName::SubmitPostEnd | EventName::DeleteTopicsAfterQuery
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown event `{0}`")]
pub struct UnknownEvent(pub String);

impl FromStr for EventName {
    type Err = UnknownEvent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or_else(|| UnknownEvent(value.to_string()))
    }
}

/// Payload of the page render event.
#[derive(Clone)]
pub struct PageRender {
    pub user: Arc<dyn UserSession>,
    pub template: Arc<dyn TemplateSink>,
}

/// An event fired by the host board.
#[derive(Clone)]
pub enum HostEvent {
    IndexModifyPageTitle(PageRender),
    SubmitPostEnd,
    DeleteTopicsAfterQuery,
}

impl HostEvent {
    pub fn name(&self) -> EventName {
        match self {
            HostEvent::IndexModifyPageTitle(_) => EventName::IndexModifyPageTitle,
            HostEvent::SubmitPostEnd => EventName::SubmitPostEnd,
            HostEvent::DeleteTopicsAfterQuery => EventName::DeleteTopicsAfterQuery,
        }
    }
}

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle(&self, event: &HostEvent) -> Result<(), StatsError>;
}

#[derive(Debug, Error)]
#[error("listener for `{event}` failed: {source}")]
pub struct DispatchError {
    pub event: EventName,
    #[source]
    pub source: StatsError,
}

/// Routes host events to listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<(EventName, Arc<dyn EventListener>)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, name: EventName, listener: Arc<dyn EventListener>) {
        self.listeners.push((name, listener));
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners
            .iter()
            .filter(|(registered, _)| *registered == name)
            .count()
    }

    /// Run every listener registered for the event, in registration order.
    ///
    /// Stops at the first failing listener. Returns how many listeners ran.
    pub async fn dispatch(&self, event: &HostEvent) -> Result<usize, DispatchError> {
        let name = event.name();
        let mut ran = 0;

        for (_, listener) in self
            .listeners
            .iter()
            .filter(|(registered, _)| *registered == name)
        {
            listener
                .handle(event)
                .await
                .map_err(|source| DispatchError {
                    event: name,
                    source,
                })?;
            ran += 1;
        }

        debug!(event = %name, listeners = ran, "Dispatched host event");
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::application::repos::RepoError;

    use super::*;

    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventListener for Recording {
        async fn handle(&self, _event: &HostEvent) -> Result<(), StatsError> {
            self.log.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventListener for Failing {
        async fn handle(&self, _event: &HostEvent) -> Result<(), StatsError> {
            Err(StatsError::Repo(RepoError::Timeout))
        }
    }

    #[test]
    fn event_names_round_trip_through_strings() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>(), Ok(name));
        }
        assert_eq!(
            "core.page_header".parse::<EventName>(),
            Err(UnknownEvent("core.page_header".to_string()))
        );
    }

    #[test]
    fn only_post_and_topic_events_are_mutations() {
        assert!(!EventName::IndexModifyPageTitle.is_mutation());
        assert!(EventName::SubmitPostEnd.is_mutation());
        assert!(EventName::DeleteTopicsAfterQuery.is_mutation());
    }

    #[tokio::test]
    async fn dispatch_runs_matching_listeners_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        for label in ["first", "second"] {
            dispatcher.add_listener(
                EventName::SubmitPostEnd,
                Arc::new(Recording {
                    label,
                    log: log.clone(),
                }),
            );
        }
        dispatcher.add_listener(
            EventName::DeleteTopicsAfterQuery,
            Arc::new(Recording {
                label: "other",
                log: log.clone(),
            }),
        );

        let ran = dispatcher.dispatch(&HostEvent::SubmitPostEnd).await.unwrap();
        assert_eq!(ran, 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn dispatch_without_listeners_is_a_no_op() {
        let dispatcher = EventDispatcher::new();
        let ran = dispatcher
            .dispatch(&HostEvent::DeleteTopicsAfterQuery)
            .await
            .unwrap();
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn dispatch_reports_failing_listener() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_listener(EventName::SubmitPostEnd, Arc::new(Failing));

        let err = dispatcher
            .dispatch(&HostEvent::SubmitPostEnd)
            .await
            .expect_err("listener fails");
        assert_eq!(err.event, EventName::SubmitPostEnd);
        assert!(matches!(err.source, StatsError::Repo(RepoError::Timeout)));
    }
}
