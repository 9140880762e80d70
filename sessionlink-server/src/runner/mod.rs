//! Run loop contract.
//!
//! A runner takes one user turn for a session and produces the events of that
//! turn. Runners may hand back their events already materialised, as a future,
//! or as a stream; [`RunOutcome::collect`] flattens all three into one ordered
//! sequence.

pub mod chat;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, TryStreamExt};
use sessionlink_core::{Content, Event};

pub use chat::ChatRunner;

/// What a runner returns for one turn.
pub enum RunOutcome {
    Ready(Vec<Event>),
    Pending(BoxFuture<'static, anyhow::Result<Vec<Event>>>),
    Streaming(BoxStream<'static, anyhow::Result<Event>>),
}

impl RunOutcome {
    /// Materialise the events in the order the runner produced them.
    /// The first error aborts the whole turn.
    pub async fn collect(self) -> anyhow::Result<Vec<Event>> {
        match self {
            RunOutcome::Ready(events) => Ok(events),
            RunOutcome::Pending(fut) => fut.await,
            RunOutcome::Streaming(stream) => stream.try_collect().await,
        }
    }
}

impl From<Vec<Event>> for RunOutcome {
    fn from(events: Vec<Event>) -> Self {
        RunOutcome::Ready(events)
    }
}

/// Agent execution for a single turn.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> anyhow::Result<RunOutcome>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            ..Event::default()
        }
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_collect_ready() {
        let events = RunOutcome::from(vec![event("a"), event("b")])
            .collect()
            .await
            .unwrap();
        assert_eq!(ids(&events), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_collect_pending() {
        let outcome = RunOutcome::Pending(Box::pin(async { Ok(vec![event("a"), event("b")]) }));
        let events = outcome.collect().await.unwrap();
        assert_eq!(ids(&events), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_collect_streaming_preserves_order() {
        let items = vec![Ok(event("a")), Ok(event("b")), Ok(event("c"))];
        let outcome = RunOutcome::Streaming(Box::pin(stream::iter(items)));
        let events = outcome.collect().await.unwrap();
        assert_eq!(ids(&events), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_collect_streaming_error_aborts() {
        let items = vec![Ok(event("a")), Err(anyhow::anyhow!("model went away"))];
        let outcome = RunOutcome::Streaming(Box::pin(stream::iter(items)));
        let err = outcome.collect().await.unwrap_err();
        assert_eq!(err.to_string(), "model went away");
    }
}
