//! 实时消息
//!
//! Server-sent events. Each connection only receives the events addressed
//! to its own user, department or role.

use std::convert::Infallible;

use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};

use crate::{error::CrmError, notify::DomainEvent, perm::Actor, token::current_actor, AppState, Response};

pub fn events_router() -> Router<AppState> {
    Router::new().route("/events", get(events))
}

fn to_sse(actor: &Actor, event: Result<DomainEvent, BroadcastStreamRecvError>) -> Option<Event> {
    match event {
        Ok(event) if event.is_for(actor) => Event::default()
            .event(event.kind)
            .json_data(&event.data)
            .ok(),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::debug!(actor = %actor.id, skipped, "event subscriber lagged");
            None
        }
    }
}

async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    let actor = current_actor(&state, &headers).await?;
    let receiver = state
        .notifier
        .subscribe()
        .ok_or_else(|| Response::from(CrmError::not_found("Live events are not enabled")))?;
    tracing::debug!(actor = %actor.id, "event stream opened");
    let stream = BroadcastStream::new(receiver).filter_map(move |event| to_sse(&actor, event).map(Ok));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{notify::Audience, perm::Role};

    #[test]
    fn only_addressed_events_pass() {
        let am1 = Actor::new("am1", Role::Am, Some("d1"));
        let mine = DomainEvent::new("customer.created", json!({"id": "c1"}))
            .to(Audience::User("am1".into()));
        let theirs = DomainEvent::new("customer.created", json!({"id": "c2"}))
            .to(Audience::User("am2".into()));
        let department = DomainEvent::new("target.updated", json!({"amount": 1.0}))
            .to(Audience::Department("d1".into()));
        assert!(to_sse(&am1, Ok(mine)).is_some());
        assert!(to_sse(&am1, Ok(theirs)).is_none());
        assert!(to_sse(&am1, Ok(department)).is_some());
        assert!(to_sse(&am1, Err(BroadcastStreamRecvError::Lagged(3))).is_none());
    }
}
