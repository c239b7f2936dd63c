// Change notifications. The hosted store this replaces pushed every
// write to connected listeners; here clients subscribe to a path
// prefix over SSE and re-fetch whatever the event names.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;
use crate::store::{EventKind, StoreEvent};

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub prefix: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(subscribe))
}

fn matches_prefix(event: &StoreEvent, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    event.path == prefix
        || event.path.starts_with(&format!("{}/", prefix))
        // A write above the prefix (subtree replace) also invalidates it.
        || prefix.starts_with(&format!("{}/", event.path))
}

async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let prefix = query.prefix;
    let stream = BroadcastStream::new(state.store.subscribe()).filter_map(move |item| {
        let prefix = prefix.clone();
        async move {
            // Lagged receivers drop events; clients resync on the next one.
            let event = item.ok()?;
            if !matches_prefix(&event, &prefix) {
                return None;
            }
            let kind = match event.kind {
                EventKind::Put => "put",
                EventKind::Delete => "delete",
            };
            let data = json!({ "path": event.path, "kind": kind });
            Some(Ok(Event::default().event("change").data(data.to_string())))
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(path: &str) -> StoreEvent {
        StoreEvent {
            path: path.to_string(),
            kind: EventKind::Put,
        }
    }

    #[test]
    fn prefix_matches_subtree_and_ancestors() {
        assert!(matches_prefix(&put("codes/p1/likes/u1"), "codes"));
        assert!(matches_prefix(&put("codes"), "codes"));
        assert!(matches_prefix(&put("codes"), "codes/p1"));
        assert!(!matches_prefix(&put("reviews/r1"), "codes"));
        assert!(!matches_prefix(&put("codestream/x"), "codes"));
    }

    #[test]
    fn empty_prefix_matches_everything() {
        assert!(matches_prefix(&put("anything/at/all"), ""));
    }
}
