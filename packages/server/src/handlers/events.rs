use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use common::events::{DomainEvent, SseEvent};

use crate::error::AppError;
use crate::rooms::RoomManager;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub room_id: i64,
    pub player_id: i64,
}

/// SSE endpoint. Subscribing registers the client's listener sink with the
/// room manager and enqueues a `PlayerJoined`; dropping the stream (client
/// gone) deregisters it and enqueues a synthetic `PlayerLeft`.
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Response, AppError> {
    let EventsQuery { room_id, player_id } = query;

    let manager = state
        .rooms
        .get_by_id(room_id)
        .ok_or(AppError::NotFound("room"))?;

    let receiver = manager.subscribe(player_id);
    info!(player_id, room_id, "SSE connection established");

    if !manager.try_enqueue(DomainEvent::PlayerJoined { player_id, room_id }) {
        warn!(player_id, room_id, "room inbox full, join event dropped");
    }

    let stream = ClientStream {
        inner: ReceiverStream::new(receiver),
        _guard: ListenerGuard { manager, player_id },
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Sse::new(stream),
    )
        .into_response())
}

/// Deregisters the listener and enqueues the synthetic leave event once the
/// client disconnects, whichever way the stream ends.
struct ListenerGuard {
    manager: Arc<RoomManager>,
    player_id: i64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let room_id = self.manager.room_id;
        self.manager.unsubscribe(self.player_id);
        if !self.manager.try_enqueue(DomainEvent::PlayerLeft {
            player_id: self.player_id,
            room_id,
        }) {
            warn!(player_id = self.player_id, room_id, "room inbox full, leave event dropped");
        }
        info!(player_id = self.player_id, room_id, "SSE connection closed");
    }
}

/// Adapts the listener sink into SSE frames:
/// `event: <TYPE>` + `data: <JSON-encoded event>`.
struct ClientStream {
    inner: ReceiverStream<SseEvent>,
    _guard: ListenerGuard,
}

impl Stream for ClientStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let data = serde_json::to_string(&event).unwrap_or_default();
                let frame = Event::default().event(event.event_type.as_str()).data(data);
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
