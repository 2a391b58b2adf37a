//! Article rooms for live comment updates.
//!
//! Delivery is best effort: no backlog for late joiners, no retries, and a
//! subscriber that falls more than one room's capacity behind loses the
//! oldest events.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use domain::RoomEvent;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Rooms = HashMap<String, broadcast::Sender<RoomEvent>>;

struct Inner {
    rooms: RwLock<Rooms>,
    capacity: usize,
    shutdown: CancellationToken,
}

/// Registry of rooms, created at startup and closed on shutdown.
#[derive(Clone)]
pub struct RoomHub {
    inner: Arc<Inner>,
}

impl RoomHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                rooms: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Subscribes to `room`, creating it if needed. Only events published
    /// after this call are delivered.
    pub fn join(&self, room: &str) -> RoomSubscription {
        let rx = if self.inner.shutdown.is_cancelled() {
            // sender dropped right away: the stream ends on first poll
            broadcast::channel(1).1
        } else {
            let mut rooms = self.inner.rooms.write().unwrap_or_else(|e| e.into_inner());
            rooms
                .entry(room.to_string())
                .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
                .subscribe()
        };
        debug!("Joined room {}", room);
        RoomSubscription {
            room: room.to_string(),
            events: Some(BroadcastStream::new(rx)),
            hub: self.clone(),
        }
    }

    /// Delivers `event` to whoever is in its room right now. Returns the
    /// number of subscribers reached.
    pub fn publish(&self, event: RoomEvent) -> usize {
        let rooms = self.inner.rooms.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = rooms.get(&event.room) else {
            return 0;
        };
        let kind = event.kind;
        let room = event.room.clone();
        match tx.send(event) {
            Ok(reached) => {
                debug!("Published {} to room {} ({} subscribers)", kind.as_str(), room, reached);
                reached
            }
            Err(_) => 0,
        }
    }

    /// Ends every open subscription and refuses new ones.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        let mut rooms = self.inner.rooms.write().unwrap_or_else(|e| e.into_inner());
        rooms.clear();
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        let rooms = self.inner.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.get(room).map_or(0, |tx| tx.receiver_count())
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Called once the leaving receiver is gone.
    fn leave(&self, room: &str) {
        let mut rooms = self.inner.rooms.write().unwrap_or_else(|e| e.into_inner());
        if rooms.get(room).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(room);
            debug!("Room {} is empty, removed", room);
        }
    }
}

/// Membership in one room. Yields the room's events until the hub closes;
/// dropping it leaves the room.
pub struct RoomSubscription {
    room: String,
    /// `None` only while dropping.
    events: Option<BroadcastStream<RoomEvent>>,
    hub: RoomHub,
}

impl RoomSubscription {
    pub fn room(&self) -> &str {
        &self.room
    }
}

impl Stream for RoomSubscription {
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.hub.inner.shutdown.is_cancelled() {
                return Poll::Ready(None);
            }
            let Some(events) = this.events.as_mut() else {
                return Poll::Ready(None);
            };
            match Pin::new(events).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!("Subscriber of room {} lagged, {} events dropped", this.room, skipped);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.events.take();
        self.hub.leave(&self.room);
    }
}
