//! Connection registry and outbound fan-out.
//!
//! Each WebSocket connection registers a bounded frame queue here. The
//! engine serializes every outbound message once and shares the string;
//! per-connection delivery uses `try_send`, so a client whose queue is full
//! simply misses that frame instead of buffering without bound.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::game::events::{GameEvent, BROADCAST_EVENT_KINDS};
use crate::ws::protocol::{ServerMsg, WidgetKey};

/// Outbound queue capacity per connection. A full queue marks the client as
/// slow; frames are dropped for that client only.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Per-connection send handle and subscription state
#[derive(Debug)]
pub struct Connection {
    pub tx: mpsc::Sender<Arc<str>>,
    /// The player this connection is bound to after `cmd:join`
    pub player_id: Option<Uuid>,
    /// HUD widget keys this connection subscribed to
    pub hud: HashSet<WidgetKey>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: DashMap<Uuid, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh connection, returning the receive half of its
    /// outbound queue.
    pub fn register(&self, conn_id: Uuid) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.conns.insert(
            conn_id,
            Connection {
                tx,
                player_id: None,
                hud: HashSet::new(),
            },
        );
        rx
    }

    pub fn remove(&self, conn_id: Uuid) -> Option<Uuid> {
        self.conns.remove(&conn_id).and_then(|(_, c)| c.player_id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    pub fn bind_player(&self, conn_id: Uuid, player_id: Uuid) {
        if let Some(mut conn) = self.conns.get_mut(&conn_id) {
            conn.player_id = Some(player_id);
        }
    }

    pub fn player_of(&self, conn_id: Uuid) -> Option<Uuid> {
        self.conns.get(&conn_id).and_then(|c| c.player_id)
    }

    /// Drop the player binding after an explicit `cmd:leave`; the connection
    /// itself stays open and may join again.
    pub fn clear_player(&self, conn_id: Uuid) {
        if let Some(mut conn) = self.conns.get_mut(&conn_id) {
            conn.player_id = None;
        }
    }

    /// Update the HUD subscription set; returns the widgets that were
    /// actually added (for initial snapshots). The set semantics make a
    /// duplicate subscribe a no-op.
    pub fn subscribe_hud(&self, conn_id: Uuid, widgets: &[WidgetKey]) -> Vec<WidgetKey> {
        let Some(mut conn) = self.conns.get_mut(&conn_id) else {
            return Vec::new();
        };
        widgets
            .iter()
            .copied()
            .filter(|w| conn.hud.insert(*w))
            .collect()
    }

    pub fn unsubscribe_hud(&self, conn_id: Uuid, widgets: &[WidgetKey]) {
        if let Some(mut conn) = self.conns.get_mut(&conn_id) {
            for w in widgets {
                conn.hud.remove(w);
            }
        }
    }

    fn push(&self, conn: &Connection, frame: &Arc<str>) {
        if conn.tx.try_send(frame.clone()).is_err() {
            // Slow or closed client: drop the frame for this connection.
            debug!("outbound queue full or closed, dropping frame");
        }
    }

    /// Fan a simulation event out to every connection. Serialization happens
    /// once; kinds outside the allowlist stay server-internal.
    pub fn broadcast_event(&self, event: &GameEvent) {
        if !BROADCAST_EVENT_KINDS.contains(&event.kind()) {
            return;
        }
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                debug!(error = %e, "failed to serialize broadcast event");
                return;
            }
        };
        let frame: Arc<str> = json.into();
        for conn in self.conns.iter() {
            self.push(&conn, &frame);
        }
    }

    /// Send a targeted frame to one connection.
    pub fn send_to(&self, conn_id: Uuid, msg: &ServerMsg) {
        let Some(conn) = self.conns.get(&conn_id) else {
            return;
        };
        if let Ok(json) = serde_json::to_string(msg) {
            let frame: Arc<str> = json.into();
            self.push(&conn, &frame);
        }
    }

    /// Send a raw pre-serialized frame to one connection.
    pub fn send_raw_to(&self, conn_id: Uuid, frame: &Arc<str>) {
        if let Some(conn) = self.conns.get(&conn_id) {
            self.push(&conn, frame);
        }
    }

    /// Send a private frame to the connection bound to a player.
    pub fn send_to_player(&self, player_id: Uuid, msg: &ServerMsg) {
        let conn_id = self
            .conns
            .iter()
            .find(|c| c.player_id == Some(player_id))
            .map(|c| *c.key());
        if let Some(conn_id) = conn_id {
            self.send_to(conn_id, msg);
        }
    }

    /// Send a HUD frame to every connection subscribed to the widget.
    pub fn send_hud(&self, widget: WidgetKey, msg: &ServerMsg) {
        let json = match serde_json::to_string(msg) {
            Ok(j) => j,
            Err(_) => return,
        };
        let frame: Arc<str> = json.into();
        for conn in self.conns.iter() {
            if conn.hud.contains(&widget) {
                self.push(&conn, &frame);
            }
        }
    }

    /// Any subscriber for the widget at all? Lets the HUD skip building
    /// snapshots nobody is watching.
    pub fn has_hud_subscriber(&self, widget: WidgetKey) -> bool {
        self.conns.iter().any(|c| c.hud.contains(&widget))
    }
}
