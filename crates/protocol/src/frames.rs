//! WebSocket frame types (server -> client).
//!
//! Every frame is `{type, data, timestamp}`. `state_update` frames carry
//! delta fragments; the client applies them to a locally cached snapshot
//! obtained via `getGameState`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use grimbox_domain::GameEvent;

use crate::methods::{CombatFragment, PlayerFragment, WorldFragment};

/// Frame payload, tagged by `type` with the body under `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FramePayload {
    /// Echo of an RPC response delivered over the socket
    RpcResponse(Value),
    /// Incremental state delta
    StateUpdate(StateUpdate),
    /// Informational error; does not terminate the session
    Error { message: String, code: Option<i32> },
}

/// Delta fragments plus the events that produced them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<WorldFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat: Option<CombatFragment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<GameEvent>,
}

/// One outbound WebSocket frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsFrame {
    #[serde(flatten)]
    pub payload: FramePayload,
    pub timestamp: DateTime<Utc>,
}

impl WsFrame {
    pub fn state_update(update: StateUpdate) -> Self {
        Self {
            payload: FramePayload::StateUpdate(update),
            timestamp: Utc::now(),
        }
    }

    pub fn event(event: GameEvent) -> Self {
        Self::state_update(StateUpdate {
            events: vec![event],
            ..StateUpdate::default()
        })
    }

    pub fn rpc_response(response: Value) -> Self {
        Self {
            payload: FramePayload::RpcResponse(response),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, code: Option<i32>) -> Self {
        Self {
            payload: FramePayload::Error {
                message: message.into(),
                code,
            },
            timestamp: Utc::now(),
        }
    }

    /// Whether the fan-out may shed this frame under backpressure.
    /// Only state updates whose every event is droppable qualify;
    /// rpc_response, error, session-lifecycle, and combat-transition
    /// frames are always kept.
    pub fn is_droppable(&self) -> bool {
        match &self.payload {
            FramePayload::StateUpdate(update) => {
                !update.events.is_empty()
                    && update.events.iter().all(|event| event.kind.is_droppable())
            }
            FramePayload::RpcResponse(_) | FramePayload::Error { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grimbox_domain::{EventKind, Position, SessionId};

    #[test]
    fn test_frame_wire_shape() {
        let frame = WsFrame::error("boom", Some(-32603));
        let value = serde_json::to_value(&frame).expect("serializes");
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["message"], "boom");
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_droppable_classification() {
        let moved = WsFrame::event(GameEvent::new(EventKind::EntityMoved {
            from: Position::new(0, 0, 0),
            to: Position::new(1, 0, 0),
        }));
        assert!(moved.is_droppable());

        let ended = WsFrame::event(GameEvent::new(EventKind::SessionEnded {
            session: SessionId::new(),
            reason: "ttl".into(),
        }));
        assert!(!ended.is_droppable());

        let rpc = WsFrame::rpc_response(serde_json::json!({"ok": true}));
        assert!(!rpc.is_droppable());
    }

    #[test]
    fn test_empty_state_update_is_not_droppable() {
        let frame = WsFrame::state_update(StateUpdate::default());
        assert!(!frame.is_droppable());
    }
}
