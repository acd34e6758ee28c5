//! Wire protocol for DebateHub's matchmaking and signaling coordinator
//!
//! Requests flow from clients to the coordinator, events flow back. Both are
//! closed tagged unions, generic over the opaque signal payload type `S` so
//! that transports can pick their own representation. With the `json` feature
//! enabled, [`JsonPeerRequest`] and [`JsonPeerEvent`] fix `S` to
//! [`serde_json::Value`] and round-trip through [`FromStr`]/[`Display`].
//!
//! On the wire, variants are kebab-case tags and payload fields are
//! camelCase:
//!
//! ```json
//! {"find-match": {"topic": "climate", "label": "Ada"}}
//! {"match-found": {"roomId": "...", "partnerId": "...", "initiator": true}}
//! "cancel-search"
//! ```

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque id of a single live connection
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub Uuid);

impl From<Uuid> for PeerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Id of a committed (or tentatively reserved) debate room
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of relayed handshake message
///
/// The coordinator forwards all four without inspecting the payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Signal,
    Offer,
    Answer,
    IceCandidate,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Signal => "signal",
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        };
        f.write_str(name)
    }
}

fn default_topic() -> String {
    "general".to_string()
}

fn default_label() -> String {
    "Anonymous".to_string()
}

/// Requests a client sends to the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PeerRequest<S> {
    /// Look for a debate partner on a topic
    FindMatch {
        #[serde(default = "default_topic")]
        topic: String,
        #[serde(default = "default_label")]
        label: String,
    },
    /// Accept the proposed pairing with `partner_id`
    AcceptMatch { partner_id: PeerId },
    /// Reject the proposed pairing with `partner_id`
    RejectMatch { partner_id: PeerId },
    /// Stop waiting for a partner
    CancelSearch,
    /// Relay an opaque handshake payload to another peer
    Signal {
        kind: SignalKind,
        target: PeerId,
        payload: S,
    },
    /// Leave the current debate room
    LeaveRoom,
    /// Explicit transport-drop notification
    Disconnect,
    KeepAlive,
}

/// Events the coordinator delivers to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PeerEvent<S> {
    /// Connection acknowledged; `id` is the peer's transient identity
    Connected { id: PeerId },
    /// No partner available yet, queued for the topic
    Waiting { message: String },
    /// A tentative pairing; sent to both candidates
    MatchRequest {
        partner_id: PeerId,
        partner_label: String,
        topic: String,
    },
    /// Acceptance recorded, the partner has not answered yet
    MatchAcceptedWaiting,
    /// Both sides accepted; exactly one of the two deliveries has
    /// `initiator` set
    MatchFound {
        room_id: RoomId,
        partner_id: PeerId,
        initiator: bool,
    },
    /// The pairing was turned down
    MatchRejected,
    SearchCancelled,
    /// Relayed handshake payload from `sender`
    Signal {
        kind: SignalKind,
        payload: S,
        sender: PeerId,
    },
    /// Ack to the member who left
    LeftRoom,
    /// The other room member left deliberately
    PeerLeft { user_id: PeerId },
    /// The other room member's transport dropped
    PeerDisconnected { user_id: PeerId },
}

/// Request with a JSON payload
#[cfg(feature = "json")]
pub type JsonPeerRequest = PeerRequest<serde_json::Value>;

/// Event with a JSON payload
#[cfg(feature = "json")]
pub type JsonPeerEvent = PeerEvent<serde_json::Value>;

#[cfg(feature = "json")]
impl FromStr for JsonPeerRequest {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

#[cfg(feature = "json")]
impl fmt::Display for JsonPeerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

#[cfg(feature = "json")]
impl FromStr for JsonPeerEvent {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

#[cfg(feature = "json")]
impl fmt::Display for JsonPeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}
