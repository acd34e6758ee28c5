//! Matchmaking and room state for the DebateHub signaling coordinator
//!
//! This module owns the four shared stores: connected peers, the waiting
//! queue, tentative pairings awaiting mutual acceptance, and committed rooms.
//! State is persisted to a JSON file between requests; every operation is one
//! load, mutate, save cycle, so under the single-threaded WASI runtime each
//! inbound event runs to completion against a consistent snapshot.

use crate::error::SignalingError;
use debatehub_protocol::{JsonPeerEvent, JsonPeerRequest, PeerId, PeerRequest, RoomId, SignalKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Default path of the state file
pub const DEFAULT_STATE_FILE: &str = "debatehub_state.json";

/// What a connection is currently attached to.
///
/// A connection holds at most one attachment at a time: a waiting-queue slot,
/// a tentative pairing, or a committed room.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
enum Attachment {
    #[default]
    Idle,
    Waiting,
    Proposed(RoomId),
    Joined(RoomId),
}

/// Per-connection state with pending events
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PeerState {
    label: String,
    /// Topic of the most recent match request; rejections re-queue under it
    topic: String,
    attachment: Attachment,
    /// Pending events to be delivered to this peer
    events: VecDeque<String>,
}

impl Default for PeerState {
    fn default() -> Self {
        Self {
            label: "Anonymous".to_string(),
            topic: "general".to_string(),
            attachment: Attachment::Idle,
            events: VecDeque::new(),
        }
    }
}

/// A connection waiting for a partner on a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WaitingEntry {
    topic: String,
    peer: PeerId,
    label: String,
}

/// Acceptance progress of a tentative pairing.
///
/// Resolution and abort are terminal: the record is removed, either into a
/// committed room or into nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum ProposalPhase {
    Proposed,
    PartiallyAccepted { first: PeerId },
}

/// A tentative pairing awaiting mutual acceptance
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Proposal {
    pair: [PeerId; 2],
    phase: ProposalPhase,
}

impl Proposal {
    fn involves(&self, id: PeerId) -> bool {
        self.pair.contains(&id)
    }

    fn is_pair(&self, a: PeerId, b: PeerId) -> bool {
        a != b && self.involves(a) && self.involves(b)
    }
}

/// A committed pairing of exactly two connections
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Room {
    members: [PeerId; 2],
    /// The member who accepted first; breaks symmetry in handshake setup
    initiator: PeerId,
}

/// Serializable state
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct InnerState {
    /// Map of peer id -> peer state
    peers: HashMap<PeerId, PeerState>,
    /// Waiting queue, scanned in insertion order so the earliest entry for a
    /// topic always matches first
    waiting: VecDeque<WaitingEntry>,
    /// Tentative pairings keyed by their reserved room id
    proposals: HashMap<RoomId, Proposal>,
    /// Committed rooms
    rooms: HashMap<RoomId, Room>,
}

impl InnerState {
    /// Load state from file, or create default if file doesn't exist
    fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("state file {path} is unreadable, starting fresh: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save state to file
    fn save(&self, path: &str) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::error!("failed to persist state to {path}: {e}");
                }
            }
            Err(e) => log::error!("failed to serialize state: {e}"),
        }
    }

    /// Queue an event for a peer
    fn queue_event(&mut self, id: PeerId, event: JsonPeerEvent) -> Result<(), SignalingError> {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.events.push_back(event.to_string());
                Ok(())
            }
            None => Err(SignalingError::UnknownPeer),
        }
    }

    fn attachment(&self, id: PeerId) -> Option<Attachment> {
        self.peers.get(&id).map(|p| p.attachment.clone())
    }

    fn set_attachment(&mut self, id: PeerId, attachment: Attachment) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.attachment = attachment;
        }
    }

    /// Register a new connection, or drain the event queue of a live one.
    ///
    /// Returns the peer id and any pending events. An unknown or absent id
    /// becomes a fresh registration.
    fn connect_or_poll(&mut self, peer_id: Option<PeerId>) -> (PeerId, Vec<String>) {
        if let Some(id) = peer_id
            && let Some(peer) = self.peers.get_mut(&id)
        {
            return (id, peer.events.drain(..).collect());
        }

        let id = PeerId::from(uuid::Uuid::new_v4());
        let mut peer = PeerState::default();
        peer.events
            .push_back(JsonPeerEvent::Connected { id }.to_string());
        let events = peer.events.drain(..).collect();
        self.peers.insert(id, peer);
        log::info!("client connected: {id}");
        (id, events)
    }

    /// Look for a partner on `topic`; queue the connection if none is waiting.
    fn find_match(&mut self, id: PeerId, topic: String, label: String) {
        match self.attachment(id) {
            None => return,
            Some(Attachment::Proposed(_)) | Some(Attachment::Joined(_)) => {
                log::warn!("find-match from {id} ignored: already pairing or in a room");
                return;
            }
            // A repeated search replaces the previous entry outright.
            Some(Attachment::Waiting) => self.waiting.retain(|w| w.peer != id),
            Some(Attachment::Idle) => {}
        }
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.topic = topic.clone();
            peer.label = label.clone();
            peer.attachment = Attachment::Idle;
        }
        log::info!("user {id} ({label}) looking for match on topic: {topic}");

        // Earliest waiting entry on this topic wins.
        if let Some(pos) = self
            .waiting
            .iter()
            .position(|w| w.topic == topic && w.peer != id)
            && let Some(entry) = self.waiting.remove(pos)
        {
            self.propose(entry, id, topic, label);
            return;
        }

        self.waiting.push_back(WaitingEntry {
            topic: topic.clone(),
            peer: id,
            label: label.clone(),
        });
        self.set_attachment(id, Attachment::Waiting);
        let _ = self.queue_event(
            id,
            JsonPeerEvent::Waiting {
                message: format!("Looking for a debate partner on {topic}..."),
            },
        );
        log::info!("user {id} ({label}) added to waiting list for topic: {topic}");
    }

    /// Turn a waiting entry plus a new seeker into a tentative pairing and
    /// ask both sides to confirm.
    fn propose(&mut self, entry: WaitingEntry, seeker: PeerId, topic: String, seeker_label: String) {
        let room_id = RoomId(uuid::Uuid::new_v4().to_string());
        let partner = entry.peer;
        self.proposals.insert(
            room_id.clone(),
            Proposal {
                pair: [partner, seeker],
                phase: ProposalPhase::Proposed,
            },
        );
        self.set_attachment(partner, Attachment::Proposed(room_id.clone()));
        self.set_attachment(seeker, Attachment::Proposed(room_id));
        let _ = self.queue_event(
            partner,
            JsonPeerEvent::MatchRequest {
                partner_id: seeker,
                partner_label: seeker_label.clone(),
                topic: topic.clone(),
            },
        );
        let _ = self.queue_event(
            seeker,
            JsonPeerEvent::MatchRequest {
                partner_id: partner,
                partner_label: entry.label.clone(),
                topic: topic.clone(),
            },
        );
        log::info!(
            "match request sent: {seeker} ({seeker_label}) <-> {partner} ({}) on topic: {topic}",
            entry.label
        );
    }

    /// Drop the waiting entry, if any, and acknowledge the cancellation.
    fn cancel_search(&mut self, id: PeerId) {
        let before = self.waiting.len();
        self.waiting.retain(|w| w.peer != id);
        if self.waiting.len() < before {
            self.set_attachment(id, Attachment::Idle);
            let _ = self.queue_event(id, JsonPeerEvent::SearchCancelled);
            log::info!("user {id} cancelled search");
        }
    }

    /// Find the tentative pairing covering exactly `{a, b}`, through either
    /// side's attachment.
    fn pending_for_pair(&self, a: PeerId, b: PeerId) -> Option<(RoomId, ProposalPhase)> {
        for id in [a, b] {
            if let Some(Attachment::Proposed(room_id)) = self.attachment(id)
                && let Some(proposal) = self.proposals.get(&room_id)
                && proposal.is_pair(a, b)
            {
                return Some((room_id, proposal.phase.clone()));
            }
        }
        None
    }

    /// Record `id`'s acceptance of a pairing with `partner`.
    ///
    /// The first acceptance parks the pairing as partially accepted and acks
    /// the acceptor; the partner's acceptance then commits the room, with the
    /// first acceptor as initiator. The whole call is one atomic step.
    fn accept(&mut self, id: PeerId, partner: PeerId) {
        if !self.peers.contains_key(&id) {
            return;
        }
        if partner == id || !self.peers.contains_key(&partner) {
            log::warn!("accept from {id} ignored: partner {partner} is not connected");
            return;
        }

        match self.pending_for_pair(id, partner) {
            Some((room_id, ProposalPhase::Proposed)) => {
                if let Some(proposal) = self.proposals.get_mut(&room_id) {
                    proposal.phase = ProposalPhase::PartiallyAccepted { first: id };
                }
                let _ = self.queue_event(id, JsonPeerEvent::MatchAcceptedWaiting);
            }
            Some((room_id, ProposalPhase::PartiallyAccepted { first })) if first == partner => {
                self.commit(room_id, first, id);
            }
            Some(_) => {
                // Repeated acceptance from the same side; still waiting on
                // the partner.
            }
            None => {
                // No pairing on record for {id, partner}. The acceptor opens
                // one, provided it is free to pair.
                match self.attachment(id) {
                    Some(Attachment::Idle) => {}
                    Some(Attachment::Waiting) => self.waiting.retain(|w| w.peer != id),
                    _ => {
                        log::warn!("accept from {id} ignored: already pairing or in a room");
                        return;
                    }
                }
                let room_id = RoomId(uuid::Uuid::new_v4().to_string());
                self.proposals.insert(
                    room_id.clone(),
                    Proposal {
                        pair: [id, partner],
                        phase: ProposalPhase::PartiallyAccepted { first: id },
                    },
                );
                self.set_attachment(id, Attachment::Proposed(room_id));
                let _ = self.queue_event(id, JsonPeerEvent::MatchAcceptedWaiting);
            }
        }
    }

    /// Resolve a fully accepted pairing into a room.
    fn commit(&mut self, room_id: RoomId, initiator: PeerId, second: PeerId) {
        self.proposals.remove(&room_id);
        // A member re-queued by an earlier rejection may still hold a
        // waiting slot; joining a room consumes it.
        self.waiting
            .retain(|w| w.peer != initiator && w.peer != second);
        self.rooms.insert(
            room_id.clone(),
            Room {
                members: [initiator, second],
                initiator,
            },
        );
        self.set_attachment(initiator, Attachment::Joined(room_id.clone()));
        self.set_attachment(second, Attachment::Joined(room_id.clone()));
        let _ = self.queue_event(
            initiator,
            JsonPeerEvent::MatchFound {
                room_id: room_id.clone(),
                partner_id: second,
                initiator: true,
            },
        );
        let _ = self.queue_event(
            second,
            JsonPeerEvent::MatchFound {
                room_id: room_id.clone(),
                partner_id: initiator,
                initiator: false,
            },
        );
        log::info!("match accepted: {initiator} <-> {second} in room {room_id}");
    }

    /// Turn down a pairing. Both sides hear about it; only the rejecting
    /// side goes back to the waiting queue, under its recorded topic.
    fn reject(&mut self, id: PeerId, partner: PeerId) {
        if !self.peers.contains_key(&id) {
            return;
        }
        match self.attachment(id) {
            Some(Attachment::Joined(_)) => {
                log::warn!("reject from {id} ignored: already in a room");
                return;
            }
            Some(Attachment::Proposed(_)) if self.pending_for_pair(id, partner).is_none() => {
                log::warn!("reject from {id} ignored: pairing with someone else");
                return;
            }
            _ => {}
        }

        if let Some((room_id, _)) = self.pending_for_pair(id, partner) {
            self.proposals.remove(&room_id);
            for side in [id, partner] {
                if self.attachment(side) == Some(Attachment::Proposed(room_id.clone())) {
                    self.set_attachment(side, Attachment::Idle);
                }
            }
        }

        let _ = self.queue_event(partner, JsonPeerEvent::MatchRejected);
        let _ = self.queue_event(id, JsonPeerEvent::MatchRejected);
        log::info!("match rejected: {id} rejected {partner}");

        if let Some(peer) = self.peers.get(&id) {
            let entry = WaitingEntry {
                topic: peer.topic.clone(),
                peer: id,
                label: peer.label.clone(),
            };
            // A repeated rejection must not leave two entries behind.
            self.waiting.retain(|w| w.peer != id);
            self.waiting.push_back(entry);
            self.set_attachment(id, Attachment::Waiting);
        }
    }

    /// Forward an opaque handshake payload to `target` verbatim.
    ///
    /// A message to a peer that is not connected is dropped without
    /// surfacing anything to the sender; a debug line is the only trace.
    fn relay(&mut self, kind: SignalKind, sender: PeerId, target: PeerId, payload: Value) {
        let event = JsonPeerEvent::Signal {
            kind,
            payload,
            sender,
        };
        if self.queue_event(target, event).is_err() {
            log::debug!("dropped {kind} from {sender}: target {target} is not connected");
        }
    }

    /// Leave the current room deliberately.
    fn leave(&mut self, id: PeerId) {
        let Some(Attachment::Joined(room_id)) = self.attachment(id) else {
            return;
        };
        self.teardown(id, &room_id, JsonPeerEvent::PeerLeft { user_id: id });
        self.set_attachment(id, Attachment::Idle);
        let _ = self.queue_event(id, JsonPeerEvent::LeftRoom);
        log::info!("user {id} left room {room_id}");
    }

    /// Tear the room down and tell whoever stays behind.
    ///
    /// A room only exists with both members attached, so one member's
    /// departure voids it in the same step.
    fn teardown(&mut self, id: PeerId, room_id: &RoomId, notice: JsonPeerEvent) {
        let Some(room) = self.rooms.remove(room_id) else {
            return;
        };
        for other in room.members.into_iter().filter(|m| *m != id) {
            if self.attachment(other) == Some(Attachment::Joined(room_id.clone())) {
                self.set_attachment(other, Attachment::Idle);
            }
            let _ = self.queue_event(other, notice.clone());
        }
    }

    /// Remove a connection and purge it from every other store.
    fn disconnect(&mut self, id: PeerId) {
        let Some(peer) = self.peers.remove(&id) else {
            return;
        };
        log::info!("client disconnected: {id}");

        self.waiting.retain(|w| w.peer != id);

        // Abort every tentative pairing the connection appears in, on
        // either side.
        let aborted: Vec<RoomId> = self
            .proposals
            .iter()
            .filter(|(_, p)| p.involves(id))
            .map(|(room_id, _)| room_id.clone())
            .collect();
        for room_id in aborted {
            if let Some(proposal) = self.proposals.remove(&room_id) {
                for other in proposal.pair.into_iter().filter(|o| *o != id) {
                    if self.attachment(other) == Some(Attachment::Proposed(room_id.clone())) {
                        self.set_attachment(other, Attachment::Idle);
                    }
                }
            }
        }

        if let Attachment::Joined(room_id) = peer.attachment {
            self.teardown(id, &room_id, JsonPeerEvent::PeerDisconnected { user_id: id });
        }
    }
}

/// The main server state - loads/saves to a JSON file
#[derive(Debug, Clone)]
pub struct ServerState {
    state_file: String,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Create a server state handle backed by the default state file
    pub fn new() -> Self {
        Self::with_state_file(DEFAULT_STATE_FILE)
    }

    /// Create a server state handle backed by `path`
    pub fn with_state_file(path: impl Into<String>) -> Self {
        Self {
            state_file: path.into(),
        }
    }

    /// Register a new connection or drain a live one's pending events.
    ///
    /// Returns `(peer_id, pending_events)`.
    pub fn connect_or_poll(&self, peer_id: Option<PeerId>) -> (PeerId, Vec<String>) {
        let mut state = InnerState::load(&self.state_file);
        let result = state.connect_or_poll(peer_id);
        state.save(&self.state_file);
        result
    }

    /// Apply one inbound request as a single atomic step.
    ///
    /// Fails only when the sender itself is not a live connection; every
    /// other stale or malformed operation is ignored locally without
    /// touching other connections' bookkeeping.
    pub fn apply(&self, sender: PeerId, request: JsonPeerRequest) -> Result<(), SignalingError> {
        let mut state = InnerState::load(&self.state_file);
        if !state.peers.contains_key(&sender) {
            return Err(SignalingError::UnknownPeer);
        }
        match request {
            PeerRequest::FindMatch { topic, label } => state.find_match(sender, topic, label),
            PeerRequest::AcceptMatch { partner_id } => state.accept(sender, partner_id),
            PeerRequest::RejectMatch { partner_id } => state.reject(sender, partner_id),
            PeerRequest::CancelSearch => state.cancel_search(sender),
            PeerRequest::Signal {
                kind,
                target,
                payload,
            } => state.relay(kind, sender, target, payload),
            PeerRequest::LeaveRoom => state.leave(sender),
            PeerRequest::Disconnect => state.disconnect(sender),
            PeerRequest::KeepAlive => {}
        }
        state.save(&self.state_file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn connect(state: &mut InnerState) -> PeerId {
        let (id, events) = state.connect_or_poll(None);
        assert_eq!(
            decode(&events),
            vec![JsonPeerEvent::Connected { id }],
            "a fresh connection is acked exactly once"
        );
        id
    }

    fn drain(state: &mut InnerState, id: PeerId) -> Vec<JsonPeerEvent> {
        let (returned, events) = state.connect_or_poll(Some(id));
        assert_eq!(returned, id);
        decode(&events)
    }

    fn decode(events: &[String]) -> Vec<JsonPeerEvent> {
        events
            .iter()
            .map(|e| JsonPeerEvent::from_str(e).unwrap())
            .collect()
    }

    /// Two connections proposed to each other on a topic, queues drained.
    fn proposed_pair(state: &mut InnerState, topic: &str) -> (PeerId, PeerId) {
        let a = connect(state);
        let b = connect(state);
        state.find_match(a, topic.to_string(), "Ada".to_string());
        state.find_match(b, topic.to_string(), "Ben".to_string());
        drain(state, a);
        drain(state, b);
        (a, b)
    }

    /// A committed room, queues drained.
    fn committed_room(state: &mut InnerState) -> (PeerId, PeerId, RoomId) {
        let (a, b) = proposed_pair(state, "climate");
        state.accept(a, b);
        state.accept(b, a);
        drain(state, a);
        drain(state, b);
        let (room_id, room) = state.rooms.iter().next().unwrap();
        assert_eq!(room.initiator, a);
        (a, b, room_id.clone())
    }

    #[test]
    fn lone_seeker_waits() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        let events = drain(&mut state, a);
        assert_eq!(
            events,
            vec![JsonPeerEvent::Waiting {
                message: "Looking for a debate partner on climate...".to_string()
            }]
        );
        assert_eq!(state.waiting.len(), 1);
    }

    #[test]
    fn second_seeker_triggers_match_request_to_both() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        let b = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        drain(&mut state, a);
        state.find_match(b, "climate".to_string(), "Ben".to_string());

        assert_eq!(
            drain(&mut state, a),
            vec![JsonPeerEvent::MatchRequest {
                partner_id: b,
                partner_label: "Ben".to_string(),
                topic: "climate".to_string(),
            }]
        );
        assert_eq!(
            drain(&mut state, b),
            vec![JsonPeerEvent::MatchRequest {
                partner_id: a,
                partner_label: "Ada".to_string(),
                topic: "climate".to_string(),
            }]
        );
        assert!(state.waiting.is_empty());
        assert_eq!(state.proposals.len(), 1);
    }

    #[test]
    fn topics_do_not_cross_match() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        let b = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        state.find_match(b, "economics".to_string(), "Ben".to_string());
        assert_eq!(state.waiting.len(), 2);
        assert!(state.proposals.is_empty());
    }

    #[test]
    fn earliest_waiting_entry_on_a_topic_matches_first() {
        let mut state = InnerState::default();
        let (a, b) = proposed_pair(&mut state, "climate");
        // c queues up while a and b are still deciding.
        let c = connect(&mut state);
        state.find_match(c, "climate".to_string(), "Cy".to_string());
        drain(&mut state, c);
        // a's rejection re-queues a behind c.
        state.reject(a, b);
        drain(&mut state, a);
        drain(&mut state, b);
        assert_eq!(state.waiting.len(), 2);
        assert_eq!(state.waiting[0].peer, c);

        // b searches again and must get c, the earlier entry, not a.
        state.find_match(b, "climate".to_string(), "Ben".to_string());
        assert_eq!(
            drain(&mut state, b),
            vec![JsonPeerEvent::MatchRequest {
                partner_id: c,
                partner_label: "Cy".to_string(),
                topic: "climate".to_string(),
            }]
        );
        assert_eq!(state.waiting.len(), 1);
        assert_eq!(state.waiting[0].peer, a);
    }

    #[test]
    fn duplicate_find_match_replaces_the_entry() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        state.find_match(a, "economics".to_string(), "Ada".to_string());
        assert_eq!(state.waiting.len(), 1);
        assert_eq!(state.waiting[0].topic, "economics");
        // A seeker on the old topic finds nobody.
        let b = connect(&mut state);
        state.find_match(b, "climate".to_string(), "Ben".to_string());
        assert!(state.proposals.is_empty());
        assert_eq!(state.waiting.len(), 2);
    }

    #[test]
    fn find_match_does_not_pair_a_connection_with_itself() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        assert!(state.proposals.is_empty());
        assert_eq!(state.waiting.len(), 1);
    }

    #[test]
    fn cancel_before_match_leaves_no_trace() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        drain(&mut state, a);
        state.cancel_search(a);
        assert_eq!(drain(&mut state, a), vec![JsonPeerEvent::SearchCancelled]);
        assert!(state.waiting.is_empty());

        // A later seeker on the same topic never hears about a.
        let b = connect(&mut state);
        state.find_match(b, "climate".to_string(), "Ben".to_string());
        let events = drain(&mut state, b);
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, JsonPeerEvent::MatchRequest { .. })),
            "no match-request may reference a cancelled search"
        );
    }

    #[test]
    fn cancel_without_entry_is_silent() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        state.cancel_search(a);
        assert!(drain(&mut state, a).is_empty());
    }

    #[test]
    fn mutual_acceptance_commits_exactly_one_room() {
        let mut state = InnerState::default();
        let (a, b) = proposed_pair(&mut state, "climate");

        state.accept(a, b);
        assert_eq!(drain(&mut state, a), vec![JsonPeerEvent::MatchAcceptedWaiting]);
        assert!(drain(&mut state, b).is_empty(), "only the first acceptor is acked");

        state.accept(b, a);
        let a_events = drain(&mut state, a);
        let b_events = drain(&mut state, b);
        assert_eq!(a_events.len(), 1, "match-found is delivered exactly once");
        assert_eq!(b_events.len(), 1, "match-found is delivered exactly once");
        let JsonPeerEvent::MatchFound {
            room_id: a_room,
            partner_id: a_partner,
            initiator: a_init,
        } = a_events[0].clone()
        else {
            panic!("expected match-found, got {a_events:?}");
        };
        let JsonPeerEvent::MatchFound {
            room_id: b_room,
            partner_id: b_partner,
            initiator: b_init,
        } = b_events[0].clone()
        else {
            panic!("expected match-found, got {b_events:?}");
        };
        assert_eq!(a_room, b_room);
        assert_eq!(a_partner, b);
        assert_eq!(b_partner, a);
        assert!(a_init ^ b_init, "exactly one side is the initiator");
        assert!(a_init, "the first acceptor initiates");

        assert_eq!(state.rooms.len(), 1);
        assert!(state.proposals.is_empty());
    }

    #[test]
    fn double_accept_is_idempotent() {
        let mut state = InnerState::default();
        let (a, b) = proposed_pair(&mut state, "climate");
        state.accept(a, b);
        drain(&mut state, a);
        state.accept(a, b);
        assert!(drain(&mut state, a).is_empty());
        assert!(state.rooms.is_empty());
        state.accept(b, a);
        assert_eq!(state.rooms.len(), 1);
    }

    #[test]
    fn accept_of_unknown_partner_is_a_no_op() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        let ghost = PeerId(uuid::Uuid::new_v4());
        state.accept(a, ghost);
        assert!(drain(&mut state, a).is_empty());
        assert!(state.proposals.is_empty());
        assert!(state.rooms.is_empty());
    }

    #[test]
    fn stale_partial_accept_never_builds_a_room() {
        let mut state = InnerState::default();
        let (a, b) = proposed_pair(&mut state, "climate");
        state.accept(a, b);
        drain(&mut state, a);
        state.disconnect(a);
        state.accept(b, a);

        assert!(state.rooms.is_empty(), "no room may survive a's disconnect");
        assert!(state.proposals.is_empty());
        let events = drain(&mut state, b);
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, JsonPeerEvent::MatchFound { .. })),
            "b must not hear match-found for a dead pairing"
        );
    }

    #[test]
    fn accept_without_prior_proposal_parks_the_acceptor() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        let b = connect(&mut state);
        state.accept(a, b);
        assert_eq!(drain(&mut state, a), vec![JsonPeerEvent::MatchAcceptedWaiting]);
        assert_eq!(state.proposals.len(), 1);
        state.accept(b, a);
        assert_eq!(state.rooms.len(), 1);
        let room = state.rooms.values().next().unwrap();
        assert_eq!(room.initiator, a);
    }

    #[test]
    fn reject_requeues_only_the_rejecting_side() {
        let mut state = InnerState::default();
        let (a, b) = proposed_pair(&mut state, "climate");
        state.reject(a, b);

        assert_eq!(drain(&mut state, a), vec![JsonPeerEvent::MatchRejected]);
        assert_eq!(drain(&mut state, b), vec![JsonPeerEvent::MatchRejected]);
        assert!(state.proposals.is_empty());
        assert_eq!(state.waiting.len(), 1);
        assert_eq!(state.waiting[0].peer, a);
        assert_eq!(state.waiting[0].topic, "climate");
    }

    #[test]
    fn reject_after_partial_accept_aborts_the_pairing() {
        let mut state = InnerState::default();
        let (a, b) = proposed_pair(&mut state, "climate");
        state.accept(a, b);
        drain(&mut state, a);
        state.reject(b, a);
        assert!(state.proposals.is_empty());
        assert!(state.rooms.is_empty());
        drain(&mut state, a);
        drain(&mut state, b);
        // Both are free to pair again from scratch; b's leftover waiting
        // slot is consumed by the commit.
        state.accept(a, b);
        state.accept(b, a);
        assert_eq!(state.rooms.len(), 1);
        assert!(state.waiting.is_empty());
    }

    #[test]
    fn relay_forwards_payload_verbatim_with_sender() {
        let mut state = InnerState::default();
        let (a, b, _) = committed_room(&mut state);
        state.relay(
            SignalKind::Offer,
            a,
            b,
            json!({"sdp": "X", "type": "offer"}),
        );
        assert_eq!(
            drain(&mut state, b),
            vec![JsonPeerEvent::Signal {
                kind: SignalKind::Offer,
                payload: json!({"sdp": "X", "type": "offer"}),
                sender: a,
            }]
        );
    }

    #[test]
    fn relay_to_unknown_target_is_silently_dropped() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        let ghost = PeerId(uuid::Uuid::new_v4());
        state.relay(SignalKind::IceCandidate, a, ghost, json!({"candidate": "c"}));
        assert!(
            drain(&mut state, a).is_empty(),
            "nothing is surfaced to the sender"
        );
    }

    #[test]
    fn leave_tears_the_room_down_and_notifies_the_peer() {
        let mut state = InnerState::default();
        let (a, b, room_id) = committed_room(&mut state);
        state.leave(a);

        assert_eq!(drain(&mut state, a), vec![JsonPeerEvent::LeftRoom]);
        assert_eq!(
            drain(&mut state, b),
            vec![JsonPeerEvent::PeerLeft { user_id: a }]
        );
        assert!(!state.rooms.contains_key(&room_id));

        // A second leave from the remaining member is a stale no-op.
        state.leave(b);
        assert!(drain(&mut state, b).is_empty());
    }

    #[test]
    fn disconnect_tears_the_room_down_and_notifies_the_peer() {
        let mut state = InnerState::default();
        let (a, b, room_id) = committed_room(&mut state);
        state.disconnect(b);

        assert_eq!(
            drain(&mut state, a),
            vec![JsonPeerEvent::PeerDisconnected { user_id: b }]
        );
        assert!(!state.rooms.contains_key(&room_id));
        assert!(!state.peers.contains_key(&b));

        // Relay through the dead pairing goes nowhere, silently.
        state.relay(SignalKind::Answer, a, b, json!({"sdp": "Y"}));
        assert!(drain(&mut state, a).is_empty());
    }

    #[test]
    fn disconnect_purges_the_waiting_queue() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        state.disconnect(a);
        assert!(state.waiting.is_empty());

        let b = connect(&mut state);
        state.find_match(b, "climate".to_string(), "Ben".to_string());
        let events = drain(&mut state, b);
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, JsonPeerEvent::MatchRequest { .. }))
        );
    }

    #[test]
    fn polling_an_unknown_id_registers_a_fresh_connection() {
        let mut state = InnerState::default();
        let stale = PeerId(uuid::Uuid::new_v4());
        let (fresh, events) = state.connect_or_poll(Some(stale));
        assert_ne!(fresh, stale);
        assert_eq!(decode(&events), vec![JsonPeerEvent::Connected { id: fresh }]);
    }

    #[test]
    fn polling_is_idempotent_for_a_live_connection() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        assert!(drain(&mut state, a).is_empty());
        assert!(drain(&mut state, a).is_empty());
        assert_eq!(state.peers.len(), 1);
    }

    #[test]
    fn full_scenario_from_search_to_signaling() {
        let mut state = InnerState::default();
        let a = connect(&mut state);
        state.find_match(a, "climate".to_string(), "Ada".to_string());
        assert!(matches!(
            drain(&mut state, a).as_slice(),
            [JsonPeerEvent::Waiting { .. }]
        ));

        let b = connect(&mut state);
        state.find_match(b, "climate".to_string(), "Ben".to_string());
        assert!(matches!(
            drain(&mut state, a).as_slice(),
            [JsonPeerEvent::MatchRequest { .. }]
        ));
        assert!(matches!(
            drain(&mut state, b).as_slice(),
            [JsonPeerEvent::MatchRequest { .. }]
        ));

        state.accept(a, b);
        assert_eq!(drain(&mut state, a), vec![JsonPeerEvent::MatchAcceptedWaiting]);
        state.accept(b, a);
        assert!(matches!(
            drain(&mut state, a).as_slice(),
            [JsonPeerEvent::MatchFound {
                initiator: true,
                ..
            }]
        ));
        assert!(matches!(
            drain(&mut state, b).as_slice(),
            [JsonPeerEvent::MatchFound {
                initiator: false,
                ..
            }]
        ));

        state.relay(SignalKind::Offer, a, b, json!({"offer": "X"}));
        assert_eq!(
            drain(&mut state, b),
            vec![JsonPeerEvent::Signal {
                kind: SignalKind::Offer,
                payload: json!({"offer": "X"}),
                sender: a,
            }]
        );
    }
}
