//! WASI-compatible matchmaking and WebRTC signaling server for DebateHub
//!
//! This crate provides the real-time coordinator of the DebateHub backend:
//! it pairs anonymous live connections into debate rooms by topic and relays
//! opaque WebRTC handshake payloads between the two members. It compiles to
//! WebAssembly and runs in WASI-compatible runtimes using HTTP long-polling.
//!
//! # Protocol
//!
//! Instead of WebSockets, this server uses HTTP long-polling:
//!
//! - **GET /poll?peer_id={id}** - Connect (no id) or poll for events
//! - **POST /send** - Send requests (X-Peer-Id header required)
//! - **GET /health** - Health check
//!
//! ## Response Format (server → client)
//!
//! JSON response with peer_id and pending events:
//! ```json
//! {"peer_id": "<uuid>", "events": ["..."]}
//! ```
//!
//! Events are JSON strings:
//! - `{"connected": {"id": "<uuid>"}}` - Your peer id
//! - `{"waiting": {"message": "..."}}` - Queued, no partner yet
//! - `{"match-request": {"partnerId": "...", "partnerLabel": "...", "topic": "..."}}`
//! - `"match-accepted-waiting"` - Acceptance recorded, partner undecided
//! - `{"match-found": {"roomId": "...", "partnerId": "...", "initiator": true}}`
//! - `"match-rejected"` / `"search-cancelled"` / `"left-room"`
//! - `{"signal": {"kind": "offer", "payload": ..., "sender": "<uuid>"}}`
//! - `{"peer-left": {"userId": "<uuid>"}}` / `{"peer-disconnected": {"userId": "<uuid>"}}`
//!
//! ## Requests (client → server)
//!
//! POST to /send with X-Peer-Id header and JSON body:
//! - `{"find-match": {"topic": "...", "label": "..."}}`
//! - `{"accept-match": {"partnerId": "<uuid>"}}`
//! - `{"reject-match": {"partnerId": "<uuid>"}}`
//! - `"cancel-search"`
//! - `{"signal": {"kind": "offer", "target": "<uuid>", "payload": ...}}`
//! - `"leave-room"` / `"disconnect"` / `"keep-alive"`
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! wasmtime serve -S common --addr 127.0.0.1:8001 debatehub-signaling-wasm.wasm
//!
//! # Connect (returns peer_id and the connected ack)
//! curl http://127.0.0.1:8001/poll
//!
//! # Look for a partner
//! curl -X POST -H "X-Peer-Id: <your-id>" -H "Content-Type: application/json" \
//!   -d '{"find-match":{"topic":"climate","label":"Ada"}}' \
//!   http://127.0.0.1:8001/send
//!
//! # Poll for events
//! curl "http://127.0.0.1:8001/poll?peer_id=<your-id>"
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handler;
pub mod state;

pub use config::Config;
pub use error::{ClientRequestError, SignalingError};
pub use handler::handle_request;
pub use state::ServerState;
