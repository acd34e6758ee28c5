//! Error types for the signaling coordinator

use thiserror::Error;

/// Errors that can occur while coordinating peers
#[derive(Error, Debug)]
pub enum SignalingError {
    /// The referenced peer is not a live connection
    #[error("Unknown peer")]
    UnknownPeer,
}

/// Errors from decoding client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// The X-Peer-Id header is absent
    #[error("Missing X-Peer-Id header")]
    MissingPeerId,

    /// The X-Peer-Id header is not a peer id
    #[error("Invalid X-Peer-Id header")]
    InvalidPeerId,

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
