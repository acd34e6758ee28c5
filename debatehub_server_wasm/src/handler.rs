//! HTTP long-polling handlers for the signaling coordinator
//!
//! This module implements long-polling based signaling that works over
//! plain HTTP without WebSocket upgrades or long-lived connections.

use crate::error::{ClientRequestError, SignalingError};
use crate::state::ServerState;
use debatehub_protocol::{JsonPeerRequest, PeerId};
use std::str::FromStr;
use wstd::http::{Body, Request, Response};

/// Get query parameter from URI
fn get_query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key { Some(v) } else { None }
    })
}

/// Extract the sender's peer id from the X-Peer-Id header
fn sender_id(request: &Request<Body>) -> Result<PeerId, ClientRequestError> {
    let header = request
        .headers()
        .get("x-peer-id")
        .ok_or(ClientRequestError::MissingPeerId)?;
    let value = header
        .to_str()
        .map_err(|_| ClientRequestError::InvalidPeerId)?;
    PeerId::from_str(value).map_err(|_| ClientRequestError::InvalidPeerId)
}

/// Connect or poll - returns the peer id and any pending events
async fn handle_poll(
    peer_id: Option<PeerId>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let (peer_id, events) = state.connect_or_poll(peer_id);

    let response_body = serde_json::json!({
        "peer_id": peer_id.to_string(),
        "events": events,
    });

    Ok(Response::builder()
        .status(200)
        .header("content-type", "application/json")
        .header("access-control-allow-origin", "*")
        .body(Body::from(response_body.to_string()))
        .unwrap())
}

/// Handle a request POST: decode it and apply it as one atomic step
async fn handle_send(
    request: Request<Body>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let sender = match sender_id(&request) {
        Ok(id) => id,
        Err(e) => {
            return Ok(Response::builder()
                .status(400)
                .header("access-control-allow-origin", "*")
                .body(Body::from(e.to_string()))
                .unwrap());
        }
    };

    let mut body = request.into_body();
    let body_str = match body.str_contents().await {
        Ok(s) => s.to_string(),
        Err(e) => {
            return Ok(Response::builder()
                .status(400)
                .header("access-control-allow-origin", "*")
                .body(Body::from(format!("Failed to read body: {e:?}")))
                .unwrap());
        }
    };

    let peer_request = match JsonPeerRequest::from_str(&body_str) {
        Ok(req) => req,
        Err(e) => {
            return Ok(Response::builder()
                .status(400)
                .header("access-control-allow-origin", "*")
                .body(Body::from(ClientRequestError::from(e).to_string()))
                .unwrap());
        }
    };

    match state.apply(sender, peer_request) {
        Ok(()) => Ok(Response::builder()
            .status(200)
            .header("access-control-allow-origin", "*")
            .body(Body::from("OK"))
            .unwrap()),
        Err(SignalingError::UnknownPeer) => Ok(Response::builder()
            .status(404)
            .header("access-control-allow-origin", "*")
            .body(Body::from("Unknown peer"))
            .unwrap()),
    }
}

/// Handle CORS preflight
fn handle_cors_preflight() -> Result<Response<Body>, wstd::http::Error> {
    Ok(Response::builder()
        .status(204)
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "GET, POST, OPTIONS")
        .header("access-control-allow-headers", "content-type, x-peer-id")
        .header("access-control-max-age", "86400")
        .body(Body::empty())
        .unwrap())
}

/// Handle an HTTP request - main router
pub async fn handle_request(
    request: Request<Body>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path();

    // CORS preflight
    if method == wstd::http::Method::OPTIONS {
        return handle_cors_preflight();
    }

    // Health check
    if path == "/health" {
        return Ok(Response::builder()
            .status(200)
            .header("access-control-allow-origin", "*")
            .body(Body::from("OK"))
            .unwrap());
    }

    // Request endpoint (POST)
    if path == "/send" && method == wstd::http::Method::POST {
        return handle_send(request, state).await;
    }

    if method == wstd::http::Method::GET {
        // Connect/poll endpoint (GET /poll or GET /poll?peer_id={id})
        if path == "/poll" {
            let peer_id =
                get_query_param(uri.query(), "peer_id").and_then(|s| PeerId::from_str(s).ok());
            return handle_poll(peer_id, state).await;
        }

        // Regular GET / - return info page
        if path == "/" {
            return Ok(Response::builder()
                .status(200)
                .header("content-type", "text/plain")
                .header("access-control-allow-origin", "*")
                .body(Body::from(
                    "DebateHub Signaling Server (Long-Polling)\n\
                     \n\
                     Endpoints:\n\
                     - GET /health - Health check\n\
                     - GET /poll?peer_id={id} - Connect (no id) or poll for events\n\
                     - POST /send - Send a request (X-Peer-Id header required)\n\
                     \n\
                     Protocol:\n\
                     1. GET /poll to connect and get peer_id + the connected ack\n\
                     2. Poll GET /poll?peer_id={id} for new events\n\
                     3. POST /send with X-Peer-Id header to find a match,\n\
                        accept/reject it, relay offers/answers/ICE candidates,\n\
                        leave the room, or disconnect\n\
                     \n\
                     Response format: {\"peer_id\": \"uuid\", \"events\": [...]}\n",
                ))
                .unwrap());
        }
    }

    // Unknown endpoint
    Ok(Response::builder()
        .status(404)
        .header("access-control-allow-origin", "*")
        .body(Body::from("Not Found"))
        .unwrap())
}
