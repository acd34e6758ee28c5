//! WASI HTTP server entry point for the DebateHub signaling server
//!
//! This module provides the main entry point when running as a WASI HTTP
//! component using `wasmtime serve`.

use debatehub_server_wasm::{Config, ServerState, handle_request};
use std::cell::RefCell;
use wstd::http::{Body, Request, Response};

// Thread-local state for the server (WASI is single-threaded)
thread_local! {
    static STATE: RefCell<Option<ServerState>> = const { RefCell::new(None) };
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} [{}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn get_or_init_state() -> ServerState {
    STATE.with(|s| {
        let mut state = s.borrow_mut();
        if state.is_none() {
            let config = Config::from_env();
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(config.log_level);
            }
            log::info!("starting DebateHub signaling server");
            *state = Some(ServerState::with_state_file(config.state_file));
        }
        state.as_ref().unwrap().clone()
    })
}

/// The main HTTP handler for WASI
///
/// This function is called by the WASI runtime for each incoming HTTP request.
#[wstd::http_server]
async fn main(request: Request<Body>) -> Result<Response<Body>, wstd::http::Error> {
    let state = get_or_init_state();
    handle_request(request, &state).await
}
