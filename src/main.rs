//! Nihongo Quiz · Japanese Learning Backend
//!
//! - Axum HTTP + WebSocket API for randomized quiz sessions (kotoba, bunpo, kanji)
//! - Admin API for chapters and questions, with optional image uploads
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                     : u16 (default 3000)
//!   QUIZ_STORE               : "memory" (default) or "firestore"
//!   QUIZ_CONFIG_PATH         : TOML content bank for the memory store
//!   FIRESTORE_PROJECT_ID     : enables the Firestore store when QUIZ_STORE=firestore
//!   FIRESTORE_API_KEY        : optional API key for Firestore REST
//!   FIRESTORE_BASE_URL       : default "https://firestore.googleapis.com/v1"
//!   CLOUDINARY_CLOUD_NAME    : enables image uploads (with CLOUDINARY_UPLOAD_PRESET)
//!   CLOUDINARY_UPLOAD_PRESET : unsigned upload preset
//!   CLOUDINARY_BASE_URL      : default "https://api.cloudinary.com"
//!   SESSION_IDLE_SECS        : idle HTTP sessions are evicted after this (default 1800)
//!   LOG_LEVEL                : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT               : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod store;
mod pool;
mod session;
mod upload;
mod error;
mod state;
mod protocol;
mod logic;
mod admin;
mod routes;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Store, pool loader, image host, session registry.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "nihongo_quiz", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "nihongo_quiz", error = %e, "Could not listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "nihongo_quiz", "Shutdown requested");
}
