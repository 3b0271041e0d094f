//! Practica Valencià: practice backend for the Valencian language
//! certificates (B1..C2).
//!
//! Exposed as a library so the binary and the integration tests share the
//! same router and state.

pub mod config;
pub mod content;
pub mod countdown;
pub mod domain;
pub mod error;
pub mod exam;
pub mod export;
pub mod history;
pub mod logic;
pub mod openai;
pub mod practice;
pub mod prefs;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;

pub use routes::build_router;
