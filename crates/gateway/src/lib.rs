//! mochi gateway — HTTP surface and turn runtime.
//!
//! The binary lives in `main.rs`; everything else is a library so
//! integration tests can build an [`state::AppState`] against a mock
//! upstream backend and drive whole turns.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod prompts;
pub mod runtime;
pub mod state;
