//! Core runtime — the turn orchestrator and its collaborators: the agent
//! sub-orchestrator, confirmation broker, context-window planner,
//! per-session locks, and the background summarizer.

pub mod agent;
pub mod confirm;
pub mod context_window;
pub mod session_lock;
pub mod summary;
pub mod turn;

pub use turn::{run_turn, TurnEvent, TurnInput};
