//! Tool discovery and execution.
//!
//! Tools are declared in `tool.toml` manifests under the configured tools
//! directory and executed as child processes. The registry serves
//! upstream-shaped schemas with stable fingerprints and supports
//! atomic-swap reload.

pub mod exec;
pub mod manifest;
pub mod registry;

pub use exec::ToolExecution;
pub use manifest::{ToolEntry, ToolManifest, ToolParam};
pub use registry::{ToolListing, ToolRegistry, ToolSchema};
