//! Control layer exposing device state to developer tooling.

/// Status and tuning calls over a façade.
pub mod api;
/// In-process producer/consumer session used by the console.
pub mod session;
/// Ratatui-based developer console.
pub mod ui;
