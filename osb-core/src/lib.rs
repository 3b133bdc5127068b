//! The osb benchmark engine: worker pool, per-worker interval statistics,
//! the window-arrival barrier that turns them into coherent per-window
//! records, the shared work dispenser, and the per-phase run controller.

pub mod context;
pub mod controller;
pub mod dispenser;
pub mod stats;
mod worker;

pub use context::RunContext;
pub use controller::{OpKind, RunController};
pub use dispenser::Dispenser;
pub use stats::{monotonic_ns, PhaseStats, StatusHistogram};
