//! Bot layer: channel naming and messages, per-game trackers, and the
//! season orchestrator.

pub mod channels;
pub mod flavor;
pub mod scheduler;
pub mod tracker;
