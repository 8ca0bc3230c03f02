//! Navigation gating for sensitive views

pub mod access;
pub mod ritual;

pub use access::{AccessGate, GateState, NavigationDecision, UnlockTick, ViewId};
pub use ritual::{HoldRitual, DEFAULT_HOLD_DURATION};
