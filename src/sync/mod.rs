//! Background persistence: parallel flush and the trailing debounce that drives it

pub mod debounce;
pub mod flush;

pub use debounce::{DebounceHandle, DebounceScheduler, DEFAULT_QUIET_PERIOD};
pub use flush::{write_all, FlushReport};
