//! Scheduled Module - periodic quota counter resets

mod scheduler;

pub use scheduler::{next_midnight, Clock, ResetScheduler, SystemClock};
