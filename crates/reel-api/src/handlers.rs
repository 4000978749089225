//! Request handlers.

pub mod counters;
pub mod files;
pub mod health;
pub mod queue;
pub mod workers;

pub use counters::*;
pub use files::*;
pub use health::*;
pub use queue::*;
pub use workers::*;
