//! Short-horizon consumption forecast with a peak alert.

pub mod engine;
pub mod report;

pub use engine::*;
pub use report::*;
