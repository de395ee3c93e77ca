//! Component version model and roll-forward selection.

pub mod model;
pub mod rollforward;

pub use model::HostVersion;
pub use rollforward::{best_match, RollForward};
