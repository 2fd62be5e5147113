// Ferropool Core - shared mining data model
//
// The types exchanged between the coordinator and its workers: the flat
// mining template derived from a candidate block, nonce search ranges, and
// found-nonce results.

pub mod range;
pub mod template;

pub use range::NonceRange;
pub use template::{FoundResult, MiningTemplate};
