// Ferropool PoW - double-SHA-256 proof-of-work engine
//
// The hashing kernel (header assembly, compact-target expansion) and the
// multi-threaded nonce search built on top of it.

pub mod error;
pub mod kernel;
pub mod search;

pub use error::PowError;
pub use kernel::{
    double_sha256, expand_compact, meets_target, pow_hash, HeaderPrefix, HEADER_LEN, PREFIX_LEN,
};
pub use search::{CancelFlag, Searcher};
