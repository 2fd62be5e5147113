// Error types for the proof-of-work engine
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowError {
    #[error("compact target 0x{0:08x} is degenerate (exponent outside 3..=32)")]
    InvalidCompactTarget(u32),
}
