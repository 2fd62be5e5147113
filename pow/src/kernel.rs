// Block header assembly and double-SHA-256 hashing
use ferropool_core::MiningTemplate;
use primitive_types::U256;
use sha2::{Digest, Sha256};

use crate::error::PowError;

/// Serialized block header length in bytes.
pub const HEADER_LEN: usize = 80;

/// Length of the header prefix that stays constant while the nonce varies.
pub const PREFIX_LEN: usize = HEADER_LEN - 4;

/// The first 76 bytes of the serialized block header.
///
/// Precomputed once per job; only the trailing 4 nonce bytes change between
/// hash attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPrefix([u8; PREFIX_LEN]);

impl HeaderPrefix {
    /// Serialize the template fields in consensus order: version (signed),
    /// previous block hash, merkle root, timestamp, compact bits. All fields
    /// little-endian.
    pub fn from_template(template: &MiningTemplate) -> Self {
        let mut buf = [0u8; PREFIX_LEN];
        buf[0..4].copy_from_slice(&template.version.to_le_bytes());
        template.prev_block.to_little_endian(&mut buf[4..36]);
        template.mrkl_root.to_little_endian(&mut buf[36..68]);
        buf[68..72].copy_from_slice(&template.timestamp.to_le_bytes());
        buf[72..76].copy_from_slice(&template.bits_difficulty.to_le_bytes());
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; PREFIX_LEN] {
        &self.0
    }
}

/// SHA-256 applied twice.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Hash the header formed by `prefix` plus `nonce`, interpreting the digest
/// as a 256-bit little-endian integer.
pub fn pow_hash(prefix: &HeaderPrefix, nonce: u32) -> U256 {
    let mut header = [0u8; HEADER_LEN];
    header[..PREFIX_LEN].copy_from_slice(prefix.as_bytes());
    header[PREFIX_LEN..].copy_from_slice(&nonce.to_le_bytes());
    U256::from_little_endian(&double_sha256(&header))
}

/// Expand a compact difficulty encoding into the full 256-bit target.
///
/// `target = mantissa << 8*(exponent - 3)`. Exponents below 3 (negative
/// shift) or above 32 (wider than 256 bits) have no usable expansion and are
/// rejected; callers are expected to have ruled them out upstream.
pub fn expand_compact(bits: u32) -> Result<U256, PowError> {
    let exponent = (bits >> 24) & 0xff;
    if !(3..=32).contains(&exponent) {
        return Err(PowError::InvalidCompactTarget(bits));
    }
    let mantissa = U256::from(bits & 0x00ff_ffff);
    Ok(mantissa << (8 * (exponent as usize - 3)))
}

/// Whether a hash satisfies the target (strictly below).
pub fn meets_target(hash: U256, target: U256) -> bool {
    hash < target
}
