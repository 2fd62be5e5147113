// Mining template and result types shared by coordinator and workers
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// The five header-determining fields of a candidate block.
///
/// This is what the coordinator broadcasts on every tip change; everything a
/// worker needs to assemble the 80-byte header except the nonce. `prev_block`
/// and `mrkl_root` are 256-bit integers whose little-endian serialization is
/// the header byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningTemplate {
    /// Block version (signed, serialized little-endian)
    pub version: i32,

    /// Hash of the previous block header
    pub prev_block: U256,

    /// Merkle root of the block's transactions
    pub mrkl_root: U256,

    /// Header timestamp (Unix seconds); workers may advance this locally
    /// when they exhaust their nonce range
    pub timestamp: u32,

    /// Difficulty target in compact representation
    pub bits_difficulty: u32,
}

/// A winning nonce reported by a worker.
///
/// Carries the timestamp actually hashed, which may differ from the broadcast
/// template's if the worker bumped it during range-exhaustion retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundResult {
    pub nonce: u32,
    pub timestamp: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_serde_round_trip() {
        let template = MiningTemplate {
            version: 0x2000_0000,
            prev_block: U256::from(42u64),
            mrkl_root: U256::from(7u64) << 200,
            timestamp: 1_700_000_000,
            bits_difficulty: 0x1d00ffff,
        };

        let json = serde_json::to_string(&template).unwrap();
        let back: MiningTemplate = serde_json::from_str(&json).unwrap();
        assert_eq!(template, back);
    }

    #[test]
    fn test_found_result_fields() {
        let json = r#"{"nonce": 2083236893, "timestamp": 1231006505}"#;
        let found: FoundResult = serde_json::from_str(json).unwrap();
        assert_eq!(found.nonce, 2083236893);
        assert_eq!(found.timestamp, 1231006505);
    }
}
