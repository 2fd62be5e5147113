// Candidate block assembly from a node block template
use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::consensus;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::transaction::Version as TxVersion;
use bitcoin::{
    Address, Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxMerkleNode, TxOut, Witness, WitnessCommitment,
};
use ferropool_core::{FoundResult, MiningTemplate};
use primitive_types::U256;
use thiserror::Error;

use crate::rpc::BlockTemplate;

/// Template transactions beyond this count are left to the next block.
pub const MAX_TEMPLATE_TRANSACTIONS: usize = 800;

/// Witness reserved value committed in the coinbase input witness.
const WITNESS_RESERVED_VALUE: [u8; 32] = [0u8; 32];

const WITNESS_COMMITMENT_MAGIC: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("invalid miner address: {0}")]
    InvalidAddress(String),

    #[error("invalid previousblockhash in template: {0}")]
    InvalidPrevHash(String),

    #[error("invalid bits `{0}` in template")]
    InvalidBits(String),

    #[error("undecodable template transaction: {0}")]
    InvalidTransaction(String),

    #[error("candidate block has no transactions")]
    Empty,
}

/// The full block under construction, exclusively owned by the coordinator.
///
/// Rebuilt on every tip change; only `nonce` and `time` mutate afterwards,
/// when a worker reports a hit.
#[derive(Debug, Clone)]
pub struct CandidateBlock {
    pub block: Block,
    pub height: u64,
}

impl CandidateBlock {
    /// The five header-determining fields broadcast to workers.
    pub fn mining_template(&self) -> MiningTemplate {
        let header = &self.block.header;
        MiningTemplate {
            version: header.version.to_consensus(),
            prev_block: U256::from_little_endian(&header.prev_blockhash.to_byte_array()),
            mrkl_root: U256::from_little_endian(&header.merkle_root.to_byte_array()),
            timestamp: header.time,
            bits_difficulty: header.bits.to_consensus(),
        }
    }

    /// Patch in a worker-reported nonce and the timestamp it hashed.
    pub fn apply_result(&mut self, found: &FoundResult) {
        self.block.header.nonce = found.nonce;
        self.block.header.time = found.timestamp;
    }

    /// Self-check before submission: proof of work, merkle root, and
    /// witness commitment.
    pub fn is_valid(&self) -> bool {
        let header = &self.block.header;
        header.validate_pow(header.target()).is_ok()
            && self.block.check_merkle_root()
            && self.block.check_witness_commitment()
    }

    pub fn block_hash(&self) -> BlockHash {
        self.block.block_hash()
    }

    pub fn serialize_hex(&self) -> String {
        consensus::encode::serialize_hex(&self.block)
    }
}

/// Build a candidate block from a node template: a coinbase paying
/// `miner_address` the template's reward with a BIP34 height script, up to
/// [`MAX_TEMPLATE_TRANSACTIONS`] template transactions in their given order,
/// and the segwit witness commitment.
pub fn build_candidate(
    template: &BlockTemplate,
    miner_address: &str,
) -> Result<CandidateBlock, BlockError> {
    let address = miner_address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BlockError::InvalidAddress(e.to_string()))?
        .assume_checked();

    let mut txdata = Vec::with_capacity(template.transactions.len().min(MAX_TEMPLATE_TRANSACTIONS) + 1);
    txdata.push(build_coinbase(
        template.height,
        template.coinbasevalue,
        address.script_pubkey(),
    ));

    for entry in template.transactions.iter().take(MAX_TEMPLATE_TRANSACTIONS) {
        let raw = hex::decode(&entry.data)
            .map_err(|e| BlockError::InvalidTransaction(e.to_string()))?;
        let tx: Transaction = consensus::deserialize(&raw)
            .map_err(|e| BlockError::InvalidTransaction(e.to_string()))?;
        txdata.push(tx);
    }

    let bits = u32::from_str_radix(&template.bits, 16)
        .map_err(|_| BlockError::InvalidBits(template.bits.clone()))?;

    let header = Header {
        version: BlockVersion::from_consensus(template.version),
        prev_blockhash: parse_block_hash(&template.previousblockhash)?,
        merkle_root: TxMerkleNode::all_zeros(),
        time: template.curtime,
        bits: CompactTarget::from_consensus(bits),
        nonce: 0,
    };

    let mut block = Block { header, txdata };

    // The commitment covers the wtxids of the non-coinbase transactions, so
    // it is computed before the commitment output is appended.
    let witness_root = block.witness_root().ok_or(BlockError::Empty)?;
    let commitment = Block::compute_witness_commitment(&witness_root, &WITNESS_RESERVED_VALUE);
    block.txdata[0].output.push(TxOut {
        value: Amount::ZERO,
        script_pubkey: witness_commitment_script(commitment),
    });

    block.header.merkle_root = block.compute_merkle_root().ok_or(BlockError::Empty)?;

    Ok(CandidateBlock {
        block,
        height: template.height,
    })
}

fn parse_block_hash(hash: &str) -> Result<BlockHash, BlockError> {
    hash.parse::<BlockHash>()
        .map_err(|e| BlockError::InvalidPrevHash(e.to_string()))
}

fn build_coinbase(height: u64, value: u64, script_pubkey: ScriptBuf) -> Transaction {
    Transaction {
        version: TxVersion::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: bip34_height_script(height),
            sequence: Sequence::from_consensus(0xffff_fffe),
            witness: Witness::from_slice(&[WITNESS_RESERVED_VALUE]),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        }],
    }
}

/// BIP34 coinbase script: the block height as a minimal script-number push.
fn bip34_height_script(height: u64) -> ScriptBuf {
    let mut num = Vec::new();
    let mut rest = height;
    while rest > 0 {
        num.push((rest & 0xff) as u8);
        rest >>= 8;
    }
    // A set sign bit needs a padding byte to stay positive.
    if num.last().is_some_and(|msb| msb & 0x80 != 0) {
        num.push(0);
    }

    let mut script = Vec::with_capacity(num.len() + 1);
    script.push(num.len() as u8);
    script.extend_from_slice(&num);
    ScriptBuf::from_bytes(script)
}

fn witness_commitment_script(commitment: WitnessCommitment) -> ScriptBuf {
    let mut script = Vec::with_capacity(38);
    script.push(OP_RETURN.to_u8());
    script.push(36);
    script.extend_from_slice(&WITNESS_COMMITMENT_MAGIC);
    script.extend_from_slice(&commitment.to_byte_array());
    ScriptBuf::from_bytes(script)
}
