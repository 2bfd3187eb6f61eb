// Script validation library for bitcoin transactions
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

//! Block template helpers: selection of validated transactions, merkle root
//! and header mining.

use std::cmp::Ordering;
use std::convert::TryFrom;
use std::iter;

use bitcoin::hashes::{sha256d, Hash, HashEngine};
use bitcoin::{BlockHash, BlockHeader, TxMerkleNode, Txid};
use chrono::Utc;
use log::{debug, info};

use crate::tx::{Transaction, TxDataError};
use crate::validate::Validator;
use crate::verify::SignatureVerifier;

/// Default proof-of-work target, big-endian
pub const DEFAULT_TARGET: [u8; 32] = [
    0x00, 0x00, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Default block header version
pub const DEFAULT_VERSION: i32 = 4;

/// Errors building block
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum BlockError {
    /// no header with hash below the target exists within the nonce range
    NonceExhausted,

    /// block can't be built without transactions
    NoTransactions,
}

/// Limits applied when selecting transactions into a block
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", default)
)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SelectionLimits {
    /// Maximum total weight of selected transactions
    pub max_weight: usize,

    /// Maximum total fee of selected transactions, in satoshis
    pub max_fee: u64,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        SelectionLimits {
            max_weight: 3_990_000,
            max_fee: 20_616_923,
        }
    }
}

/// Transaction selected into a block
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Selected<'tx> {
    /// The transaction
    pub tx: &'tx Transaction,

    /// Transaction fee, in satoshis
    pub fee: u64,

    /// Transaction weight
    pub weight: usize,
}

impl<'tx> Selected<'tx> {
    fn cmp_fee_rate(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.fee) * other.weight as u128;
        let rhs = u128::from(other.fee) * self.weight as u128;
        lhs.cmp(&rhs)
    }
}

/// Result of transaction selection
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Selection<'tx> {
    /// Selected transactions, ordered by decreasing fee rate
    pub transactions: Vec<Selected<'tx>>,

    /// Total fee of selected transactions
    pub fee: u64,

    /// Total weight of selected transactions
    pub weight: usize,
}

impl<'tx> Selection<'tx> {
    /// Computes ids of the selected transactions, in the selection order
    pub fn txids(&self) -> Result<Vec<Txid>, TxDataError> {
        self.transactions
            .iter()
            .map(|selected| selected.tx.compute_txid())
            .collect()
    }
}

/// Selects transactions into a block.
///
/// Transactions failing validation, spending less than they create or not
/// convertible into consensus form are skipped. The rest are taken in order of
/// decreasing fee rate as long as both the weight and the fee totals stay
/// within the limits.
///
/// Both limits are applied in a single pass: a transaction is skipped if it
/// exceeds either of them, so the fee cap also drops transactions which fit
/// the weight limit, and later, smaller transactions may still be taken.
pub fn select_transactions<'tx, V>(
    validator: &Validator<V>,
    candidates: &'tx [Transaction],
    limits: SelectionLimits,
) -> Selection<'tx>
where
    V: SignatureVerifier,
{
    let mut eligible = candidates
        .iter()
        .filter(|tx| validator.validate(tx))
        .filter_map(|tx| {
            let fee = tx.fee()?;
            let weight = tx
                .weight()
                .map_err(|err| debug!("transaction {} is skipped: {}", tx.name(), err))
                .ok()?;
            Some(Selected { tx, fee, weight })
        })
        .collect::<Vec<_>>();
    eligible.sort_by(|a, b| b.cmp_fee_rate(a));

    let mut selection = Selection::default();
    for candidate in eligible {
        let weight = selection.weight.saturating_add(candidate.weight);
        let fee = selection.fee.saturating_add(candidate.fee);
        if weight > limits.max_weight || fee > limits.max_fee {
            continue;
        }
        selection.weight = weight;
        selection.fee = fee;
        selection.transactions.push(candidate);
    }
    info!(
        "selected {} of {} transactions with total fee {} and weight {}",
        selection.transactions.len(),
        candidates.len(),
        selection.fee,
        selection.weight
    );
    selection
}

/// Computes merkle root of transaction ids. On each level with an odd number
/// of nodes the last node is paired with itself.
pub fn merkle_root(txids: &[Txid]) -> Option<TxMerkleNode> {
    let mut level = txids
        .iter()
        .map(|txid| txid.into_inner())
        .collect::<Vec<[u8; 32]>>();
    if level.is_empty() {
        return None;
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(left);
                let mut engine = sha256d::Hash::engine();
                engine.input(&left);
                engine.input(&right);
                sha256d::Hash::from_engine(engine).into_inner()
            })
            .collect();
    }
    Some(TxMerkleNode::from_inner(level[0]))
}

/// Encodes big-endian target into its compact (`nBits`) form
pub fn target_to_bits(target: &[u8; 32]) -> u32 {
    let leading = target.iter().take_while(|byte| **byte == 0).count();
    let mut size = (target.len() - leading) as u32;
    let mut mantissa = target[leading..]
        .iter()
        .chain(iter::repeat(&0u8))
        .take(3)
        .fold(0u32, |acc, byte| acc << 8 | u32::from(*byte));
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }
    size << 24 | (mantissa & 0x007f_ffff)
}

/// Block header data before proof-of-work
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct HeaderTemplate {
    /// Block version
    pub version: i32,

    /// Hash of the previous block
    pub prev_blockhash: BlockHash,

    /// Merkle root of the block transactions
    pub merkle_root: TxMerkleNode,

    /// Block timestamp
    pub time: u32,

    /// Proof-of-work target, big-endian
    pub target: [u8; 32],
}

impl HeaderTemplate {
    /// Constructs template for a block with the given transactions, using
    /// default version and target, zero previous block hash and the current
    /// time.
    pub fn with_txids(txids: &[Txid]) -> Result<HeaderTemplate, BlockError> {
        let merkle_root = merkle_root(txids).ok_or(BlockError::NoTransactions)?;
        Ok(HeaderTemplate {
            version: DEFAULT_VERSION,
            prev_blockhash: BlockHash::from_inner([0u8; 32]),
            merkle_root,
            time: u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX),
            target: DEFAULT_TARGET,
        })
    }

    /// Target in its compact form
    #[inline]
    pub fn bits(&self) -> u32 { target_to_bits(&self.target) }

    /// Searches for a nonce making header hash fall below the target
    pub fn mine(&self) -> Result<BlockHeader, BlockError> { self.mine_within(0..=u32::MAX) }

    /// Searches for a nonce making header hash fall below the target, trying
    /// only the provided nonces
    pub fn mine_within(
        &self,
        nonces: impl IntoIterator<Item = u32>,
    ) -> Result<BlockHeader, BlockError> {
        let mut header = BlockHeader {
            version: self.version,
            prev_blockhash: self.prev_blockhash,
            merkle_root: self.merkle_root,
            time: self.time,
            bits: self.bits(),
            nonce: 0,
        };
        for nonce in nonces {
            header.nonce = nonce;
            if self.is_below_target(header.block_hash()) {
                info!("block {} mined with nonce {}", header.block_hash(), nonce);
                return Ok(header);
            }
        }
        Err(BlockError::NonceExhausted)
    }

    fn is_below_target(&self, hash: BlockHash) -> bool {
        let mut value = hash.into_inner();
        value.reverse();
        value < self.target
    }
}
