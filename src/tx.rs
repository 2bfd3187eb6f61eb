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

//! Transaction data as it is provided by mempool explorers: every input
//! carries full information about the output it spends, and all scripts are
//! present both in raw (hex) and token (`asm`) forms.

use std::convert::Infallible;
use std::str::FromStr;

use bitcoin::hashes::hex::{self, FromHex};
use bitcoin::{OutPoint, PackedLockTime, Script, Sequence, TxIn, TxOut, Txid, Witness};

use crate::asm::AsmScript;

/// Errors converting transaction data into consensus structures
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum TxDataError {
    /// invalid hex-encoded transaction data: {0}
    #[from]
    Hex(hex::Error),

    /// transaction input #{0} is absent
    NoInput(usize),
}

/// Type of the locking script (`scriptPubkey`) as it is reported by the
/// explorer.
///
/// Discriminators unknown to this library are kept verbatim in
/// [`ScriptPubkeyType::Unknown`].
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", from = "String", into = "String")
)]
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum ScriptPubkeyType {
    /// Bare public key
    #[display("p2pk")]
    P2pk,

    /// Public key hash
    #[display("p2pkh")]
    P2pkh,

    /// Script hash (BIP-16)
    #[display("p2sh")]
    P2sh,

    /// Native segwit v0 public key hash
    #[display("v0_p2wpkh")]
    V0P2wpkh,

    /// Native segwit v0 script hash
    #[display("v0_p2wsh")]
    V0P2wsh,

    /// Taproot output
    #[display("v1_p2tr")]
    V1P2tr,

    /// Provably unspendable data carrier
    #[display("op_return")]
    OpReturn,

    /// Bare multisig
    #[display("multisig")]
    Multisig,

    /// Any other script type
    #[display("{0}")]
    Unknown(String),
}

impl FromStr for ScriptPubkeyType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "p2pk" => ScriptPubkeyType::P2pk,
            "p2pkh" => ScriptPubkeyType::P2pkh,
            "p2sh" => ScriptPubkeyType::P2sh,
            "v0_p2wpkh" => ScriptPubkeyType::V0P2wpkh,
            "v0_p2wsh" => ScriptPubkeyType::V0P2wsh,
            "v1_p2tr" => ScriptPubkeyType::V1P2tr,
            "op_return" => ScriptPubkeyType::OpReturn,
            "multisig" => ScriptPubkeyType::Multisig,
            other => ScriptPubkeyType::Unknown(other.to_owned()),
        })
    }
}

impl From<&str> for ScriptPubkeyType {
    fn from(s: &str) -> Self {
        match ScriptPubkeyType::from_str(s) {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

impl From<String> for ScriptPubkeyType {
    #[inline]
    fn from(s: String) -> Self { ScriptPubkeyType::from(s.as_str()) }
}

impl From<ScriptPubkeyType> for String {
    #[inline]
    fn from(ty: ScriptPubkeyType) -> Self { ty.to_string() }
}

/// Transaction output, either spent by one of the transaction inputs
/// (previous output) or created by the transaction
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Prevout {
    /// Hex-encoded locking script
    pub scriptpubkey: String,

    /// Locking script in token form
    pub scriptpubkey_asm: String,

    /// Type of the locking script
    pub scriptpubkey_type: ScriptPubkeyType,

    /// Address matching the locking script, if any
    #[cfg_attr(feature = "serde", serde(default))]
    pub scriptpubkey_address: Option<String>,

    /// Output value in satoshis
    pub value: u64,
}

/// Output created by a transaction has the same structure as the one spent
pub type Output = Prevout;

impl Prevout {
    /// Locking script tokens
    #[inline]
    pub fn script_tokens(&self) -> AsmScript { AsmScript::parse(&self.scriptpubkey_asm) }

    /// Decodes raw locking script
    pub fn script_pubkey(&self) -> Result<Script, TxDataError> {
        Ok(Script::from(Vec::<u8>::from_hex(&self.scriptpubkey)?))
    }

    fn to_txout(&self) -> Result<TxOut, TxDataError> {
        Ok(TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey()?,
        })
    }
}

/// Transaction input together with the output it spends
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Input {
    /// Id of the transaction containing the spent output
    pub txid: String,

    /// Index of the spent output
    pub vout: u32,

    /// The spent output
    pub prevout: Prevout,

    /// Hex-encoded unlocking script
    #[cfg_attr(feature = "serde", serde(default))]
    pub scriptsig: String,

    /// Unlocking script in token form
    #[cfg_attr(feature = "serde", serde(default))]
    pub scriptsig_asm: String,

    /// Hex-encoded witness stack items; `None` for non-segwit inputs
    #[cfg_attr(feature = "serde", serde(default))]
    pub witness: Option<Vec<String>>,

    /// Whether the input is a coinbase
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_coinbase: bool,

    /// Input sequence number
    pub sequence: u32,

    /// P2SH redeem script in token form
    #[cfg_attr(feature = "serde", serde(default))]
    pub inner_redeemscript_asm: Option<String>,

    /// P2WSH witness script in token form
    #[cfg_attr(feature = "serde", serde(default))]
    pub inner_witnessscript_asm: Option<String>,
}

impl Input {
    /// Detects inputs carrying witness field (even an empty one)
    #[inline]
    pub fn has_witness(&self) -> bool { self.witness.is_some() }

    /// Witness items; empty for non-segwit inputs
    pub fn witness_items(&self) -> &[String] { self.witness.as_deref().unwrap_or_default() }

    /// Unlocking script tokens
    #[inline]
    pub fn scriptsig_tokens(&self) -> AsmScript { AsmScript::parse(&self.scriptsig_asm) }

    /// P2SH redeem script tokens, if provided
    pub fn redeem_script(&self) -> Option<AsmScript> {
        self.inner_redeemscript_asm.as_deref().map(AsmScript::parse)
    }

    /// P2WSH witness script tokens, if provided
    pub fn witness_script(&self) -> Option<AsmScript> {
        self.inner_witnessscript_asm.as_deref().map(AsmScript::parse)
    }

    /// Reference to the spent output
    pub fn outpoint(&self) -> Result<OutPoint, TxDataError> {
        Ok(OutPoint::new(Txid::from_str(&self.txid)?, self.vout))
    }

    fn to_txin(&self, unlocking: bool) -> Result<TxIn, TxDataError> {
        let (script_sig, witness) = if unlocking {
            let witness = self
                .witness_items()
                .iter()
                .map(|item| Vec::<u8>::from_hex(item))
                .collect::<Result<Vec<_>, _>>()?;
            (
                Script::from(Vec::<u8>::from_hex(&self.scriptsig)?),
                Witness::from_vec(witness),
            )
        } else {
            (Script::new(), Witness::default())
        };
        Ok(TxIn {
            previous_output: self.outpoint()?,
            script_sig,
            sequence: Sequence(self.sequence),
            witness,
        })
    }
}

/// Transaction with its inputs resolved to the outputs they spend
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Transaction {
    /// Transaction id, if reported by the source
    #[cfg_attr(feature = "serde", serde(default))]
    pub txid: Option<String>,

    /// Transaction version
    pub version: i32,

    /// Transaction lock time
    pub locktime: u32,

    /// Transaction inputs
    pub vin: Vec<Input>,

    /// Transaction outputs
    pub vout: Vec<Output>,
}

impl Transaction {
    /// Returns input with the given index
    pub fn input(&self, index: usize) -> Result<&Input, TxDataError> {
        self.vin.get(index).ok_or(TxDataError::NoInput(index))
    }

    /// Computes transaction fee as a difference between spent and created
    /// value. Returns `None` if the outputs exceed the inputs.
    pub fn fee(&self) -> Option<u64> {
        let spent = self
            .vin
            .iter()
            .try_fold(0u64, |sum, input| sum.checked_add(input.prevout.value))?;
        let created = self
            .vout
            .iter()
            .try_fold(0u64, |sum, output| sum.checked_add(output.value))?;
        spent.checked_sub(created)
    }

    /// Converts into consensus transaction structure, keeping all unlocking
    /// scripts and witnesses.
    pub fn to_bitcoin(&self) -> Result<bitcoin::Transaction, TxDataError> { self.convert(true) }

    /// Converts into consensus transaction structure with unlocking scripts
    /// and witnesses of all inputs emptied. This is the starting point for
    /// signature hash computation, where each input's own unlocking data are
    /// substituted separately.
    pub fn sighash_skeleton(&self) -> Result<bitcoin::Transaction, TxDataError> {
        self.convert(false)
    }

    /// Computes transaction weight units
    pub fn weight(&self) -> Result<usize, TxDataError> { Ok(self.to_bitcoin()?.weight()) }

    /// Computes transaction id from the transaction data
    pub fn compute_txid(&self) -> Result<Txid, TxDataError> { Ok(self.to_bitcoin()?.txid()) }

    /// Name used in diagnostics: the reported transaction id or an empty
    /// string.
    pub(crate) fn name(&self) -> &str { self.txid.as_deref().unwrap_or_default() }

    fn convert(&self, unlocking: bool) -> Result<bitcoin::Transaction, TxDataError> {
        Ok(bitcoin::Transaction {
            version: self.version,
            lock_time: PackedLockTime(self.locktime),
            input: self
                .vin
                .iter()
                .map(|input| input.to_txin(unlocking))
                .collect::<Result<_, _>>()?,
            output: self
                .vout
                .iter()
                .map(Prevout::to_txout)
                .collect::<Result<_, _>>()?,
        })
    }
}
