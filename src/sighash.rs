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

//! Routing of signature checks to the legacy or segwit (BIP-143) signature
//! hash computation.
//!
//! The dispatcher owns no cryptography. It decides which serialized view of
//! the transaction must be hashed for the input under check and which script
//! is committed to in place of its unlocking script, and then hands over to
//! a [`SignatureVerifier`].

use bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::hex::FromHex;
use bitcoin::util::sighash::SighashCache;
use bitcoin::Script;

use crate::tx::{ScriptPubkeyType, Transaction, TxDataError};
use crate::verify::SignatureVerifier;

/// Errors preparing signature hash computation. Any of them aborts validation
/// of the whole transaction.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum SighashError {
    /// `{1}` outputs can't be spent under {0} signature rules
    UnsupportedRegime(SighashRegime, ScriptPubkeyType),

    /// unlocking script does not contain redeem script
    NoRedeemScript,

    /// segwit v0 script hash spending has no witness script
    NoWitnessScript,

    /// {0}
    #[from]
    TxData(TxDataError),
}

/// Signature hash computation rules applicable to an input
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "lowercase")
)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum SighashRegime {
    /// Pre-segwit transaction serialization
    #[display("legacy")]
    Legacy,

    /// BIP-143 transaction digest
    #[display("segwit")]
    Segwit,
}

impl SighashRegime {
    /// Inputs having a witness field (even an empty one) are committed to
    /// with segwit rules.
    pub fn detect(tx: &Transaction, input_index: usize) -> Result<SighashRegime, TxDataError> {
        Ok(if tx.input(input_index)?.has_witness() {
            SighashRegime::Segwit
        } else {
            SighashRegime::Legacy
        })
    }
}

/// Everything a verifier needs to know about the input under check, computed
/// fresh for each signature-checking opcode.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SighashContext {
    /// Signature hash rules
    pub regime: SighashRegime,

    /// Index of the input being checked
    pub input_index: usize,

    /// Script committed to by the signature hash in place of the unlocking
    /// script
    pub script_code: Script,

    /// Value of the output spent by the input
    pub value: u64,
}

impl SighashContext {
    /// Computes context for checking signatures of the given input.
    ///
    /// The substitute script is taken depending on the spent output type:
    /// - for P2SH it is the last token of the unlocking script (the redeem
    ///   script or the nested witness program);
    /// - for P2PKH under legacy rules and for P2WPKH under segwit rules it is
    ///   the locking script itself.
    ///
    /// No other combination is supported. Under segwit rules the substitute
    /// script is then turned into BIP-143 script code.
    pub fn for_input(tx: &Transaction, input_index: usize) -> Result<SighashContext, SighashError> {
        let input = tx.input(input_index)?;
        let regime = SighashRegime::detect(tx, input_index)?;
        let ty = &input.prevout.scriptpubkey_type;

        let substitute = match (regime, ty) {
            (_, ScriptPubkeyType::P2sh) => {
                let scriptsig = input.scriptsig_tokens();
                let redeem = scriptsig.last_token().ok_or(SighashError::NoRedeemScript)?;
                Script::from(Vec::<u8>::from_hex(redeem).map_err(TxDataError::from)?)
            }
            (SighashRegime::Segwit, ScriptPubkeyType::V0P2wpkh)
            | (SighashRegime::Legacy, ScriptPubkeyType::P2pkh) => input.prevout.script_pubkey()?,
            (regime, ty) => return Err(SighashError::UnsupportedRegime(regime, ty.clone())),
        };

        let script_code = match regime {
            SighashRegime::Legacy => substitute,
            SighashRegime::Segwit if substitute.is_v0_p2wpkh() => {
                pubkey_hash_script_code(&substitute.as_bytes()[2..22])
            }
            SighashRegime::Segwit if substitute.is_v0_p2wsh() => {
                let witness_script = input
                    .witness_items()
                    .last()
                    .ok_or(SighashError::NoWitnessScript)?;
                Script::from(Vec::<u8>::from_hex(witness_script).map_err(TxDataError::from)?)
            }
            SighashRegime::Segwit => substitute,
        };

        Ok(SighashContext {
            regime,
            input_index,
            script_code,
            value: input.prevout.value,
        })
    }
}

/// BIP-143 script code for a public key hash witness program
fn pubkey_hash_script_code(pubkey_hash: &[u8]) -> Script {
    Builder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(pubkey_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

/// Signature hash cache over the transaction skeleton, in which unlocking
/// scripts and witnesses of all inputs are emptied
pub type SkeletonCache = SighashCache<Box<bitcoin::Transaction>>;

/// Signature checking state shared by all inputs of a transaction.
///
/// The sighash skeleton is built on the first signature check. It is reused
/// by all following checks together with the BIP-143 hashes of prevouts,
/// sequences and outputs, which are computed once per transaction.
pub struct Sighasher<'tx> {
    tx: &'tx Transaction,
    cache: Option<SkeletonCache>,
}

impl<'tx> Sighasher<'tx> {
    /// Constructs signature checking state for the transaction
    pub fn new(tx: &'tx Transaction) -> Self { Sighasher { tx, cache: None } }

    /// Returns transaction which signatures are checked
    #[inline]
    pub fn tx(&self) -> &'tx Transaction { self.tx }

    fn cache(&mut self) -> Result<&mut SkeletonCache, TxDataError> {
        let cache = match self.cache.take() {
            Some(cache) => cache,
            None => SighashCache::new(Box::new(self.tx.sighash_skeleton()?)),
        };
        Ok(self.cache.insert(cache))
    }

    /// Checks signatures of a transaction input against the public keys,
    /// using signature hash rules applicable to the input.
    ///
    /// The input context is computed anew for each check; the verifier result
    /// is returned unchanged.
    pub fn check_signatures<V>(
        &mut self,
        verifier: &V,
        input_index: usize,
        signatures: &[Vec<u8>],
        pubkeys: &[Vec<u8>],
    ) -> Result<bool, SighashError>
    where
        V: SignatureVerifier + ?Sized,
    {
        let context = SighashContext::for_input(self.tx, input_index)?;
        let cache = self.cache()?;
        Ok(match context.regime {
            SighashRegime::Legacy => verifier.verify_legacy(cache, &context, signatures, pubkeys),
            SighashRegime::Segwit => verifier.verify_segwit(cache, &context, signatures, pubkeys),
        })
    }
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::hex::ToHex;

    use super::*;
    use crate::template::test::input;
    use crate::verify::EcdsaVerifier;

    const PKH: &str = "000102030405060708090a0b0c0d0e0f10111213";

    fn tx(input: crate::tx::Input) -> Transaction {
        Transaction {
            txid: None,
            version: 2,
            locktime: 0,
            vin: vec![input],
            vout: vec![],
        }
    }

    #[test]
    fn legacy_p2pkh() {
        let mut input = input(ScriptPubkeyType::P2pkh, "", "", None);
        input.prevout.scriptpubkey = format!("76a914{}88ac", PKH);
        let context = SighashContext::for_input(&tx(input), 0).unwrap();
        assert_eq!(context.regime, SighashRegime::Legacy);
        assert_eq!(context.script_code.as_bytes().to_hex(), format!("76a914{}88ac", PKH));
        assert_eq!(context.value, 1_000);
    }

    #[test]
    fn legacy_p2sh() {
        let input = input(
            ScriptPubkeyType::P2sh,
            "",
            "OP_0 OP_PUSHBYTES_1 51 OP_PUSHBYTES_2 51ac",
            None,
        );
        let context = SighashContext::for_input(&tx(input), 0).unwrap();
        assert_eq!(context.regime, SighashRegime::Legacy);
        assert_eq!(context.script_code.as_bytes().to_hex(), "51ac");
    }

    #[test]
    fn nested_p2wpkh() {
        let input = input(
            ScriptPubkeyType::P2sh,
            "",
            &format!("OP_PUSHBYTES_22 0014{}", PKH),
            Some(&["30", "02"]),
        );
        let context = SighashContext::for_input(&tx(input), 0).unwrap();
        assert_eq!(context.regime, SighashRegime::Segwit);
        assert_eq!(context.script_code.as_bytes().to_hex(), format!("76a914{}88ac", PKH));
    }

    #[test]
    fn nested_p2wsh() {
        let input = input(
            ScriptPubkeyType::P2sh,
            "",
            &format!("OP_PUSHBYTES_34 0020{}{}", PKH, "000102030405060708090a0b"),
            Some(&["", "30", "5151ac"]),
        );
        let context = SighashContext::for_input(&tx(input), 0).unwrap();
        assert_eq!(context.script_code.as_bytes().to_hex(), "5151ac");
    }

    #[test]
    fn native_p2wpkh() {
        let mut input = input(ScriptPubkeyType::V0P2wpkh, "", "", Some(&["30", "02"]));
        input.prevout.scriptpubkey = format!("0014{}", PKH);
        let context = SighashContext::for_input(&tx(input), 0).unwrap();
        assert_eq!(context.regime, SighashRegime::Segwit);
        assert_eq!(context.script_code.as_bytes().to_hex(), format!("76a914{}88ac", PKH));
    }

    #[test]
    fn unsupported_regimes() {
        let p2wsh = input(ScriptPubkeyType::V0P2wsh, "", "", Some(&["", "51"]));
        assert_eq!(
            SighashContext::for_input(&tx(p2wsh), 0),
            Err(SighashError::UnsupportedRegime(
                SighashRegime::Segwit,
                ScriptPubkeyType::V0P2wsh
            ))
        );
        let p2wpkh = input(ScriptPubkeyType::V0P2wpkh, "", "", None);
        assert_eq!(
            SighashContext::for_input(&tx(p2wpkh), 0),
            Err(SighashError::UnsupportedRegime(
                SighashRegime::Legacy,
                ScriptPubkeyType::V0P2wpkh
            ))
        );
        let p2pkh = input(ScriptPubkeyType::P2pkh, "", "", Some(&[]));
        assert!(matches!(
            SighashContext::for_input(&tx(p2pkh), 0),
            Err(SighashError::UnsupportedRegime(SighashRegime::Segwit, _))
        ));
    }

    #[test]
    fn missing_data() {
        let p2sh = input(ScriptPubkeyType::P2sh, "", "", None);
        assert_eq!(
            SighashContext::for_input(&tx(p2sh.clone()), 0),
            Err(SighashError::NoRedeemScript)
        );
        assert_eq!(
            SighashContext::for_input(&tx(p2sh), 1),
            Err(SighashError::TxData(TxDataError::NoInput(1)))
        );
    }

    #[test]
    fn skeleton_built_once() {
        let mut p2pkh = input(ScriptPubkeyType::P2pkh, "", "", None);
        p2pkh.prevout.scriptpubkey = format!("76a914{}88ac", PKH);
        let mut tx = tx(p2pkh.clone());
        tx.vin.push(p2pkh);
        let mut broken = tx.clone();
        broken.vin[1].txid = s!("not a txid");

        let mut sighasher = Sighasher::new(&tx);
        assert!(sighasher.cache.is_none());
        assert_eq!(sighasher.check_signatures(&EcdsaVerifier, 0, &[], &[]), Ok(true));
        assert!(sighasher.cache.is_some());
        // Skeleton of the first check is reused, so the broken input is not
        // converted again
        sighasher.tx = &broken;
        assert_eq!(sighasher.check_signatures(&EcdsaVerifier, 0, &[], &[]), Ok(true));

        // Skeleton is not built until the first signature check
        let mut sighasher = Sighasher::new(&broken);
        assert!(matches!(
            sighasher.check_signatures(&EcdsaVerifier, 0, &[], &[]),
            Err(SighashError::TxData(_))
        ));
    }
}
