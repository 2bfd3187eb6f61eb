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

use bitcoin::hashes::hex::ToHex;
use bitcoin::EcdsaSighashType;
use log::debug;
use secp256k1::{ecdsa, Message, PublicKey, SECP256K1};

use crate::sighash::{SighashContext, SkeletonCache};

/// Verification of signatures over a transaction signature hash.
///
/// Both methods receive the signature hash cache over the transaction with all
/// unlocking scripts and witnesses emptied, shared by all inputs of the
/// transaction, and the context of the input under check. A list of
/// signatures is verified as a single all-or-nothing check.
pub trait SignatureVerifier {
    /// Verifies signatures committing to the pre-segwit signature hash
    fn verify_legacy(
        &self,
        cache: &mut SkeletonCache,
        context: &SighashContext,
        signatures: &[Vec<u8>],
        pubkeys: &[Vec<u8>],
    ) -> bool;

    /// Verifies signatures committing to the BIP-143 signature hash
    fn verify_segwit(
        &self,
        cache: &mut SkeletonCache,
        context: &SighashContext,
        signatures: &[Vec<u8>],
        pubkeys: &[Vec<u8>],
    ) -> bool;
}

/// ECDSA verifier over secp256k1 curve.
///
/// Signatures are DER-encoded (parsed in lax mode, with high S values
/// normalized) and followed by a single sighash type byte. Each signature must
/// match one of the public keys, which are tried in order and never reused:
/// once a key is passed over, it is not tried for the following signatures.
/// An empty signature list verifies.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct EcdsaVerifier;

impl SignatureVerifier for EcdsaVerifier {
    fn verify_legacy(
        &self,
        cache: &mut SkeletonCache,
        context: &SighashContext,
        signatures: &[Vec<u8>],
        pubkeys: &[Vec<u8>],
    ) -> bool {
        verify_ordered(signatures, pubkeys, |sighash_type| {
            cache
                .legacy_signature_hash(context.input_index, &context.script_code, sighash_type)
                .map_err(|err| debug!("legacy sighash computation failed: {}", err))
                .ok()
                .and_then(|sighash| Message::from_slice(&sighash[..]).ok())
        })
    }

    fn verify_segwit(
        &self,
        cache: &mut SkeletonCache,
        context: &SighashContext,
        signatures: &[Vec<u8>],
        pubkeys: &[Vec<u8>],
    ) -> bool {
        verify_ordered(signatures, pubkeys, |sighash_type| {
            cache
                .segwit_signature_hash(
                    context.input_index,
                    &context.script_code,
                    context.value,
                    EcdsaSighashType::from_consensus(sighash_type),
                )
                .map_err(|err| debug!("segwit sighash computation failed: {}", err))
                .ok()
                .and_then(|sighash| Message::from_slice(&sighash[..]).ok())
        })
    }
}

/// Splits signature into its DER part and sighash type
fn parse_signature(data: &[u8]) -> Option<(ecdsa::Signature, u32)> {
    let (sighash_type, der) = data.split_last()?;
    let mut signature = ecdsa::Signature::from_der_lax(der).ok()?;
    signature.normalize_s();
    Some((signature, u32::from(*sighash_type)))
}

fn verify_ordered(
    signatures: &[Vec<u8>],
    pubkeys: &[Vec<u8>],
    mut message: impl FnMut(u32) -> Option<Message>,
) -> bool {
    let mut keys = pubkeys.iter();
    signatures.iter().all(|data| {
        let (signature, sighash_type) = match parse_signature(data) {
            Some(parsed) => parsed,
            None => {
                debug!("signature {} is not a valid DER encoding", data.to_hex());
                return false;
            }
        };
        let msg = match message(sighash_type) {
            Some(msg) => msg,
            None => return false,
        };
        keys.by_ref().any(|key| {
            PublicKey::from_slice(key)
                .map(|pubkey| SECP256K1.verify_ecdsa(&msg, &signature, &pubkey).is_ok())
                .unwrap_or(false)
        })
    })
}
