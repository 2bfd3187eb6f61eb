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

use std::str::FromStr;

/// Largest data length which can be pushed with a direct `OP_PUSHBYTES_<n>`
/// opcode; longer pushes use `OP_PUSHDATA<x>` family.
pub const MAX_PUSHBYTES: u8 = 75;

const PUSHBYTES_PREFIX: &str = "OP_PUSHBYTES_";
pub(crate) const PUSHNUM_PREFIX: &str = "OP_PUSHNUM_";

/// Errors parsing script token into an [`Opcode`]
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum TokenError {
    /// token `{0}` does not specify a push length in 1..=75 range
    PushLength(String),
}

/// Opcodes known to the script interpreter.
///
/// The vocabulary is closed: any token which is not a known mnemonic is
/// represented by [`Opcode::Literal`] and is pushed to the stack as-is when
/// executed. This covers both data pushes already decoded by a block explorer
/// and opcodes outside of the supported set (like `OP_PUSHNUM_2`), which are
/// consumed later by other opcodes as literal values.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum Opcode {
    /// Pushes an empty value. The interpreter treats it as a no-op.
    #[display("OP_0")]
    Zero,

    /// Duplicates the top stack item.
    #[display("OP_DUP")]
    Dup,

    /// Replaces the top stack item with its `RIPEMD160(SHA256(x))` hash.
    #[display("OP_HASH160")]
    Hash160,

    /// Replaces the top stack item with its `SHA256(x)` hash.
    #[display("OP_SHA256")]
    Sha256,

    /// Compares two top stack items, pushing the boolean result.
    #[display("OP_EQUAL")]
    Equal,

    /// Compares two top stack items, failing the script if they differ.
    #[display("OP_EQUALVERIFY")]
    EqualVerify,

    /// Pushes the next token as data.
    #[display("OP_PUSHDATA1")]
    PushData1,

    /// Pushes the next token, which must hold exactly the given number of
    /// bytes.
    #[display("OP_PUSHBYTES_{0}")]
    PushBytes(u8),

    /// Checks a single signature against a single public key.
    #[display("OP_CHECKSIG")]
    CheckSig,

    /// Checks `m` signatures against `n` public keys.
    #[display("OP_CHECKMULTISIG")]
    CheckMultiSig,

    /// Any other token, pushed verbatim.
    #[display("{0}")]
    Literal(String),
}

impl FromStr for Opcode {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "OP_0" => Opcode::Zero,
            "OP_DUP" => Opcode::Dup,
            "OP_HASH160" => Opcode::Hash160,
            "OP_SHA256" => Opcode::Sha256,
            "OP_EQUAL" => Opcode::Equal,
            "OP_EQUALVERIFY" => Opcode::EqualVerify,
            "OP_PUSHDATA1" => Opcode::PushData1,
            "OP_CHECKSIG" => Opcode::CheckSig,
            "OP_CHECKMULTISIG" => Opcode::CheckMultiSig,
            token => match token.strip_prefix(PUSHBYTES_PREFIX) {
                Some(len) => len
                    .parse::<u8>()
                    .ok()
                    .filter(|len| (1..=MAX_PUSHBYTES).contains(len))
                    .map(Opcode::PushBytes)
                    .ok_or_else(|| TokenError::PushLength(token.to_owned()))?,
                None => Opcode::Literal(token.to_owned()),
            },
        })
    }
}
