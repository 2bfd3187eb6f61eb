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

//! Straight-line interpreter for scripts in token form.

use std::str::FromStr;

use bitcoin::hashes::hex::FromHex;
use bitcoin::hashes::{hash160, sha256, Hash};
use log::trace;

use crate::asm::{AsmScript, Opcode, Stack, StackUnderflow, StackValue, TokenError};
use crate::sighash::{SighashError, Sighasher};
use crate::verify::SignatureVerifier;

/// Script execution failures. All of them, except [`ScriptError::Sighash`],
/// fail only the input under evaluation.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ScriptError {
    /// malformed script token: {0}
    #[from]
    Token(TokenError),

    /// OP_PUSHBYTES_{expected} is followed by {actual} bytes of data
    PushSizeMismatch {
        /// Number of bytes declared by the opcode
        expected: u8,
        /// Number of bytes actually provided
        actual: usize,
    },

    /// {0} is not followed by data to push
    MissingPushData(Opcode),

    /// data `{0}` following a push opcode is not hex-encoded
    NonHexPushData(String),

    /// OP_EQUALVERIFY failed: `{0}` is not equal to `{1}`
    VerifyFailed(StackValue, StackValue),

    /// {0} requires binary data operand, while `{1}` was found
    NonDataOperand(Opcode, StackValue),

    /// `{0}` is not a valid OP_CHECKMULTISIG key or signature count
    InvalidPushNum(StackValue),

    /// script execution exceeded limit of {0} steps
    StepLimitExceeded(usize),

    /// operation requires more items than the stack holds
    #[from(StackUnderflow)]
    StackUnderflow,

    /// {0}
    #[from]
    Sighash(SighashError),
}

/// Interpreter of a single transaction input script.
///
/// Signature checks go through the [`Sighasher`] of the transaction, which may
/// be shared by the interpreters of all its inputs.
pub struct Interpreter<'a, 'tx, V: SignatureVerifier + ?Sized> {
    verifier: &'a V,
    sighasher: &'a mut Sighasher<'tx>,
    input_index: usize,
    max_steps: Option<usize>,
}

impl<'a, 'tx, V> Interpreter<'a, 'tx, V>
where
    V: SignatureVerifier + ?Sized,
{
    /// Constructs interpreter for the input with the given index of the
    /// transaction behind the `sighasher`
    pub fn new(verifier: &'a V, sighasher: &'a mut Sighasher<'tx>, input_index: usize) -> Self {
        Interpreter {
            verifier,
            sighasher,
            input_index,
            max_steps: None,
        }
    }

    /// Limits number of executed opcodes. Data tokens consumed by push
    /// opcodes do not count.
    pub fn with_step_limit(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Executes script over the stack, returning the final stack state.
    ///
    /// The script is consumed token by token, from left to right; execution
    /// stops on the first failure.
    pub fn execute(&mut self, script: AsmScript, mut stack: Stack) -> Result<Stack, ScriptError> {
        let mut tokens = script.into_iter();
        let mut steps = 0usize;
        while let Some(token) = tokens.next() {
            steps += 1;
            if let Some(max) = self.max_steps.filter(|max| steps > *max) {
                return Err(ScriptError::StepLimitExceeded(max));
            }
            let opcode = Opcode::from_str(&token)?;
            trace!(
                "input #{} step {}: {} over stack of {} items",
                self.input_index,
                steps,
                opcode,
                stack.len()
            );
            self.step(opcode, &mut tokens, &mut stack)?;
        }
        Ok(stack)
    }

    fn step(
        &mut self,
        opcode: Opcode,
        tokens: &mut impl Iterator<Item = String>,
        stack: &mut Stack,
    ) -> Result<(), ScriptError> {
        match opcode {
            Opcode::Zero => {}

            Opcode::Dup => {
                let top = stack.top()?.clone();
                stack.push(top);
            }

            Opcode::Hash160 => {
                let data = pop_data(stack, &opcode)?;
                stack.push(hash160::Hash::hash(&data).into_inner().to_vec());
            }

            Opcode::Sha256 => {
                let data = pop_data(stack, &opcode)?;
                stack.push(sha256::Hash::hash(&data).into_inner().to_vec());
            }

            Opcode::Equal => {
                let first = stack.pop()?;
                let second = stack.pop()?;
                stack.push(first == second);
            }

            Opcode::EqualVerify => {
                let first = stack.pop()?;
                let second = stack.pop()?;
                if first != second {
                    return Err(ScriptError::VerifyFailed(first, second));
                }
            }

            Opcode::PushData1 => {
                let data = tokens.next().ok_or(ScriptError::MissingPushData(opcode))?;
                stack.push(StackValue::from_token(&data));
            }

            Opcode::PushBytes(expected) => {
                let token = tokens.next().ok_or(ScriptError::MissingPushData(opcode))?;
                let data = Vec::<u8>::from_hex(&token)
                    .map_err(|_| ScriptError::NonHexPushData(token))?;
                if data.len() != expected as usize {
                    return Err(ScriptError::PushSizeMismatch {
                        expected,
                        actual: data.len(),
                    });
                }
                stack.push(data);
            }

            Opcode::CheckSig => {
                let pubkey = pop_data(stack, &opcode)?;
                let signature = pop_data(stack, &opcode)?;
                let valid = self.check(&[signature], &[pubkey])?;
                stack.push(valid);
            }

            Opcode::CheckMultiSig => {
                let pubkeys = pop_counted(stack, &opcode)?;
                let signatures = pop_counted(stack, &opcode)?;
                let valid = self.check(&signatures, &pubkeys)?;
                stack.push(valid);
            }

            Opcode::Literal(token) => stack.push(StackValue::from_token(&token)),
        }
        Ok(())
    }

    fn check(
        &mut self,
        signatures: &[Vec<u8>],
        pubkeys: &[Vec<u8>],
    ) -> Result<bool, SighashError> {
        let valid = self
            .sighasher
            .check_signatures(self.verifier, self.input_index, signatures, pubkeys)?;
        trace!(
            "input #{}: {} of {} signature(s) against {} key(s)",
            self.input_index,
            if valid { "accepted" } else { "rejected" },
            signatures.len(),
            pubkeys.len()
        );
        Ok(valid)
    }
}

fn pop_data(stack: &mut Stack, opcode: &Opcode) -> Result<Vec<u8>, ScriptError> {
    match stack.pop()? {
        StackValue::Bytes(data) => Ok(data),
        other => Err(ScriptError::NonDataOperand(opcode.clone(), other)),
    }
}

/// Pops an `OP_PUSHNUM_<n>` count followed by `n` data items. Items are
/// returned in the order they were pushed.
fn pop_counted(stack: &mut Stack, opcode: &Opcode) -> Result<Vec<Vec<u8>>, ScriptError> {
    let count = stack.pop()?;
    let count = count.as_pushnum().ok_or(ScriptError::InvalidPushNum(count))?;
    let mut items = (0..count)
        .map(|_| pop_data(stack, opcode))
        .collect::<Result<Vec<_>, _>>()?;
    items.reverse();
    Ok(items)
}
