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

use std::fmt::{self, Display, Formatter};
use std::iter::FromIterator;

use bitcoin::hashes::hex::{FromHex, ToHex};

use crate::opcode::PUSHNUM_PREFIX;

/// Stack underflow: an operation required more items than the stack holds
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, Display, Error
)]
#[display(doc_comments)]
pub struct StackUnderflow;

/// Value kept on the interpreter stack
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "lowercase")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum StackValue {
    /// Binary data, coming from data pushes, witness items or hash results
    Bytes(Vec<u8>),

    /// Result of a comparison or signature check
    Bool(bool),

    /// Token which is neither an opcode known to the interpreter nor a valid
    /// hex string, kept verbatim (for instance `OP_PUSHNUM_2`)
    Literal(String),
}

impl Display for StackValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StackValue::Bytes(data) => f.write_str(&data.to_hex()),
            StackValue::Bool(value) => Display::fmt(value, f),
            StackValue::Literal(token) => f.write_str(token),
        }
    }
}

impl From<Vec<u8>> for StackValue {
    #[inline]
    fn from(data: Vec<u8>) -> Self { StackValue::Bytes(data) }
}

impl From<&[u8]> for StackValue {
    #[inline]
    fn from(data: &[u8]) -> Self { StackValue::Bytes(data.to_vec()) }
}

impl From<bool> for StackValue {
    #[inline]
    fn from(value: bool) -> Self { StackValue::Bool(value) }
}

impl StackValue {
    /// Interprets script token or witness item: hex strings become
    /// [`StackValue::Bytes`], everything else is kept as
    /// [`StackValue::Literal`].
    pub fn from_token(token: &str) -> StackValue {
        match Vec::<u8>::from_hex(token) {
            Ok(data) => StackValue::Bytes(data),
            Err(_) => StackValue::Literal(token.to_owned()),
        }
    }

    /// Returns binary data, if the value holds any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            StackValue::Bytes(data) => Some(data),
            _ => None,
        }
    }

    /// Checks that the value is exactly the boolean `true`; non-empty data or
    /// literals are not considered true.
    #[inline]
    pub fn is_true(&self) -> bool { matches!(self, StackValue::Bool(true)) }

    /// Parses number from `OP_PUSHNUM_<n>` literal
    pub fn as_pushnum(&self) -> Option<usize> {
        match self {
            StackValue::Literal(token) => token.strip_prefix(PUSHNUM_PREFIX)?.parse().ok(),
            _ => None,
        }
    }
}

/// Interpreter working memory. The top of the stack is the end of the
/// underlying vector.
#[derive(Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct Stack(Vec<StackValue>);

impl Display for Stack {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            Display::fmt(value, f)?;
        }
        f.write_str("]")
    }
}

impl FromIterator<StackValue> for Stack {
    fn from_iter<T: IntoIterator<Item = StackValue>>(iter: T) -> Self {
        Stack(iter.into_iter().collect())
    }
}

impl Extend<StackValue> for Stack {
    fn extend<T: IntoIterator<Item = StackValue>>(&mut self, iter: T) { self.0.extend(iter) }
}

impl Stack {
    /// Constructs empty stack
    #[inline]
    pub fn new() -> Stack { Stack::default() }

    /// Number of items on the stack
    #[inline]
    pub fn len(&self) -> usize { self.0.len() }

    /// Detects empty stack
    #[inline]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Puts value on the top of the stack
    #[inline]
    pub fn push(&mut self, value: impl Into<StackValue>) { self.0.push(value.into()) }

    /// Removes and returns the top value
    pub fn pop(&mut self) -> Result<StackValue, StackUnderflow> {
        self.0.pop().ok_or(StackUnderflow)
    }

    /// Returns the top value without removing it
    pub fn top(&self) -> Result<&StackValue, StackUnderflow> { self.0.last().ok_or(StackUnderflow) }

    /// Iterates stack values from the bottom to the top
    pub fn iter(&self) -> std::slice::Iter<'_, StackValue> { self.0.iter() }

    /// Returns stack values from the bottom to the top
    #[inline]
    pub fn as_slice(&self) -> &[StackValue] { &self.0 }
}
