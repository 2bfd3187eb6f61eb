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

use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::iter::FromIterator;
use std::str::FromStr;

/// Script in its token form: an ordered sequence of opcode mnemonics and
/// hex-encoded data pushes.
///
/// The interpreter consumes tokens strictly left-to-right by turning the
/// script into an iterator, so a script works as a queue and can't be
/// re-entered once executed.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(Wrapper, Clone, PartialEq, Eq, Hash, Default, Debug, From)]
pub struct AsmScript(Vec<String>);

impl FromStr for AsmScript {
    type Err = Infallible;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(AsmScript::parse(s)) }
}

impl Display for AsmScript {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut tokens = self.0.iter();
        if let Some(first) = tokens.next() {
            f.write_str(first)?;
        }
        for token in tokens {
            write!(f, " {}", token)?;
        }
        Ok(())
    }
}

impl IntoIterator for AsmScript {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl FromIterator<String> for AsmScript {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        AsmScript(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for AsmScript {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        AsmScript(iter.into_iter().map(str::to_owned).collect())
    }
}

impl Extend<String> for AsmScript {
    fn extend<T: IntoIterator<Item = String>>(&mut self, iter: T) { self.0.extend(iter) }
}

impl AsmScript {
    /// Constructs empty script
    #[inline]
    pub fn new() -> AsmScript { AsmScript::default() }

    /// Splits `asm` string into tokens on whitespace. Empty strings produce
    /// empty scripts.
    pub fn parse(asm: &str) -> AsmScript { asm.split_whitespace().collect() }

    /// Number of tokens in the script
    #[inline]
    pub fn len(&self) -> usize { self.0.len() }

    /// Detects script with no tokens
    #[inline]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Checks whether the script contains the token
    pub fn contains(&self, token: &str) -> bool { self.0.iter().any(|t| t == token) }

    /// Returns token at the given position
    pub fn token(&self, index: usize) -> Option<&str> { self.0.get(index).map(String::as_str) }

    /// Returns the last token of the script
    pub fn last_token(&self) -> Option<&str> { self.0.last().map(String::as_str) }

    /// Appends a single token to the end of the script
    pub fn push_token(&mut self, token: impl Into<String>) { self.0.push(token.into()) }

    /// Appends all tokens of the other script to the end of this one
    pub fn append(&mut self, other: AsmScript) { self.0.extend(other.0) }

    /// Removes `count` trailing tokens and returns them as a separate script.
    ///
    /// Returns `None` and leaves the script untouched if it contains less
    /// than `count` tokens.
    pub fn split_tail(&mut self, count: usize) -> Option<AsmScript> {
        let at = self.0.len().checked_sub(count)?;
        Some(AsmScript(self.0.split_off(at)))
    }
}
