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

//! Token-level representation of bitcoin scripts, as they appear in the
//! `*_asm` fields of block explorers: a whitespace-separated list of opcode
//! mnemonics and hex-encoded data pushes.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code)]

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod opcode;
mod script;
mod stack;

pub use opcode::{Opcode, TokenError, MAX_PUSHBYTES};
pub use script::AsmScript;
pub use stack::{Stack, StackUnderflow, StackValue};
