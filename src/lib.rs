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

//! Validation of bitcoin transaction input scripts.
//!
//! For each input the library reconstructs the script which has to be
//! evaluated for the spent output type (P2PKH, P2SH, nested and native segwit
//! v0 templates), runs it through a straight-line interpreter over the token
//! (`asm`) form of the scripts, and checks signatures using legacy or BIP-143
//! signature hashes. Taproot inputs are not verified.
//!
//! ```ignore
//! let tx: validator::Transaction = serde_json::from_str(json)?;
//! let report = validator::Validator::new().check(&tx)?;
//! for input in report.inputs {
//!     println!("{}", input);
//! }
//! ```

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs)]

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

pub extern crate bitcoin_asm as asm;

mod block;
mod config;
mod interpreter;
mod sighash;
mod template;
mod tx;
mod validate;
mod verify;

pub use block::{
    merkle_root, select_transactions, target_to_bits, BlockError, HeaderTemplate, Selected,
    Selection, SelectionLimits, DEFAULT_TARGET, DEFAULT_VERSION,
};
pub use config::{TaprootPolicy, ValidatorConfig};
pub use interpreter::{Interpreter, ScriptError};
pub use sighash::{SighashContext, SighashError, SighashRegime, Sighasher, SkeletonCache};
pub use template::{reconstruct, Reconstruction, SpendTemplate, TemplateError};
pub use tx::{Input, Output, Prevout, ScriptPubkeyType, Transaction, TxDataError};
pub use validate::{
    validate, InputError, InputReport, InputVerdict, TxReport, ValidationError, Validator,
};
pub use verify::{EcdsaVerifier, SignatureVerifier};
