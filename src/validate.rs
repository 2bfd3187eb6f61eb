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

//! Input and transaction validation.

use log::{debug, warn};

use crate::asm::{Stack, StackValue};
use crate::config::{TaprootPolicy, ValidatorConfig};
use crate::interpreter::{Interpreter, ScriptError};
use crate::sighash::{SighashError, Sighasher};
use crate::template::{reconstruct, SpendTemplate, TemplateError};
use crate::tx::{Transaction, TxDataError};
use crate::verify::{EcdsaVerifier, SignatureVerifier};

/// Reasons for a single input to fail validation
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum InputError {
    /// {0}
    #[from]
    Script(ScriptError),

    /// script execution left the stack empty
    EmptyStack,

    /// stack item #{position} `{value}` left after script execution is not
    /// `true`
    NotTrue {
        /// Position of the item, counting from the bottom of the stack
        position: usize,
        /// The item
        value: StackValue,
    },

    /// taproot spending can't be verified
    UnverifiedTaproot,
}

/// Errors aborting validation of the whole transaction
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ValidationError {
    /// input #{input} ({outpoint}) of transaction {txid} has unsupported
    /// spending: {error}
    UnsupportedTemplate {
        /// Transaction id, if known
        txid: String,
        /// Input index
        input: usize,
        /// Output spent by the input
        outpoint: String,
        /// Details
        error: TemplateError,
    },

    /// signatures of input #{input} ({outpoint}) of transaction {txid} can't
    /// be checked: {error}
    UnsupportedRegime {
        /// Transaction id, if known
        txid: String,
        /// Input index
        input: usize,
        /// Output spent by the input
        outpoint: String,
        /// Details
        error: SighashError,
    },

    /// {0}
    TxData(TxDataError),
}

/// Validation result for a single input
#[derive(Clone, PartialEq, Eq, Debug, Display)]
pub enum InputVerdict {
    /// Input script evaluated to `true`
    #[display("valid")]
    Valid,

    /// Input was not evaluated, but is accepted according to the validator
    /// configuration
    #[display("unverified")]
    Unverified,

    /// Input failed validation
    #[display("invalid: {0}")]
    Invalid(InputError),
}

impl InputVerdict {
    /// Detects verdicts which do not prevent transaction from being valid
    #[inline]
    pub fn is_passed(&self) -> bool { !matches!(self, InputVerdict::Invalid(_)) }
}

/// Validation report for a single input
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("#{index} {template}: {verdict}")]
pub struct InputReport {
    /// Input index
    pub index: usize,

    /// Detected spending template
    pub template: SpendTemplate,

    /// Validation result
    pub verdict: InputVerdict,
}

/// Validation report for a transaction, with an entry for each of its inputs
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TxReport {
    /// Per-input reports, in the input order
    pub inputs: Vec<InputReport>,
}

impl TxReport {
    /// Transaction is valid when none of its inputs failed validation.
    /// Transactions without inputs are valid.
    pub fn is_valid(&self) -> bool { self.inputs.iter().all(|report| report.verdict.is_passed()) }

    /// Detects whether some of the inputs were accepted without verification
    pub fn has_unverified(&self) -> bool {
        self.inputs
            .iter()
            .any(|report| report.verdict == InputVerdict::Unverified)
    }

    /// Iterates over reports of failed inputs
    pub fn failures(&self) -> impl Iterator<Item = &InputReport> + '_ {
        self.inputs
            .iter()
            .filter(|report| !report.verdict.is_passed())
    }
}

/// Transaction script validator
#[derive(Clone, Debug)]
pub struct Validator<V = EcdsaVerifier>
where
    V: SignatureVerifier,
{
    verifier: V,
    config: ValidatorConfig,
}

impl Default for Validator<EcdsaVerifier> {
    fn default() -> Self { Validator::new() }
}

impl Validator<EcdsaVerifier> {
    /// Constructs validator using ECDSA signature verification and default
    /// configuration
    pub fn new() -> Self { Validator::with(EcdsaVerifier, ValidatorConfig::default()) }
}

impl<V> Validator<V>
where
    V: SignatureVerifier,
{
    /// Constructs validator with a custom signature verifier and
    /// configuration
    pub fn with(verifier: V, config: ValidatorConfig) -> Self { Validator { verifier, config } }

    /// Validates transaction, returning `true` if every input is valid.
    ///
    /// Failure reasons are reported through `log` at `debug` level; use
    /// [`Validator::check`] to get them as values.
    pub fn validate(&self, tx: &Transaction) -> bool {
        match self.check(tx) {
            Ok(report) => report.is_valid(),
            Err(err) => {
                debug!("transaction rejected: {}", err);
                false
            }
        }
    }

    /// Validates all transaction inputs, producing per-input report.
    ///
    /// Every input is evaluated on its own. The first input which spending
    /// template is not supported, or which signatures can't be checked,
    /// aborts validation of the whole transaction with an error. Signature
    /// hash data common to all inputs are computed once per transaction.
    pub fn check(&self, tx: &Transaction) -> Result<TxReport, ValidationError> {
        let mut sighasher = Sighasher::new(tx);
        let inputs = (0..tx.vin.len())
            .map(|index| self.evaluate(&mut sighasher, index))
            .collect::<Result<_, _>>()?;
        Ok(TxReport { inputs })
    }

    /// Validates a single transaction input
    pub fn check_input(
        &self,
        tx: &Transaction,
        index: usize,
    ) -> Result<InputReport, ValidationError> {
        self.evaluate(&mut Sighasher::new(tx), index)
    }

    fn evaluate(
        &self,
        sighasher: &mut Sighasher<'_>,
        index: usize,
    ) -> Result<InputReport, ValidationError> {
        let tx = sighasher.tx();
        let input = tx.input(index).map_err(ValidationError::TxData)?;
        let outpoint = || format!("{}:{}", input.txid, input.vout);

        let reconstruction =
            reconstruct(input).map_err(|error| ValidationError::UnsupportedTemplate {
                txid: tx.name().to_owned(),
                input: index,
                outpoint: outpoint(),
                error,
            })?;
        let template = reconstruction.template;

        let verdict = if !template.is_verifiable() {
            match self.config.taproot {
                TaprootPolicy::Unverified => {
                    warn!(
                        "input #{} ({}) of transaction {} is accepted without verification",
                        index,
                        outpoint(),
                        tx.name()
                    );
                    InputVerdict::Unverified
                }
                TaprootPolicy::Reject => InputVerdict::Invalid(InputError::UnverifiedTaproot),
            }
        } else {
            let result = Interpreter::new(&self.verifier, sighasher, index)
                .with_step_limit(self.config.max_steps)
                .execute(reconstruction.script, reconstruction.stack);
            match result {
                Ok(stack) => match reduce(&stack) {
                    Ok(()) => InputVerdict::Valid,
                    Err(err) => InputVerdict::Invalid(err),
                },
                Err(ScriptError::Sighash(error)) => {
                    return Err(ValidationError::UnsupportedRegime {
                        txid: tx.name().to_owned(),
                        input: index,
                        outpoint: outpoint(),
                        error,
                    })
                }
                Err(err) => InputVerdict::Invalid(err.into()),
            }
        };

        if let InputVerdict::Invalid(ref err) = verdict {
            debug!("input #{} ({}) {} is invalid: {}", index, outpoint(), template, err);
        }

        Ok(InputReport {
            index,
            template,
            verdict,
        })
    }
}

/// Input is valid if the script leaves a non-empty stack consisting of
/// boolean `true` values only.
fn reduce(stack: &Stack) -> Result<(), InputError> {
    if stack.is_empty() {
        return Err(InputError::EmptyStack);
    }
    match stack.iter().enumerate().find(|(_, value)| !value.is_true()) {
        Some((position, value)) => Err(InputError::NotTrue {
            position,
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

/// Validates transaction using ECDSA verifier with the default configuration
pub fn validate(tx: &Transaction) -> bool { Validator::new().validate(tx) }
