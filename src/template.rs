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

//! Spending templates and reconstruction of the script which has to be
//! evaluated for an input spending output of each template.

use crate::asm::{AsmScript, Stack, StackValue};
use crate::tx::{Input, ScriptPubkeyType};

const OP_CHECKSIG: &str = "OP_CHECKSIG";
const OP_CSV: &str = "OP_CSV";
const OP_DROP: &str = "OP_DROP";
const OP_DUP: &str = "OP_DUP";
const OP_EQUAL: &str = "OP_EQUAL";
const OP_EQUALVERIFY: &str = "OP_EQUALVERIFY";
const OP_HASH160: &str = "OP_HASH160";
const OP_SHA256: &str = "OP_SHA256";

/// Errors detecting spending template of a transaction input
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum TemplateError {
    /// spending `{0}` outputs is not supported
    UnsupportedType(ScriptPubkeyType),

    /// `{0}` output is locked with a script using OP_CSV or OP_DROP, which
    /// is not supported
    Timelocked(ScriptPubkeyType),

    /// `{0}` output is spent with a witness of {1} items, which does not
    /// match any known template
    WitnessMismatch(ScriptPubkeyType, usize),

    /// `{0}` output is spent without providing redeem or witness script
    NoInnerScript(ScriptPubkeyType),

    /// unlocking script of {0} tokens is too short for {1} spending
    ShortScriptSig(usize, SpendTemplate),

    /// locking script has no public key hash
    NoPubkeyHash,
}

/// Way in which a transaction input unlocks the output it spends
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "kebab-case")
)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum SpendTemplate {
    /// Legacy public key hash spending
    #[display("p2pkh")]
    P2pkh,

    /// Legacy script hash spending with a non-segwit redeem script
    #[display("p2sh")]
    P2sh,

    /// Public key hash witness program nested into P2SH
    #[display("p2sh-p2wpkh")]
    P2shP2wpkh,

    /// Script hash witness program nested into P2SH
    #[display("p2sh-p2wsh")]
    P2shP2wsh,

    /// Native segwit v0 script hash spending
    #[display("p2wsh")]
    P2wsh,

    /// Native segwit v0 public key hash spending
    #[display("p2wpkh")]
    P2wpkh,

    /// Taproot spending (key or script path), which is not verified
    #[display("p2tr")]
    #[cfg_attr(feature = "serde", serde(rename = "p2tr"))]
    Taproot,
}

impl SpendTemplate {
    /// Detects template of the input spending. Rules are tried in a fixed
    /// order and exactly one of them applies.
    pub fn classify(input: &Input) -> Result<SpendTemplate, TemplateError> {
        let ty = &input.prevout.scriptpubkey_type;
        let witness = input.witness.as_deref();
        match (ty, witness) {
            (ScriptPubkeyType::P2pkh, _) => Ok(SpendTemplate::P2pkh),
            (ScriptPubkeyType::P2sh, None) => match input.redeem_script() {
                Some(redeem) if redeem.contains(OP_CSV) => {
                    Err(TemplateError::Timelocked(ty.clone()))
                }
                Some(_) => Ok(SpendTemplate::P2sh),
                None => Err(TemplateError::NoInnerScript(ty.clone())),
            },
            (ScriptPubkeyType::P2sh, Some(witness)) if witness.len() == 2 => {
                Ok(SpendTemplate::P2shP2wpkh)
            }
            (ScriptPubkeyType::P2sh, Some(witness)) if witness.len() > 2 => {
                match input.witness_script() {
                    Some(script) if script.contains(OP_CSV) || script.contains(OP_DROP) => {
                        Err(TemplateError::Timelocked(ty.clone()))
                    }
                    Some(_) => Ok(SpendTemplate::P2shP2wsh),
                    None => Err(TemplateError::NoInnerScript(ty.clone())),
                }
            }
            (ScriptPubkeyType::V0P2wsh, Some(witness))
                if witness.first().map(String::is_empty) == Some(true) =>
            {
                match input.witness_script() {
                    Some(_) => Ok(SpendTemplate::P2wsh),
                    None => Err(TemplateError::NoInnerScript(ty.clone())),
                }
            }
            (ScriptPubkeyType::V0P2wpkh, Some(witness)) if witness.len() >= 2 => {
                Ok(SpendTemplate::P2wpkh)
            }
            (
                ScriptPubkeyType::P2sh | ScriptPubkeyType::V0P2wsh | ScriptPubkeyType::V0P2wpkh,
                witness,
            ) => Err(TemplateError::WitnessMismatch(
                ty.clone(),
                witness.map(<[String]>::len).unwrap_or_default(),
            )),
            (ScriptPubkeyType::V1P2tr, _) => Ok(SpendTemplate::Taproot),
            (ty, _) => Err(TemplateError::UnsupportedType(ty.clone())),
        }
    }

    /// Taproot spendings are not evaluated; all other templates are.
    #[inline]
    pub fn is_verifiable(self) -> bool { self != SpendTemplate::Taproot }
}

/// Script which has to be evaluated for an input, together with the stack
/// state it has to be evaluated against.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Reconstruction {
    /// Detected spending template
    pub template: SpendTemplate,

    /// Unlocking and locking parts of the script, concatenated in the order
    /// of execution. Empty for taproot spendings.
    pub script: AsmScript,

    /// Witness items which are put on the stack before the script execution
    pub stack: Stack,
}

/// Produces script and initial stack for the input evaluation, according to
/// the input spending template.
pub fn reconstruct(input: &Input) -> Result<Reconstruction, TemplateError> {
    let template = SpendTemplate::classify(input)?;
    let ty = &input.prevout.scriptpubkey_type;
    let witness = input.witness_items();

    let mut script = AsmScript::new();
    let mut stack = Stack::new();
    match template {
        SpendTemplate::P2pkh => {
            script.append(input.scriptsig_tokens());
            script.append(input.prevout.script_tokens());
        }

        SpendTemplate::P2sh => {
            // The redeem script push is moved after the redeem script body,
            // so that the body is executed over the signatures and the
            // pushed redeem script is then checked against the P2SH hash.
            let mut scriptsig = input.scriptsig_tokens();
            let len = scriptsig.len();
            let redeem_push = scriptsig
                .split_tail(2)
                .ok_or(TemplateError::ShortScriptSig(len, template))?;
            let redeem = input
                .redeem_script()
                .ok_or_else(|| TemplateError::NoInnerScript(ty.clone()))?;
            script.append(scriptsig);
            script.append(redeem);
            script.append(redeem_push);
            script.append(input.prevout.script_tokens());
        }

        SpendTemplate::P2shP2wpkh => {
            script.push_token(OP_CHECKSIG);
            script.append(input.scriptsig_tokens());
            script.append(input.prevout.script_tokens());
            stack.extend(witness.iter().take(2).map(|item| StackValue::from_token(item)));
        }

        SpendTemplate::P2shP2wsh => {
            let scriptsig = input.scriptsig_tokens();
            let program = scriptsig
                .token(1)
                .ok_or(TemplateError::ShortScriptSig(scriptsig.len(), template))?;
            script.append(witness_script(input)?);
            script.push_token(program);
            script.append(input.prevout.script_tokens());
            stack.extend(witness_inner_items(witness));
        }

        SpendTemplate::P2wsh => {
            script.append(witness_script(input)?);
            script.push_token(witness.last().map(String::as_str).unwrap_or_default());
            script.push_token(OP_SHA256);
            script.append(input.prevout.script_tokens());
            script.push_token(OP_EQUAL);
            stack.extend(witness_inner_items(witness));
        }

        SpendTemplate::P2wpkh => {
            let locking = input.prevout.script_tokens();
            let pubkey_hash = locking.token(2).ok_or(TemplateError::NoPubkeyHash)?;
            script = [OP_DUP, OP_HASH160, pubkey_hash, OP_EQUALVERIFY, OP_CHECKSIG]
                .into_iter()
                .collect();
            stack.extend(witness.iter().take(2).map(|item| StackValue::from_token(item)));
        }

        SpendTemplate::Taproot => {}
    }

    Ok(Reconstruction {
        template,
        script,
        stack,
    })
}

fn witness_script(input: &Input) -> Result<AsmScript, TemplateError> {
    input
        .witness_script()
        .ok_or_else(|| TemplateError::NoInnerScript(input.prevout.scriptpubkey_type.clone()))
}

/// Witness items without the first (multisig dummy) and the last (witness
/// script) ones.
fn witness_inner_items(witness: &[String]) -> impl Iterator<Item = StackValue> + '_ {
    witness
        .get(1..witness.len().saturating_sub(1))
        .unwrap_or_default()
        .iter()
        .map(|item| StackValue::from_token(item))
}
