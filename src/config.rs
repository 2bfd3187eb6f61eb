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

/// Treatment of taproot inputs, which are never verified
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "lowercase")
)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum TaprootPolicy {
    /// Input passes validation and is reported as unverified
    #[display("unverified")]
    Unverified,

    /// Input fails validation
    #[display("reject")]
    Reject,
}

impl Default for TaprootPolicy {
    fn default() -> Self { TaprootPolicy::Unverified }
}

/// Validator configuration
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", default)
)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct ValidatorConfig {
    /// How taproot inputs are treated
    pub taproot: TaprootPolicy,

    /// Maximum number of opcodes executed per input; unlimited if not set
    pub max_steps: Option<usize>,
}

impl ValidatorConfig {
    /// Configuration failing all inputs which can't be verified
    pub fn strict() -> ValidatorConfig {
        ValidatorConfig {
            taproot: TaprootPolicy::Reject,
            ..default!()
        }
    }
}
