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

//! Construction of signed transactions in the explorer data format.

#![allow(dead_code)]

use bitcoin::blockdata::opcodes::all::*;
use bitcoin::blockdata::opcodes::All as Opcode;
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::hex::ToHex;
use bitcoin::hashes::{hash160, sha256, Hash};
use bitcoin::util::sighash::SighashCache;
use bitcoin::{EcdsaSighashType, Script};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use validator::{Input, Prevout, ScriptPubkeyType, Transaction};

/// Value of every spent output
pub const VALUE: u64 = 50_000;

/// Fee paid by transactions constructed with [`transaction`]
pub const FEE: u64 = 1_000;

pub fn init_logger() { let _ = env_logger::builder().is_test(true).try_init(); }

pub struct Key {
    pub seckey: SecretKey,
    pub pubkey: Vec<u8>,
}

impl Key {
    pub fn new(seed: u8) -> Key {
        let seckey = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
        let pubkey = PublicKey::from_secret_key_global(&seckey).serialize().to_vec();
        Key { seckey, pubkey }
    }

    pub fn pubkey_hash(&self) -> Vec<u8> { hash160::Hash::hash(&self.pubkey).into_inner().to_vec() }

    /// Signs the hash, appending `SIGHASH_ALL` byte
    pub fn sign(&self, sighash: &[u8]) -> Vec<u8> {
        let msg = Message::from_slice(sighash).expect("32-byte hash");
        let mut sig = SECP256K1
            .sign_ecdsa(&msg, &self.seckey)
            .serialize_der()
            .to_vec();
        sig.push(EcdsaSighashType::All as u8);
        sig
    }
}

/// Token form of a data push, as block explorers render it
pub fn push_asm(data: &[u8]) -> String {
    match data.len() {
        0 => "OP_0".to_owned(),
        len @ 1..=75 => format!("OP_PUSHBYTES_{} {}", len, data.to_hex()),
        _ => format!("OP_PUSHDATA1 {}", data.to_hex()),
    }
}

/// Script together with its token form
#[derive(Clone, Debug)]
pub struct Built {
    pub script: Script,
    pub asm: String,
}

impl Built {
    pub fn hex(&self) -> String { self.script.as_bytes().to_hex() }

    pub fn bytes(&self) -> &[u8] { self.script.as_bytes() }
}

/// Builds script in both raw and token forms
pub struct ScriptBuilder {
    builder: Builder,
    tokens: Vec<String>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        ScriptBuilder {
            builder: Builder::new(),
            tokens: vec![],
        }
    }

    pub fn op(mut self, opcode: Opcode, name: &str) -> Self {
        self.builder = self.builder.push_opcode(opcode);
        self.tokens.push(name.to_owned());
        self
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.builder = self.builder.push_slice(data);
        self.tokens.push(push_asm(data));
        self
    }

    pub fn build(self) -> Built {
        Built {
            script: self.builder.into_script(),
            asm: self.tokens.join(" "),
        }
    }
}

pub fn p2pkh_script(pubkey_hash: &[u8]) -> Built {
    ScriptBuilder::new()
        .op(OP_DUP, "OP_DUP")
        .op(OP_HASH160, "OP_HASH160")
        .data(pubkey_hash)
        .op(OP_EQUALVERIFY, "OP_EQUALVERIFY")
        .op(OP_CHECKSIG, "OP_CHECKSIG")
        .build()
}

pub fn p2sh_script(redeem: &[u8]) -> Built {
    ScriptBuilder::new()
        .op(OP_HASH160, "OP_HASH160")
        .data(&hash160::Hash::hash(redeem).into_inner())
        .op(OP_EQUAL, "OP_EQUAL")
        .build()
}

pub fn p2wpkh_script(pubkey_hash: &[u8]) -> Built {
    ScriptBuilder::new()
        .op(OP_PUSHBYTES_0, "OP_0")
        .data(pubkey_hash)
        .build()
}

pub fn p2wsh_script(witness_script: &[u8]) -> Built {
    ScriptBuilder::new()
        .op(OP_PUSHBYTES_0, "OP_0")
        .data(&sha256::Hash::hash(witness_script).into_inner())
        .build()
}

pub fn p2tr_script() -> Built {
    ScriptBuilder::new()
        .op(OP_PUSHNUM_1, "OP_PUSHNUM_1")
        .data(&[0x5a; 32])
        .build()
}

fn pushnum(n: usize) -> (Opcode, String) {
    let opcode = match n {
        1 => OP_PUSHNUM_1,
        2 => OP_PUSHNUM_2,
        3 => OP_PUSHNUM_3,
        _ => unimplemented!("multisig with more than 3 keys"),
    };
    (opcode, format!("OP_PUSHNUM_{}", n))
}

/// `m`-of-`n` bare multisig script
pub fn multisig(m: usize, keys: &[Key]) -> Built {
    let (op_m, name_m) = pushnum(m);
    let (op_n, name_n) = pushnum(keys.len());
    keys.iter()
        .fold(ScriptBuilder::new().op(op_m, &name_m), |builder, key| builder.data(&key.pubkey))
        .op(op_n, &name_n)
        .op(OP_CHECKMULTISIG, "OP_CHECKMULTISIG")
        .build()
}

pub fn hashlock(preimage: &[u8]) -> Built {
    ScriptBuilder::new()
        .op(OP_SHA256, "OP_SHA256")
        .data(&sha256::Hash::hash(preimage).into_inner())
        .op(OP_EQUAL, "OP_EQUAL")
        .build()
}

pub fn prevout(ty: &str, script: &Built, value: u64) -> Prevout {
    Prevout {
        scriptpubkey: script.hex(),
        scriptpubkey_asm: script.asm.clone(),
        scriptpubkey_type: ScriptPubkeyType::from(ty),
        scriptpubkey_address: None,
        value,
    }
}

/// Transaction spending the inputs into a single P2PKH output and paying the
/// given fee
pub fn transaction_with_fee(vin: Vec<Input>, fee: u64) -> Transaction {
    let value = vin.iter().map(|input| input.prevout.value).sum::<u64>() - fee;
    Transaction {
        txid: None,
        version: 2,
        locktime: 0,
        vin,
        vout: vec![prevout("p2pkh", &p2pkh_script(&[0x11; 20]), value)],
    }
}

pub fn transaction(vin: Vec<Input>) -> Transaction { transaction_with_fee(vin, FEE) }

pub fn legacy_sighash(tx: &Transaction, index: usize, script_code: &Script) -> Vec<u8> {
    let skeleton = tx.sighash_skeleton().expect("valid transaction data");
    skeleton
        .signature_hash(index, script_code, EcdsaSighashType::All as u32)
        .into_inner()
        .to_vec()
}

pub fn segwit_sighash(tx: &Transaction, index: usize, script_code: &Script) -> Vec<u8> {
    let skeleton = tx.sighash_skeleton().expect("valid transaction data");
    let value = tx.vin[index].prevout.value;
    SighashCache::new(&skeleton)
        .segwit_signature_hash(index, script_code, value, EcdsaSighashType::All)
        .expect("input index within range")
        .into_inner()
        .to_vec()
}

/// The way an input spends its output
pub enum Spend {
    P2pkh(Key),
    /// 2-of-n multisig redeem script
    P2shMultisig(Vec<Key>),
    P2shP2wpkh(Key),
    /// 2-of-n multisig witness script
    P2shP2wsh(Vec<Key>),
    P2wpkh(Key),
    P2wshHashlock(Vec<u8>),
    /// 1-of-n multisig witness script
    P2wshMultisig(Vec<Key>),
    Taproot,
    Nonstandard,
}

impl Spend {
    /// Unsigned input spending an output of the given kind
    pub fn input(&self, n: u8) -> Input {
        let mut input = Input {
            txid: format!("{:02x}", n).repeat(32),
            vout: u32::from(n),
            prevout: prevout("p2pkh", &p2pkh_script(&[0; 20]), VALUE),
            scriptsig: String::new(),
            scriptsig_asm: String::new(),
            witness: None,
            is_coinbase: false,
            sequence: 0xffff_fffd,
            inner_redeemscript_asm: None,
            inner_witnessscript_asm: None,
        };
        match self {
            Spend::P2pkh(key) => {
                input.prevout = prevout("p2pkh", &p2pkh_script(&key.pubkey_hash()), VALUE);
            }
            Spend::P2shMultisig(keys) => {
                let redeem = multisig(2, keys);
                input.prevout = prevout("p2sh", &p2sh_script(redeem.bytes()), VALUE);
                input.inner_redeemscript_asm = Some(redeem.asm);
            }
            Spend::P2shP2wpkh(key) => {
                let program = p2wpkh_script(&key.pubkey_hash());
                input.prevout = prevout("p2sh", &p2sh_script(program.bytes()), VALUE);
                let scriptsig = ScriptBuilder::new().data(program.bytes()).build();
                input.scriptsig = scriptsig.hex();
                input.scriptsig_asm = scriptsig.asm;
                input.witness = Some(vec![]);
            }
            Spend::P2shP2wsh(keys) => {
                let witness_script = multisig(2, keys);
                let program = p2wsh_script(witness_script.bytes());
                input.prevout = prevout("p2sh", &p2sh_script(program.bytes()), VALUE);
                let scriptsig = ScriptBuilder::new().data(program.bytes()).build();
                input.scriptsig = scriptsig.hex();
                input.scriptsig_asm = scriptsig.asm;
                input.witness = Some(vec![]);
                input.inner_witnessscript_asm = Some(witness_script.asm);
            }
            Spend::P2wpkh(key) => {
                input.prevout = prevout("v0_p2wpkh", &p2wpkh_script(&key.pubkey_hash()), VALUE);
                input.witness = Some(vec![]);
            }
            Spend::P2wshHashlock(preimage) => {
                let witness_script = hashlock(preimage);
                input.prevout =
                    prevout("v0_p2wsh", &p2wsh_script(witness_script.bytes()), VALUE);
                input.witness = Some(vec![String::new(), preimage.to_hex(), witness_script.hex()]);
                input.inner_witnessscript_asm = Some(witness_script.asm);
            }
            Spend::P2wshMultisig(keys) => {
                let witness_script = multisig(1, keys);
                input.prevout =
                    prevout("v0_p2wsh", &p2wsh_script(witness_script.bytes()), VALUE);
                input.witness = Some(vec![]);
                input.inner_witnessscript_asm = Some(witness_script.asm);
            }
            Spend::Taproot => {
                input.prevout = prevout("v1_p2tr", &p2tr_script(), VALUE);
                input.witness = Some(vec![[0x77u8; 64][..].to_hex()]);
            }
            Spend::Nonstandard => {
                let script = ScriptBuilder::new().op(OP_PUSHNUM_1, "OP_PUSHNUM_1").build();
                input.prevout = prevout("nonstandard", &script, VALUE);
            }
        }
        input
    }

    /// Puts signatures into the input unlocking script or witness
    pub fn sign(&self, tx: &mut Transaction, index: usize) {
        match self {
            Spend::P2pkh(key) => {
                let script_code = p2pkh_script(&key.pubkey_hash()).script;
                let sig = key.sign(&legacy_sighash(tx, index, &script_code));
                let scriptsig = ScriptBuilder::new().data(&sig).data(&key.pubkey).build();
                tx.vin[index].scriptsig = scriptsig.hex();
                tx.vin[index].scriptsig_asm = scriptsig.asm;
            }
            Spend::P2shMultisig(keys) => {
                let redeem = multisig(2, keys);
                let sighash = legacy_sighash(tx, index, &redeem.script);
                let scriptsig = ScriptBuilder::new()
                    .op(OP_PUSHBYTES_0, "OP_0")
                    .data(&keys[0].sign(&sighash))
                    .data(&keys[1].sign(&sighash))
                    .data(redeem.bytes())
                    .build();
                tx.vin[index].scriptsig = scriptsig.hex();
                tx.vin[index].scriptsig_asm = scriptsig.asm;
            }
            Spend::P2shP2wpkh(key) | Spend::P2wpkh(key) => {
                let script_code = p2pkh_script(&key.pubkey_hash()).script;
                let sig = key.sign(&segwit_sighash(tx, index, &script_code));
                tx.vin[index].witness = Some(vec![sig.to_hex(), key.pubkey.to_hex()]);
            }
            Spend::P2shP2wsh(keys) => {
                let witness_script = multisig(2, keys);
                let sighash = segwit_sighash(tx, index, &witness_script.script);
                tx.vin[index].witness = Some(vec![
                    String::new(),
                    keys[0].sign(&sighash).to_hex(),
                    keys[1].sign(&sighash).to_hex(),
                    witness_script.hex(),
                ]);
            }
            Spend::P2wshMultisig(keys) => {
                let witness_script = multisig(1, keys);
                let sighash = segwit_sighash(tx, index, &witness_script.script);
                tx.vin[index].witness = Some(vec![
                    String::new(),
                    keys[0].sign(&sighash).to_hex(),
                    witness_script.hex(),
                ]);
            }
            Spend::P2wshHashlock(_) | Spend::Taproot | Spend::Nonstandard => {}
        }
    }
}

/// Transaction with an input for each spend, all signed
pub fn signed_tx(spends: &[Spend]) -> Transaction {
    let vin = spends
        .iter()
        .zip(1u8..)
        .map(|(spend, n)| spend.input(n))
        .collect();
    let mut tx = transaction(vin);
    for (index, spend) in spends.iter().enumerate() {
        spend.sign(&mut tx, index);
    }
    tx
}

/// Flips a bit in the byte with the given position of a hex string
pub fn flip_hex(hex: &str, position: usize) -> String {
    use bitcoin::hashes::hex::FromHex;

    let mut data = Vec::<u8>::from_hex(hex).expect("hex string");
    data[position] ^= 0x01;
    data.to_hex()
}
