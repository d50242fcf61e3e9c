//! Unsigned Bitcoin transactions, their signature hashes and final assembly.
//!
//! P2WPKH inputs are hashed per BIP-143, everything else with the legacy
//! algorithm. Only `SIGHASH_ALL` is produced.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::{OutPoint, Sequence, Transaction, TxIn, TxOut, Version};
use bitcoin::{Amount, ScriptBuf, Witness};

use chainkit_core::BuildError;

/// The output an input spends: what its signature hash commits to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpentOutput {
    pub script_pubkey: ScriptBuf,
    pub value: Amount,
}

/// A transaction with empty scripts and witnesses, plus the outputs it spends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTx {
    pub tx: Transaction,
    pub spent: Vec<SpentOutput>,
}

fn encoding(err: impl std::fmt::Display) -> BuildError {
    BuildError::Encoding(err.to_string())
}

impl UnsignedTx {
    /// Version 2, no lock time, opt-in replace-by-fee on every input.
    pub fn new(inputs: Vec<(OutPoint, SpentOutput)>, outputs: Vec<TxOut>) -> Self {
        let (outpoints, spent): (Vec<_>, Vec<_>) = inputs.into_iter().unzip();
        let input = outpoints
            .into_iter()
            .map(|previous_output| TxIn {
                previous_output,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect();
        Self {
            tx: Transaction { version: Version::TWO, lock_time: LockTime::ZERO, input, output: outputs },
            spent,
        }
    }

    /// `SIGHASH_ALL` digest of input `index`.
    pub fn sighash(&self, index: usize) -> Result<[u8; 32], BuildError> {
        let spent = self.spent.get(index).ok_or_else(|| encoding(format!("no input {index}")))?;
        let mut cache = SighashCache::new(&self.tx);
        if spent.script_pubkey.is_p2wpkh() {
            let hash = cache
                .p2wpkh_signature_hash(index, &spent.script_pubkey, spent.value, EcdsaSighashType::All)
                .map_err(encoding)?;
            Ok(hash.to_byte_array())
        } else {
            let hash = cache
                .legacy_signature_hash(index, &spent.script_pubkey, EcdsaSighashType::All.to_u32())
                .map_err(encoding)?;
            Ok(hash.to_byte_array())
        }
    }

    pub fn sighashes(&self) -> Result<Vec<[u8; 32]>, BuildError> {
        (0..self.tx.input.len()).map(|index| self.sighash(index)).collect()
    }

    /// Attach one DER signature (hash type appended) per input and serialize.
    pub fn finalize(mut self, signatures: Vec<Vec<u8>>, public_key: &[u8; 33]) -> Result<Vec<u8>, BuildError> {
        for ((input, spent), signature) in self.tx.input.iter_mut().zip(&self.spent).zip(signatures) {
            if spent.script_pubkey.is_p2wpkh() {
                let mut witness = Witness::new();
                witness.push(signature);
                witness.push(public_key);
                input.witness = witness;
            } else {
                let signature = PushBytesBuf::try_from(signature).map_err(encoding)?;
                let key = PushBytesBuf::try_from(public_key.to_vec()).map_err(encoding)?;
                input.script_sig = Builder::new().push_slice(signature).push_slice(key).into_script();
            }
        }
        Ok(serialize(&self.tx))
    }
}

/// The hash type byte appended to every DER signature.
pub fn sighash_all_byte() -> u8 {
    EcdsaSighashType::All.to_u32() as u8
}
