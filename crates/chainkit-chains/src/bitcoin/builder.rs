//! Two-phase Bitcoin transaction assembly.
//!
//! Coin selection runs inside the builder against the UTXO set fetched right
//! before signing, so both phases derive the same unsigned transaction from
//! the same state.

use bitcoin::transaction::{OutPoint, TxOut};
use bitcoin::{ScriptBuf, Txid};

use chainkit_core::crypto::hash160;
use chainkit_core::{
    Amount, AmountType, BuildError, ChainSpec, ConfigError, Fee, FeeParams, SigningPayload,
    TransactionBuilder, TransactionData, TransactionFee,
};
use chainkit_wallet::signature::{to_compact, to_der, verify_ecdsa};
use chainkit_wallet::{select_utxos, UnspentOutput};

use super::address::{is_p2wpkh, BitcoinAddressService};
use super::transaction::{sighash_all_byte, SpentOutput, UnsignedTx};

/// Fallback relay floor in satoshi per kB.
pub const MIN_RELAY_FEE_PER_KB: u64 = 1_000;

/// Smallest output, in satoshi, relayed by default policy when the chain sets none.
pub const DEFAULT_DUST_LIMIT: u64 = 546;

const TX_OVERHEAD_VBYTES: usize = 11;
const P2PKH_INPUT_VBYTES: usize = 148;
const P2WPKH_INPUT_VBYTES: usize = 68;
const OUTPUT_VBYTES: usize = 34;

/// Build state fetched right before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitcoinSigningState {
    /// Spendable outputs of every wallet address.
    pub utxos: Vec<UnspentOutput>,
    /// Compressed key owning `utxos`.
    pub public_key: [u8; 33],
    pub change_address: String,
}

#[derive(Clone, Debug)]
pub struct BitcoinBuilder {
    addresses: BitcoinAddressService,
    dust: u64,
}

fn to_sat(value: u128) -> Result<bitcoin::Amount, BuildError> {
    u64::try_from(value)
        .map(bitcoin::Amount::from_sat)
        .map_err(|_| BuildError::InvalidIntent(format!("{value} exceeds the satoshi range")))
}

impl BitcoinBuilder {
    pub fn new(addresses: BitcoinAddressService, dust: u64) -> Self {
        Self { addresses, dust }
    }

    pub fn for_chain(chain: &ChainSpec) -> Result<Self, ConfigError> {
        let dust = chain.dust.map_or(Ok(DEFAULT_DUST_LIMIT), u64::try_from);
        let dust = dust.map_err(|_| ConfigError::Invalid(format!("dust of {} out of range", chain.id)))?;
        Ok(Self::new(BitcoinAddressService::for_chain(chain)?, dust))
    }

    pub fn dust(&self) -> u64 {
        self.dust
    }

    fn script_to(&self, address: &str, role: &str) -> Result<ScriptBuf, BuildError> {
        self.addresses
            .script_pubkey(address)
            .map(ScriptBuf::from_bytes)
            .map_err(|e| BuildError::InvalidIntent(format!("{role}: {e}")))
    }

    /// Select inputs and lay out outputs for `transaction`.
    pub fn prepare(
        &self,
        transaction: &TransactionData,
        state: &BitcoinSigningState,
    ) -> Result<UnsignedTx, BuildError> {
        if transaction.amount.amount_type != AmountType::Coin {
            return Err(BuildError::InvalidIntent("only coin transfers are supported".into()));
        }
        let fee = to_sat(transaction.fee_amount().ok_or(BuildError::MissingField("fee"))?.value)?;
        if state.utxos.is_empty() {
            return Err(BuildError::MissingField("utxos"));
        }
        let spend = to_sat(transaction.amount.value)?;

        let selection = select_utxos(&state.utxos, spend.to_sat(), fee.to_sat(), Some(self.dust))
            .map_err(|e| BuildError::InvalidIntent(e.to_string()))?;
        if selection.insufficient {
            return Err(BuildError::InvalidIntent(format!(
                "outputs cover {} of {}",
                selection.total, selection.target
            )));
        }

        let mut outputs = vec![TxOut {
            value: spend,
            script_pubkey: self.script_to(&transaction.destination_address, "destination")?,
        }];

        let change = to_sat(selection.change())?;
        // change below dust is left to the miner
        if change.to_sat() >= self.dust {
            let script_pubkey = self.script_to(&state.change_address, "change address")?;
            outputs.push(TxOut { value: change, script_pubkey });
        }

        let key_hash = hash160(&state.public_key);
        let inputs = selection
            .selected
            .iter()
            .map(|utxo| {
                let script_pubkey = ScriptBuf::from_bytes(utxo.script_pubkey.clone());
                let bytes = script_pubkey.as_bytes();
                let owned = (script_pubkey.is_p2wpkh() && bytes[2..] == key_hash)
                    || (script_pubkey.is_p2pkh() && bytes[3..23] == key_hash);
                if !owned {
                    return Err(BuildError::InvalidIntent(format!(
                        "output {}:{} is not spendable by this key",
                        utxo.txid, utxo.vout
                    )));
                }
                let txid = utxo
                    .txid
                    .parse::<Txid>()
                    .map_err(|e| BuildError::Encoding(format!("bad txid {}: {e}", utxo.txid)))?;
                Ok((
                    OutPoint { txid, vout: utxo.vout },
                    SpentOutput { script_pubkey, value: bitcoin::Amount::from_sat(utxo.amount) },
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UnsignedTx::new(inputs, outputs))
    }
}

impl TransactionBuilder for BitcoinBuilder {
    type State = BitcoinSigningState;

    fn build_for_sign(
        &self,
        transaction: &TransactionData,
        state: &BitcoinSigningState,
    ) -> Result<SigningPayload, BuildError> {
        let unsigned = self.prepare(transaction, state)?;
        let hashes = unsigned.sighashes()?.into_iter().map(|h| h.to_vec()).collect();
        Ok(SigningPayload { hashes })
    }

    fn build_for_send(
        &self,
        transaction: &TransactionData,
        state: &BitcoinSigningState,
        signatures: &[Vec<u8>],
    ) -> Result<Vec<u8>, BuildError> {
        let unsigned = self.prepare(transaction, state)?;
        if signatures.len() != unsigned.tx.input.len() {
            return Err(BuildError::SignatureCount {
                expected: unsigned.tx.input.len(),
                actual: signatures.len(),
            });
        }

        let hashes = unsigned.sighashes()?;
        let mut encoded = Vec::with_capacity(signatures.len());
        for (hash, signature) in hashes.iter().zip(signatures) {
            let canonical = to_compact(signature)?;
            if !verify_ecdsa(hash, &canonical, &state.public_key) {
                return Err(BuildError::InvalidSignature("signature does not match input hash".into()));
            }
            let mut der = to_der(&canonical)?;
            der.push(sighash_all_byte());
            encoded.push(der);
        }
        unsigned.finalize(encoded, &state.public_key)
    }
}

/// Virtual size estimate for spending `inputs` into `outputs` outputs.
pub fn estimate_vsize<'a>(inputs: impl IntoIterator<Item = &'a [u8]>, outputs: usize) -> usize {
    let inputs: usize = inputs
        .into_iter()
        .map(|script| if is_p2wpkh(script) { P2WPKH_INPUT_VBYTES } else { P2PKH_INPUT_VBYTES })
        .sum();
    TX_OVERHEAD_VBYTES + inputs + outputs * OUTPUT_VBYTES
}

/// Per-kB rates for the three fee tiers, in satoshi.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeRates {
    pub minimum: u64,
    pub normal: u64,
    pub priority: u64,
}

/// Tiered fees for a transaction of `size` vbytes, each rate floored at `min_per_kb`.
pub fn fee_tiers(rates: FeeRates, size: usize, min_per_kb: u64, chain: &ChainSpec) -> TransactionFee {
    let fee = |rate: u64| {
        let rate = rate.max(min_per_kb);
        let total = u128::from(rate) * size as u128 / 1_000;
        Fee::new(
            Amount::coin(total, chain),
            FeeParams::Utxo { sat_per_kb: rate, estimated_size: size },
        )
    };
    TransactionFee::Choosable {
        minimum: fee(rates.minimum),
        normal: fee(rates.normal),
        priority: fee(rates.priority),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::address::p2pkh_script;
    use chainkit_core::{AddressService, ChainRegistry, Curve, PublicKey, TransactionSigner};
    use chainkit_wallet::KeySigner;
    use std::sync::Arc;

    fn chain() -> Arc<ChainSpec> {
        ChainRegistry::builtin().get("bitcoin").unwrap()
    }

    fn signer() -> KeySigner {
        KeySigner::secp256k1([0x21; 32]).unwrap()
    }

    fn state(signer: &KeySigner, amounts: &[u64], legacy: bool) -> BitcoinSigningState {
        let public_key: [u8; 33] = signer.public_key().try_into().unwrap();
        let hash = hash160(&public_key);
        let script = if legacy {
            p2pkh_script(&hash)
        } else {
            let mut s = vec![0x00, 0x14];
            s.extend_from_slice(&hash);
            s
        };
        let service = BitcoinAddressService::for_chain(&chain()).unwrap();
        BitcoinSigningState {
            utxos: amounts
                .iter()
                .enumerate()
                .map(|(i, &amount)| UnspentOutput {
                    txid: format!("{:064x}", i + 1),
                    vout: i as u32,
                    amount,
                    script_pubkey: script.clone(),
                })
                .collect(),
            public_key,
            change_address: service.make_address(&public_key, Curve::Secp256k1).unwrap(),
        }
    }

    fn transfer(amount: u128, fee: Option<u128>) -> TransactionData {
        let chain = chain();
        TransactionData::new(
            Amount::coin(amount, &chain),
            fee.map(|f| Fee::common(Amount::coin(f, &chain))),
            "bc1qsource",
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH",
        )
    }

    fn builder() -> BitcoinBuilder {
        BitcoinBuilder::for_chain(&chain()).unwrap()
    }

    async fn sign_all(signer: &KeySigner, payload: &SigningPayload) -> Vec<Vec<u8>> {
        let pk = PublicKey::new(signer.public_key().to_vec());
        signer.sign_batch(&payload.hashes, &pk).await.unwrap()
    }

    #[test]
    fn missing_fee_and_utxos_are_typed() {
        let s = signer();
        assert_eq!(
            builder().build_for_sign(&transfer(1_000, None), &state(&s, &[5_000], false)).unwrap_err(),
            BuildError::MissingField("fee")
        );
        assert_eq!(
            builder().build_for_sign(&transfer(1_000, Some(100)), &state(&s, &[], false)).unwrap_err(),
            BuildError::MissingField("utxos")
        );
    }

    #[test]
    fn insufficient_utxos_are_rejected() {
        let s = signer();
        let err = builder()
            .build_for_sign(&transfer(10_000, Some(500)), &state(&s, &[3_000, 4_000], false))
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidIntent(_)));
    }

    #[test]
    fn change_output_goes_back_to_wallet() {
        let s = signer();
        let st = state(&s, &[10_000_000, 3_000_000], false);
        let unsigned = builder().prepare(&transfer(1_000_000, Some(300_000)), &st).unwrap();

        assert_eq!(unsigned.tx.input.len(), 1);
        assert_eq!(unsigned.spent[0].value.to_sat(), 3_000_000);
        assert_eq!(unsigned.tx.output.len(), 2);
        assert_eq!(unsigned.tx.output[0].value.to_sat(), 1_000_000);
        assert_eq!(unsigned.tx.output[1].value.to_sat(), 1_700_000);
        assert_eq!(unsigned.tx.output[1].script_pubkey.as_bytes(), st.utxos[0].script_pubkey.as_slice());
    }

    #[test]
    fn dust_change_is_dropped() {
        let s = signer();
        let st = state(&s, &[10_500], false);
        let unsigned = builder().prepare(&transfer(10_000, Some(100)), &st).unwrap();
        assert_eq!(unsigned.tx.output.len(), 1);
    }

    #[test]
    fn dust_limit_defaults_to_relay_policy() {
        let mut spec = (*chain()).clone();
        spec.dust = None;
        let b = BitcoinBuilder::for_chain(&spec).unwrap();
        assert_eq!(b.dust(), DEFAULT_DUST_LIMIT);
        assert_ne!(b.dust(), MIN_RELAY_FEE_PER_KB);

        // 600 sat of change clears the 546 sat limit
        let s = signer();
        let unsigned = b.prepare(&transfer(10_000, Some(400)), &state(&s, &[11_000], false)).unwrap();
        assert_eq!(unsigned.tx.output.len(), 2);
        assert_eq!(unsigned.tx.output[1].value.to_sat(), 600);
    }

    #[test]
    fn foreign_outputs_are_refused() {
        let s = signer();
        let mut st = state(&s, &[50_000], false);
        st.utxos[0].script_pubkey = hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        assert!(matches!(
            builder().prepare(&transfer(10_000, Some(100)), &st).unwrap_err(),
            BuildError::InvalidIntent(_)
        ));
    }

    #[test]
    fn one_hash_per_input_in_order() {
        let s = signer();
        let st = state(&s, &[4_000, 4_000, 4_000], false);
        let payload = builder().build_for_sign(&transfer(10_000, Some(500)), &st).unwrap();
        assert_eq!(payload.len(), 3);
        assert!(payload.hashes.iter().all(|h| h.len() == 32));
        // BIP-143 commits to the outpoint being signed
        assert_ne!(payload.hashes[0], payload.hashes[1]);
    }

    #[tokio::test]
    async fn signed_segwit_transaction() {
        let s = signer();
        let st = state(&s, &[60_000, 20_000], false);
        let tx = transfer(50_000, Some(1_000));
        let b = builder();

        let payload = b.build_for_sign(&tx, &st).unwrap();
        let signatures = sign_all(&s, &payload).await;
        let raw = b.build_for_send(&tx, &st, &signatures).unwrap();

        assert_eq!(raw[..4], 2u32.to_le_bytes());
        assert_eq!(raw[4..6], [0x00, 0x01]);
        // deterministic for the same state and signatures
        assert_eq!(raw, b.build_for_send(&tx, &st, &signatures).unwrap());
    }

    #[tokio::test]
    async fn signed_legacy_transaction_has_no_witness() {
        let s = signer();
        let st = state(&s, &[60_000], true);
        let tx = transfer(50_000, Some(1_000));
        let b = builder();

        let payload = b.build_for_sign(&tx, &st).unwrap();
        let signatures = sign_all(&s, &payload).await;
        let raw = b.build_for_send(&tx, &st, &signatures).unwrap();
        assert_ne!(raw[4..6], [0x00, 0x01]);
        // version, one input, outpoint, scriptSig = <der+hashtype> <33-byte key>
        assert_eq!(raw[4], 1);
        assert_eq!(raw[41], raw[42] + 35);
        assert_eq!(raw[43], 0x30);
    }

    #[tokio::test]
    async fn wrong_signature_count_and_content() {
        let s = signer();
        let st = state(&s, &[4_000, 4_000], false);
        let tx = transfer(6_000, Some(500));
        let b = builder();
        let payload = b.build_for_sign(&tx, &st).unwrap();
        let mut signatures = sign_all(&s, &payload).await;

        assert_eq!(
            b.build_for_send(&tx, &st, &signatures[..1]).unwrap_err(),
            BuildError::SignatureCount { expected: 2, actual: 1 }
        );
        signatures.swap(0, 1);
        assert!(matches!(
            b.build_for_send(&tx, &st, &signatures).unwrap_err(),
            BuildError::InvalidSignature(_)
        ));
    }

    #[test]
    fn size_estimate_and_tiers() {
        let segwit = hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        let legacy = hex::decode("76a914751e76e8199196d454941c45d1b3a323f1433bd688ac").unwrap();
        let size = estimate_vsize([segwit.as_slice(), legacy.as_slice()], 2);
        assert_eq!(size, 11 + 68 + 148 + 68);

        let rates = FeeRates { minimum: 500, normal: 20_000, priority: 45_000 };
        let fee = fee_tiers(rates, 250, MIN_RELAY_FEE_PER_KB, &chain());
        assert_eq!(fee.tier(chainkit_core::FeeTier::Minimum).amount.value, 250);
        assert_eq!(fee.normal().amount.value, 5_000);
        assert_eq!(fee.tier(chainkit_core::FeeTier::Priority).amount.value, 11_250);
        assert_eq!(
            fee.normal().params,
            FeeParams::Utxo { sat_per_kb: 20_000, estimated_size: 250 }
        );
    }
}
