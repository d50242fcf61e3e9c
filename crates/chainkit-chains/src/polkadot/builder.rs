//! Signed `Balances::transfer_keep_alive` extrinsics (format version 4).

use chainkit_core::crypto::blake2b_256;
use chainkit_core::{
    AmountType, BuildError, ChainFamily, ChainSpec, ConfigError, SigningPayload, TransactionBuilder,
    TransactionData,
};
use chainkit_wallet::signature::ed25519_passthrough;

use super::address::Ss58AddressService;
use super::scale::{mortal_era, write_compact};

/// Signed bit plus extrinsic format version 4.
const SIGNED_V4: u8 = 0x84;
const MULTI_ADDRESS_ID: u8 = 0x00;
const MULTI_SIGNATURE_ED25519: u8 = 0x00;
const IMMORTAL_ERA: u8 = 0x00;
/// Payloads longer than this are signed by their Blake2b-256 hash.
const MAX_UNHASHED_PAYLOAD: usize = 256;

/// Validity window of mortal transactions, in blocks.
pub const ERA_PERIOD: u64 = 64;

/// First runtime of the relay chains that carries the `CheckMetadataHash` extension.
pub const METADATA_HASH_SPEC_VERSION: u32 = 1_002_005;

fn signable(payload: Vec<u8>) -> Vec<u8> {
    if payload.len() > MAX_UNHASHED_PAYLOAD {
        blake2b_256(&payload).to_vec()
    } else {
        payload
    }
}

/// Runtime and account data fetched right before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubstrateSigningState {
    pub nonce: u64,
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: [u8; 32],
    /// Hash of `block_number`, the checkpoint of the mortal era.
    pub block_hash: [u8; 32],
    pub block_number: u64,
    /// Signer account id.
    pub public_key: [u8; 32],
}

#[derive(Clone, Debug)]
pub struct PolkadotBuilder {
    addresses: Ss58AddressService,
    /// `[pallet, call]` of `Balances::transfer_keep_alive`.
    call_index: [u8; 2],
    metadata_hash_from: Option<u32>,
    mortal: bool,
    tip: u128,
}

impl PolkadotBuilder {
    pub fn new(addresses: Ss58AddressService, call_index: [u8; 2]) -> Self {
        Self { addresses, call_index, metadata_hash_from: None, mortal: true, tip: 0 }
    }

    /// Builder for a built-in relay chain or one of its test networks.
    pub fn for_chain(chain: &ChainSpec) -> Result<Self, ConfigError> {
        let ChainFamily::Polkadot { .. } = chain.family else {
            return Err(ConfigError::NoPlugin(chain.id.to_string()));
        };
        // Balances is pallet 5 on Polkadot and 4 on Kusama and Westend
        let pallet = if chain.id.as_str() == "polkadot" { 5 } else { 4 };
        Ok(Self::new(Ss58AddressService::for_chain(chain)?, [pallet, 3])
            .with_metadata_hash_from(METADATA_HASH_SPEC_VERSION))
    }

    /// Emit the `CheckMetadataHash` extension (disabled mode) from `spec_version` on.
    pub fn with_metadata_hash_from(mut self, spec_version: u32) -> Self {
        self.metadata_hash_from = Some(spec_version);
        self
    }

    pub fn immortal(mut self) -> Self {
        self.mortal = false;
        self
    }

    pub fn with_tip(mut self, tip: u128) -> Self {
        self.tip = tip;
        self
    }

    fn uses_metadata_hash(&self, state: &SubstrateSigningState) -> bool {
        self.metadata_hash_from.is_some_and(|from| state.spec_version >= from)
    }

    fn call(&self, transaction: &TransactionData) -> Result<Vec<u8>, BuildError> {
        if transaction.amount.amount_type != AmountType::Coin {
            return Err(BuildError::InvalidIntent("only coin transfers are supported".into()));
        }
        let destination = self
            .addresses
            .decode(&transaction.destination_address)
            .map_err(|e| BuildError::InvalidIntent(format!("destination: {e}")))?;

        let mut call = self.call_index.to_vec();
        call.push(MULTI_ADDRESS_ID);
        call.extend_from_slice(&destination);
        write_compact(&mut call, transaction.amount.value);
        Ok(call)
    }

    /// Signed extensions carried inside the extrinsic.
    fn extra(&self, state: &SubstrateSigningState) -> Vec<u8> {
        let mut extra = Vec::new();
        if self.mortal {
            extra.extend_from_slice(&mortal_era(state.block_number, ERA_PERIOD));
        } else {
            extra.push(IMMORTAL_ERA);
        }
        write_compact(&mut extra, u128::from(state.nonce));
        write_compact(&mut extra, self.tip);
        if self.uses_metadata_hash(state) {
            extra.push(0x00);
        }
        extra
    }

    /// Signed extensions only committed to by the signature.
    fn additional(&self, state: &SubstrateSigningState) -> Vec<u8> {
        let mut additional = Vec::with_capacity(4 + 4 + 32 + 32 + 1);
        additional.extend_from_slice(&state.spec_version.to_le_bytes());
        additional.extend_from_slice(&state.transaction_version.to_le_bytes());
        additional.extend_from_slice(&state.genesis_hash);
        additional.extend_from_slice(if self.mortal { &state.block_hash } else { &state.genesis_hash });
        if self.uses_metadata_hash(state) {
            // Option<[u8; 32]>::None
            additional.push(0x00);
        }
        additional
    }

    /// Bytes the signer commits to.
    pub fn signing_payload(
        &self,
        transaction: &TransactionData,
        state: &SubstrateSigningState,
    ) -> Result<Vec<u8>, BuildError> {
        let mut payload = self.call(transaction)?;
        payload.extend(self.extra(state));
        payload.extend(self.additional(state));
        Ok(signable(payload))
    }

    /// Assemble the length-prefixed extrinsic around a 64-byte signature.
    pub fn assemble(
        &self,
        transaction: &TransactionData,
        state: &SubstrateSigningState,
        signature: &[u8; 64],
    ) -> Result<Vec<u8>, BuildError> {
        let mut body = vec![SIGNED_V4, MULTI_ADDRESS_ID];
        body.extend_from_slice(&state.public_key);
        body.push(MULTI_SIGNATURE_ED25519);
        body.extend_from_slice(signature);
        body.extend(self.extra(state));
        body.extend(self.call(transaction)?);

        let mut extrinsic = Vec::with_capacity(body.len() + 4);
        write_compact(&mut extrinsic, body.len() as u128);
        extrinsic.extend(body);
        Ok(extrinsic)
    }
}

impl TransactionBuilder for PolkadotBuilder {
    type State = SubstrateSigningState;

    fn build_for_sign(
        &self,
        transaction: &TransactionData,
        state: &SubstrateSigningState,
    ) -> Result<SigningPayload, BuildError> {
        Ok(SigningPayload::single(self.signing_payload(transaction, state)?))
    }

    fn build_for_send(
        &self,
        transaction: &TransactionData,
        state: &SubstrateSigningState,
        signatures: &[Vec<u8>],
    ) -> Result<Vec<u8>, BuildError> {
        let [signature] = signatures else {
            return Err(BuildError::SignatureCount { expected: 1, actual: signatures.len() });
        };
        self.assemble(transaction, state, &ed25519_passthrough(signature)?)
    }
}
