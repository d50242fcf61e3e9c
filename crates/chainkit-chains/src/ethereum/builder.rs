//! EVM transactions: EIP-155 legacy (type 0) and EIP-1559 (type 2).
//!
//! The fee parameters pick the envelope. Encoding and signing hashes come
//! from `ethers-core`; the builder only chooses the signature's `v`.

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Eip1559TransactionRequest, Signature, TransactionRequest, U256};

use chainkit_core::{
    AmountType, BuildError, ChainFamily, ChainSpec, ConfigError, FeeParams, SigningPayload,
    TransactionBuilder, TransactionData,
};
use chainkit_wallet::signature::{recover_id, to_compact};

use super::address::EthereumAddressService;

/// `transfer(address,uint256)`
pub const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Nonce and signer key fetched right before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvmSigningState {
    pub nonce: u64,
    /// SEC1 key of the sender, used to recover `v`.
    pub public_key: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthereumBuilder {
    chain_id: u64,
}

fn left_pad_32(bytes: &[u8]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(bytes);
    word
}

/// ABI call data for an ERC-20 `transfer`.
pub fn erc20_transfer_data(to: &[u8; 20], amount: u128) -> Vec<u8> {
    let mut data = ERC20_TRANSFER_SELECTOR.to_vec();
    data.extend_from_slice(&left_pad_32(to));
    data.extend_from_slice(&left_pad_32(&amount.to_be_bytes()));
    data
}

impl EthereumBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn for_chain(chain: &ChainSpec) -> Result<Self, ConfigError> {
        match chain.family {
            ChainFamily::Ethereum { chain_id, .. } => Ok(Self::new(chain_id)),
            _ => Err(ConfigError::NoPlugin(chain.id.to_string())),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The unsigned envelope for `transaction` at `state.nonce`.
    pub fn unsigned(
        &self,
        transaction: &TransactionData,
        state: &EvmSigningState,
    ) -> Result<TypedTransaction, BuildError> {
        let fee = transaction.fee.as_ref().ok_or(BuildError::MissingField("fee"))?;
        let destination = EthereumAddressService::parse(&transaction.destination_address)
            .map_err(|e| BuildError::InvalidIntent(format!("destination: {e}")))?;

        let (to, value, data) = match &transaction.amount.amount_type {
            AmountType::Coin => (destination, transaction.amount.value, Vec::new()),
            AmountType::Token(token) => {
                let contract = EthereumAddressService::parse(&token.contract_address)
                    .map_err(|e| BuildError::InvalidIntent(format!("contract: {e}")))?;
                (contract, 0, erc20_transfer_data(&destination, transaction.amount.value))
            }
            other => return Err(BuildError::InvalidIntent(format!("cannot transfer {other:?}"))),
        };
        let to = Address::from(to);

        match fee.params {
            FeeParams::EvmLegacy { gas_limit, gas_price } => Ok(TransactionRequest::new()
                .to(to)
                .value(value)
                .data(data)
                .nonce(state.nonce)
                .gas(gas_limit)
                .gas_price(gas_price)
                .chain_id(self.chain_id)
                .into()),
            FeeParams::Eip1559 { gas_limit, max_fee_per_gas, priority_fee } => {
                Ok(Eip1559TransactionRequest::new()
                    .to(to)
                    .value(value)
                    .data(data)
                    .nonce(state.nonce)
                    .gas(gas_limit)
                    .max_fee_per_gas(max_fee_per_gas)
                    .max_priority_fee_per_gas(priority_fee)
                    .chain_id(self.chain_id)
                    .into())
            }
            _ => Err(BuildError::MissingField("gas price")),
        }
    }

    /// `v` for a signature with recovery id `recovery` over `unsigned`.
    fn v(&self, unsigned: &TypedTransaction, recovery: u8) -> u64 {
        match unsigned {
            TypedTransaction::Legacy(_) => u64::from(recovery) + 35 + 2 * self.chain_id,
            // typed envelopes carry the bare y parity
            _ => u64::from(recovery),
        }
    }
}

impl TransactionBuilder for EthereumBuilder {
    type State = EvmSigningState;

    fn build_for_sign(
        &self,
        transaction: &TransactionData,
        state: &EvmSigningState,
    ) -> Result<SigningPayload, BuildError> {
        let unsigned = self.unsigned(transaction, state)?;
        Ok(SigningPayload::single(unsigned.sighash().to_fixed_bytes()))
    }

    fn build_for_send(
        &self,
        transaction: &TransactionData,
        state: &EvmSigningState,
        signatures: &[Vec<u8>],
    ) -> Result<Vec<u8>, BuildError> {
        let [signature] = signatures else {
            return Err(BuildError::SignatureCount { expected: 1, actual: signatures.len() });
        };
        let unsigned = self.unsigned(transaction, state)?;
        let hash = unsigned.sighash().to_fixed_bytes();

        let compact = to_compact(signature)?;
        let recovery = recover_id(&hash, &compact, &state.public_key)?;
        let signature = Signature {
            r: U256::from_big_endian(&compact[..32]),
            s: U256::from_big_endian(&compact[32..]),
            v: self.v(&unsigned, recovery),
        };
        Ok(unsigned.rlp_signed(&signature).to_vec())
    }
}
