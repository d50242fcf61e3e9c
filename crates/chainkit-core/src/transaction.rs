//! Transfer intents and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, AmountType};
use crate::fee::Fee;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unconfirmed,
    Confirmed,
    Failed,
}

/// Chain-specific payload carried opaquely by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionExtras {
    /// Explicit nonce override for replacement transactions.
    Nonce(u64),
}

/// A transfer intent, later stamped with the ledger hash once broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    pub amount: Amount,
    pub fee: Option<Fee>,
    pub source_address: String,
    pub destination_address: String,
    pub extras: Option<TransactionExtras>,
    pub hash: Option<String>,
    pub status: TransactionStatus,
    pub date: Option<DateTime<Utc>>,
    /// Nonce or sequence the signed transaction was bound to.
    pub sequence: Option<u64>,
}

impl TransactionData {
    pub fn new(
        amount: Amount,
        fee: Option<Fee>,
        source_address: impl Into<String>,
        destination_address: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            fee,
            source_address: source_address.into(),
            destination_address: destination_address.into(),
            extras: None,
            hash: None,
            status: TransactionStatus::Unconfirmed,
            date: None,
            sequence: None,
        }
    }

    pub fn with_extras(mut self, extras: TransactionExtras) -> Self {
        self.extras = Some(extras);
        self
    }

    /// A record with a hash has been broadcast and must not be sent again.
    pub fn is_submitted(&self) -> bool {
        self.hash.is_some()
    }

    pub fn fee_amount(&self) -> Option<&Amount> {
        self.fee.as_ref().map(|f| &f.amount)
    }

    /// Token contract for token transfers.
    pub fn contract_address(&self) -> Option<&str> {
        match &self.amount.amount_type {
            AmountType::Token(token) => Some(&token.contract_address),
            _ => None,
        }
    }

    /// Case-insensitive hash comparison.
    pub fn has_hash(&self, hash: &str) -> bool {
        self.hash.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(hash))
    }
}

/// Outcome of a successful broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSendResult {
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Token;

    fn coin(value: u128) -> Amount {
        Amount {
            value,
            max_value: None,
            decimals: 18,
            symbol: "ETH".into(),
            amount_type: AmountType::Coin,
        }
    }

    #[test]
    fn new_is_unsubmitted() {
        let tx = TransactionData::new(coin(1), None, "a", "b");
        assert!(!tx.is_submitted());
        assert_eq!(tx.status, TransactionStatus::Unconfirmed);
        assert!(tx.fee_amount().is_none());
    }

    #[test]
    fn hash_comparison_ignores_case() {
        let mut tx = TransactionData::new(coin(1), None, "a", "b");
        tx.hash = Some("0xabcdef".into());
        assert!(tx.has_hash("0xABCDEF"));
        assert!(!tx.has_hash("0xabcde0"));
    }

    #[test]
    fn contract_address_for_tokens_only() {
        let token = Token {
            name: "Tether".into(),
            symbol: "USDT".into(),
            contract_address: "0xdac17f958d2ee523a2206206994597c13d831ec7".into(),
            decimals: 6,
        };
        let tx = TransactionData::new(Amount::token(5, &token), None, "a", "b");
        assert_eq!(tx.contract_address(), Some("0xdac17f958d2ee523a2206206994597c13d831ec7"));
        assert_eq!(TransactionData::new(coin(1), None, "a", "b").contract_address(), None);
    }
}
