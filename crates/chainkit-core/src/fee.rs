//! Fee representation shared by every chain.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// Chain-specific parameters a builder needs besides the fee total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeParams {
    /// The total is all there is.
    Common,
    /// Per-kilobyte rate and the size estimate it was applied to.
    Utxo { sat_per_kb: u64, estimated_size: usize },
    EvmLegacy { gas_limit: u64, gas_price: u128 },
    Eip1559 { gas_limit: u64, max_fee_per_gas: u128, priority_fee: u128 },
}

/// One fee option: exactly one [`Amount`] plus builder parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Amount,
    pub params: FeeParams,
}

impl Fee {
    pub fn common(amount: Amount) -> Self {
        Self { amount, params: FeeParams::Common }
    }

    pub fn new(amount: Amount, params: FeeParams) -> Self {
        Self { amount, params }
    }
}

/// Tier selector for [`TransactionFee::Choosable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeTier {
    Minimum,
    Normal,
    Priority,
}

/// Fee suggestion returned by estimation. The `normal` option is the default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionFee {
    Single(Fee),
    Choosable { minimum: Fee, normal: Fee, priority: Fee },
}

impl TransactionFee {
    /// The default option.
    pub fn normal(&self) -> &Fee {
        match self {
            Self::Single(normal) | Self::Choosable { normal, .. } => normal,
        }
    }

    /// The option for `tier`; a single fee answers every tier.
    pub fn tier(&self, tier: FeeTier) -> &Fee {
        match (self, tier) {
            (Self::Single(fee), _) => fee,
            (Self::Choosable { minimum, .. }, FeeTier::Minimum) => minimum,
            (Self::Choosable { normal, .. }, FeeTier::Normal) => normal,
            (Self::Choosable { priority, .. }, FeeTier::Priority) => priority,
        }
    }

    pub fn is_choosable(&self) -> bool {
        matches!(self, Self::Choosable { .. })
    }

    pub fn into_normal(self) -> Fee {
        match self {
            Self::Single(normal) | Self::Choosable { normal, .. } => normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::AmountType;

    fn fee(value: u128) -> Fee {
        Fee::common(Amount {
            value,
            max_value: None,
            decimals: 8,
            symbol: "BTC".into(),
            amount_type: AmountType::Coin,
        })
    }

    #[test]
    fn single_answers_every_tier() {
        let single = TransactionFee::Single(fee(10));
        assert_eq!(single.normal().amount.value, 10);
        assert_eq!(single.tier(FeeTier::Priority).amount.value, 10);
        assert!(!single.is_choosable());
    }

    #[test]
    fn choosable_defaults_to_normal() {
        let tiers = TransactionFee::Choosable { minimum: fee(1), normal: fee(2), priority: fee(3) };
        assert_eq!(tiers.normal().amount.value, 2);
        assert_eq!(tiers.tier(FeeTier::Minimum).amount.value, 1);
        assert_eq!(tiers.tier(FeeTier::Priority).amount.value, 3);
        assert_eq!(tiers.into_normal().amount.value, 2);
    }
}
