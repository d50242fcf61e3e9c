//! Balances and transfer amounts.
//!
//! All values are unsigned integers in the asset's minimal unit (satoshi, wei,
//! planck), so a negative balance cannot be represented. Decimal strings are
//! converted at the edges with [`parse_units`] and [`format_units`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::ChainSpec;
use crate::error::AmountError;

/// A fungible token tracked alongside the native coin.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub symbol: String,
    pub contract_address: String,
    pub decimals: u8,
}

/// Which balance of an account an [`Amount`] refers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountType {
    /// The chain's native coin.
    Coin,
    Token(Token),
    /// A secondary resource consumed by fees (e.g. mana), identified by name.
    FeeResource(String),
    /// Balance locked by the protocol and not spendable.
    Reserve,
}

/// A value with the metadata needed to display it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub value: u128,
    /// Upper bound for regenerating resources (e.g. maximum mana).
    pub max_value: Option<u128>,
    pub decimals: u8,
    pub symbol: String,
    pub amount_type: AmountType,
}

impl Amount {
    /// Native coin amount for `chain`.
    pub fn coin(value: u128, chain: &ChainSpec) -> Self {
        Self {
            value,
            max_value: None,
            decimals: chain.decimals,
            symbol: chain.symbol.clone(),
            amount_type: AmountType::Coin,
        }
    }

    pub fn token(value: u128, token: &Token) -> Self {
        Self {
            value,
            max_value: None,
            decimals: token.decimals,
            symbol: token.symbol.clone(),
            amount_type: AmountType::Token(token.clone()),
        }
    }

    /// Fee-resource amount, if `chain` declares one.
    pub fn fee_resource(value: u128, max_value: Option<u128>, chain: &ChainSpec) -> Option<Self> {
        let resource = chain.fee_resource.as_ref()?;
        Some(Self {
            value,
            max_value,
            decimals: resource.decimals,
            symbol: resource.name.clone(),
            amount_type: AmountType::FeeResource(resource.name.clone()),
        })
    }

    /// Same asset, different value.
    pub fn with_value(&self, value: u128) -> Self {
        Self { value, max_value: self.max_value, ..self.clone() }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Whether two amounts are denominated in the same asset.
    pub fn same_asset(&self, other: &Amount) -> bool {
        self.amount_type == other.amount_type && self.symbol == other.symbol
    }

    /// The value rendered as a decimal string, e.g. `"0.013"`.
    pub fn to_decimal_string(&self) -> String {
        format_units(self.value, self.decimals)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.symbol)
    }
}

/// Parse a decimal string such as `"1.25"` into minimal units.
///
/// Negative input is rejected rather than wrapped.
pub fn parse_units(input: &str, decimals: u8) -> Result<u128, AmountError> {
    let s = input.trim();
    if s.starts_with('-') {
        return Err(AmountError::Negative(s.to_string()));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(AmountError::Malformed(input.to_string()));
    }
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(AmountError::Malformed(input.to_string()));
    }
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() > decimals as usize {
        return Err(AmountError::TooPrecise { value: input.to_string(), decimals });
    }

    let scale = 10u128
        .checked_pow(decimals as u32)
        .ok_or(AmountError::Overflow)?;
    let whole: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| AmountError::Overflow)?
    };
    let mut frac: u128 = 0;
    for b in frac_trimmed.bytes() {
        frac = frac * 10 + u128::from(b - b'0');
    }
    let frac_scale = 10u128.pow(decimals as u32 - frac_trimmed.len() as u32);

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac * frac_scale))
        .ok_or(AmountError::Overflow)
}

/// Render minimal units as a decimal string without trailing zeros.
pub fn format_units(value: u128, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = 10u128.pow(decimals as u32);
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
