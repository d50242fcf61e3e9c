//! Transfer precondition checks against the wallet's known balances.
//!
//! [`validate_transfer`] reports every violated rule so a host can show them
//! all at once; [`check_transfer`] stops at the first one and converts it into
//! a [`ChainError`] for the send path.

use thiserror::Error;

use chainkit_core::{AccountError, Amount, AmountType, BuildError, ChainError, Wallet};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionValidationError {
    #[error("amount must be positive")]
    AmountNotPositive,
    #[error("amount {amount} exceeds balance {balance}")]
    AmountExceedsBalance { amount: u128, balance: u128 },
    #[error("fee {fee} exceeds balance {balance}")]
    FeeExceedsBalance { fee: u128, balance: u128 },
    #[error("amount plus fee {total} exceeds balance {balance}")]
    TotalExceedsBalance { total: u128, balance: u128 },
    #[error("amount is below the dust limit {minimum}")]
    DustAmount { minimum: u128 },
    #[error("change is below the dust limit {minimum}")]
    DustChange { minimum: u128 },
    #[error("remaining balance below existential deposit {minimum}")]
    BelowExistentialDeposit { minimum: u128 },
    #[error("insufficient {resource}: available {available}, required {required}, max {max}")]
    InsufficientFeeResource { resource: String, available: u128, required: u128, max: u128 },
    #[error("amount exceeds {resource} left after fee: available {available}")]
    FeeResourceExceedsBalance { resource: String, available: u128 },
}

impl From<TransactionValidationError> for ChainError {
    fn from(err: TransactionValidationError) -> Self {
        use TransactionValidationError as E;
        match err {
            E::AmountNotPositive | E::DustAmount { .. } | E::DustChange { .. } => {
                BuildError::InvalidIntent(err.to_string()).into()
            }
            E::AmountExceedsBalance { amount: required, balance: available }
            | E::FeeExceedsBalance { fee: required, balance: available }
            | E::TotalExceedsBalance { total: required, balance: available } => {
                AccountError::InsufficientBalance { available, required }.into()
            }
            E::BelowExistentialDeposit { minimum } => {
                AccountError::BelowExistentialDeposit { minimum }.into()
            }
            E::InsufficientFeeResource { resource, available, required, max } => {
                AccountError::InsufficientFeeResource { resource, available, required, max }.into()
            }
            E::FeeResourceExceedsBalance { resource, available } => {
                AccountError::FeeResourceExceedsBalance { resource, available }.into()
            }
        }
    }
}

/// Every rule `amount` plus `fee` breaks given the wallet's balances.
///
/// On chains that declare a fee resource the fee is checked against both the
/// coin balance and the resource, and the amount must fit in the resource
/// left after the fee. Elsewhere the fee is paid from the coin balance and
/// dust and existential-deposit rules apply to coin transfers.
pub fn validate_transfer(
    wallet: &Wallet,
    amount: &Amount,
    fee: Option<&Amount>,
) -> Vec<TransactionValidationError> {
    use TransactionValidationError as E;

    let mut errors = Vec::new();
    let chain = wallet.chain();
    let fee_value = fee.map_or(0, |f| f.value);
    let is_coin = amount.amount_type == AmountType::Coin;

    if amount.value == 0 {
        errors.push(E::AmountNotPositive);
    }

    let balance = wallet.funds_available(&amount.amount_type);
    if amount.value > balance {
        errors.push(E::AmountExceedsBalance { amount: amount.value, balance });
    }

    let coin_balance = wallet.funds_available(&AmountType::Coin);

    if let Some(resource) = &chain.fee_resource {
        if coin_balance < fee_value {
            errors.push(E::FeeExceedsBalance { fee: fee_value, balance: coin_balance });
        }
        let held = wallet.amount(&AmountType::FeeResource(resource.name.clone()));
        let available = held.map_or(0, |a| a.value);
        let max = held.and_then(|a| a.max_value).unwrap_or(available);
        if available < fee_value {
            errors.push(E::InsufficientFeeResource {
                resource: resource.name.clone(),
                available,
                required: fee_value,
                max,
            });
        } else if amount.value > available - fee_value {
            errors.push(E::FeeResourceExceedsBalance {
                resource: resource.name.clone(),
                available: available - fee_value,
            });
        }
        return errors;
    }

    if fee_value > coin_balance {
        errors.push(E::FeeExceedsBalance { fee: fee_value, balance: coin_balance });
    } else if is_coin && amount.value <= balance {
        let total = amount.value.saturating_add(fee_value);
        if total > balance {
            errors.push(E::TotalExceedsBalance { total, balance });
        }
    }

    if !is_coin {
        return errors;
    }

    let remaining = balance.checked_sub(amount.value.saturating_add(fee_value));

    if let Some(dust) = chain.dust {
        if amount.value > 0 && amount.value < dust {
            errors.push(E::DustAmount { minimum: dust });
        }
        if let Some(change) = remaining {
            if change > 0 && change < dust {
                errors.push(E::DustChange { minimum: dust });
            }
        }
    }

    if let (Some(minimum), Some(left)) = (chain.existential_deposit, remaining) {
        if left < minimum {
            errors.push(E::BelowExistentialDeposit { minimum });
        }
    }

    errors
}

/// First violated rule as a [`ChainError`].
pub fn check_transfer(wallet: &Wallet, amount: &Amount, fee: Option<&Amount>) -> Result<(), ChainError> {
    match validate_transfer(wallet, amount, fee).into_iter().next() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainkit_core::{Address, ChainRegistry, PublicKey, Token};
    use TransactionValidationError as E;

    fn wallet(chain: &str, coin: u128) -> Wallet {
        let spec = ChainRegistry::builtin().get(chain).unwrap();
        let mut wallet =
            Wallet::new(spec.clone(), PublicKey::new(vec![2; 33]), vec![Address::default_kind("addr")])
                .unwrap();
        wallet.set_amount(Amount::coin(coin, &spec));
        wallet
    }

    fn coin(wallet: &Wallet, value: u128) -> Amount {
        Amount::coin(value, wallet.chain())
    }

    #[test]
    fn valid_bitcoin_transfer() {
        let w = wallet("bitcoin", 100_000);
        assert!(validate_transfer(&w, &coin(&w, 50_000), Some(&coin(&w, 1_000))).is_empty());
    }

    #[test]
    fn zero_amount() {
        let w = wallet("ethereum", 10);
        assert_eq!(validate_transfer(&w, &coin(&w, 0), None), vec![E::AmountNotPositive]);
    }

    #[test]
    fn amount_and_total_exceed_balance() {
        let w = wallet("ethereum", 100);
        assert_eq!(
            validate_transfer(&w, &coin(&w, 150), Some(&coin(&w, 1))),
            vec![E::AmountExceedsBalance { amount: 150, balance: 100 }]
        );
        assert_eq!(
            validate_transfer(&w, &coin(&w, 90), Some(&coin(&w, 20))),
            vec![E::TotalExceedsBalance { total: 110, balance: 100 }]
        );
        assert_eq!(
            validate_transfer(&w, &coin(&w, 10), Some(&coin(&w, 200))),
            vec![E::FeeExceedsBalance { fee: 200, balance: 100 }]
        );
    }

    #[test]
    fn token_fee_is_paid_in_coin() {
        let mut w = wallet("ethereum", 5);
        let token = Token {
            name: "Tether".into(),
            symbol: "USDT".into(),
            contract_address: "0xdac17f958d2ee523a2206206994597c13d831ec7".into(),
            decimals: 6,
        };
        w.set_amount(Amount::token(1_000, &token));
        assert!(validate_transfer(&w, &Amount::token(1_000, &token), Some(&coin(&w, 5))).is_empty());
        assert_eq!(
            validate_transfer(&w, &Amount::token(10, &token), Some(&coin(&w, 6))),
            vec![E::FeeExceedsBalance { fee: 6, balance: 5 }]
        );
    }

    #[test]
    fn bitcoin_dust_rules() {
        let w = wallet("bitcoin", 10_000);
        assert_eq!(
            validate_transfer(&w, &coin(&w, 500), Some(&coin(&w, 200))),
            vec![E::DustAmount { minimum: 1_000 }]
        );
        assert_eq!(
            validate_transfer(&w, &coin(&w, 9_000), Some(&coin(&w, 500))),
            vec![E::DustChange { minimum: 1_000 }]
        );
        // spending everything leaves no change at all
        assert!(validate_transfer(&w, &coin(&w, 9_500), Some(&coin(&w, 500))).is_empty());
    }

    #[test]
    fn polkadot_existential_deposit() {
        // 2 DOT balance, existential deposit 1 DOT
        let w = wallet("polkadot", 20_000_000_000);
        assert!(validate_transfer(&w, &coin(&w, 5_000_000_000), Some(&coin(&w, 100))).is_empty());
        assert_eq!(
            validate_transfer(&w, &coin(&w, 15_000_000_000), Some(&coin(&w, 100))),
            vec![E::BelowExistentialDeposit { minimum: 10_000_000_000 }]
        );
    }

    fn koinos(coin_value: u128, mana: u128, max: u128) -> Wallet {
        let mut w = wallet("koinos", coin_value);
        let chain = w.chain_arc();
        w.set_amount(Amount::fee_resource(mana, Some(max), &chain).unwrap());
        w
    }

    #[test]
    fn fee_resource_rules() {
        let w = koinos(1_000, 500, 1_000);
        assert!(validate_transfer(&w, &coin(&w, 400), Some(&coin(&w, 100))).is_empty());

        let w = koinos(50, 500, 1_000);
        assert_eq!(
            validate_transfer(&w, &coin(&w, 10), Some(&coin(&w, 100))),
            vec![E::FeeExceedsBalance { fee: 100, balance: 50 }]
        );

        let w = koinos(1_000, 80, 1_000);
        assert_eq!(
            validate_transfer(&w, &coin(&w, 10), Some(&coin(&w, 100))),
            vec![E::InsufficientFeeResource {
                resource: "mana".into(),
                available: 80,
                required: 100,
                max: 1_000
            }]
        );

        let w = koinos(1_000, 500, 1_000);
        assert_eq!(
            validate_transfer(&w, &coin(&w, 450), Some(&coin(&w, 100))),
            vec![E::FeeResourceExceedsBalance { resource: "mana".into(), available: 400 }]
        );
    }

    #[test]
    fn first_error_maps_into_taxonomy() {
        let w = koinos(1_000, 80, 1_000);
        let err = check_transfer(&w, &coin(&w, 10), Some(&coin(&w, 100))).unwrap_err();
        assert!(matches!(
            err,
            ChainError::Account(AccountError::InsufficientFeeResource { max: 1_000, .. })
        ));

        let w = wallet("ethereum", 100);
        assert!(matches!(
            check_transfer(&w, &coin(&w, 0), None).unwrap_err(),
            ChainError::Build(BuildError::InvalidIntent(_))
        ));
        assert!(check_transfer(&w, &coin(&w, 10), None).is_ok());
    }
}
