//! UTXO coin selection.
//!
//! Outputs are sorted ascending and the output closest to the still-missing
//! amount is picked by binary search: an exact match when there is one,
//! otherwise the smallest output larger than the gap, otherwise the largest
//! output left. This keeps the input count low and tends to avoid change.

use serde::{Deserialize, Serialize};

use chainkit_core::SelectionError;

/// Anything with a spendable value in minimal units.
pub trait SpendableOutput {
    fn amount(&self) -> u64;
}

impl SpendableOutput for u64 {
    fn amount(&self) -> u64 {
        *self
    }
}

/// An output observed on chain and owned by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Transaction id in display (big-endian hex) order.
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
}

impl SpendableOutput for UnspentOutput {
    fn amount(&self) -> u64 {
        self.amount
    }
}

/// Result of [`select_utxos`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection<T> {
    /// Selected outputs in selection order (descending when insufficient).
    pub selected: Vec<T>,
    /// Sum of `selected`.
    pub total: u128,
    /// `spend + fee`.
    pub target: u64,
    /// The whole pool does not cover `target`; `selected` is every output.
    pub insufficient: bool,
}

impl<T> UtxoSelection<T> {
    /// Value left over after paying `target`; zero when insufficient.
    pub fn change(&self) -> u128 {
        self.total.saturating_sub(u128::from(self.target))
    }

    pub fn is_sufficient(&self) -> bool {
        !self.insufficient
    }
}

/// Select outputs covering `spend + fee`.
///
/// When the pool is too small every output is returned, largest first, with
/// [`UtxoSelection::insufficient`] set. With `dust` set, a selection whose
/// change would be positive but below `dust` also takes the smallest unused
/// output so the change is worth creating. `outputs` is never modified.
pub fn select_utxos<T>(
    outputs: &[T],
    spend: u64,
    fee: u64,
    dust: Option<u64>,
) -> Result<UtxoSelection<T>, SelectionError>
where
    T: SpendableOutput + Clone,
{
    let target = spend
        .checked_add(fee)
        .ok_or(SelectionError::AmountOverflow { spend, fee })?;
    let goal = u128::from(target);
    let available: u128 = outputs.iter().map(|o| u128::from(o.amount())).sum();

    if available < goal {
        let mut all = outputs.to_vec();
        all.sort_by(|a, b| b.amount().cmp(&a.amount()));
        return Ok(UtxoSelection { selected: all, total: available, target, insufficient: true });
    }

    let mut remaining = outputs.to_vec();
    remaining.sort_by_key(|o| o.amount());

    let mut selected = Vec::new();
    let mut total: u128 = 0;

    while total < goal && !remaining.is_empty() {
        // total < goal <= u64::MAX, so the gap fits in u64
        let missing = (goal - total) as u64;
        let index = match remaining.binary_search_by_key(&missing, |o| o.amount()) {
            Ok(exact) => exact,
            Err(insert) if insert < remaining.len() => insert,
            Err(_) => remaining.len() - 1,
        };
        let output = remaining.remove(index);
        total += u128::from(output.amount());
        selected.push(output);
    }

    if let Some(dust) = dust {
        let change = total - goal;
        if change > 0 && change < u128::from(dust) && !remaining.is_empty() {
            let smallest = remaining.remove(0);
            total += u128::from(smallest.amount());
            selected.push(smallest);
        }
    }

    Ok(UtxoSelection { selected, total, target, insufficient: false })
}

/// [`select_utxos`] without the dust-change supplement.
pub fn select_utxos_without_dust<T>(
    outputs: &[T],
    spend: u64,
    fee: u64,
) -> Result<UtxoSelection<T>, SelectionError>
where
    T: SpendableOutput + Clone,
{
    select_utxos(outputs, spend, fee, None)
}
