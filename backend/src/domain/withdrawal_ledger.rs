//! Withdrawal ledger normalization and withdrawal-aware balances.
//!
//! The stored ledger is untrusted: it may have been written by an older build
//! or edited by hand. Every read goes through [`normalize_stored_withdrawal_history`],
//! which keeps only well-formed entries, sorts them newest first and reports
//! whether the stored value should be rewritten.

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde_json::Value;
use shared::{WithdrawalBalances, WithdrawalEntry};
use std::cmp::Reverse;
use std::collections::HashSet;

use super::accrual::{calculate_counter_totals, parse_canonical_iso};

/// Result of normalizing a raw stored ledger value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedHistory {
    /// Valid entries, newest first
    pub history: Vec<WithdrawalEntry>,
    /// The stored value differs from `history` and should be written back
    pub needs_rewrite: bool,
    /// Number of stored elements that were discarded
    pub dropped: usize,
}

impl NormalizedHistory {
    fn reset() -> Self {
        Self {
            history: Vec::new(),
            needs_rewrite: true,
            dropped: 0,
        }
    }
}

/// Check the entry invariants: positive amount, non-blank id, canonical ISO instant
pub fn is_valid_entry(entry: &WithdrawalEntry) -> bool {
    entry.amount > 0
        && !entry.id.trim().is_empty()
        && parse_canonical_iso(&entry.created_at_iso).is_some()
}

/// Accept whole positive JSON numbers, including ones written as floats (`40.0`).
/// Numbers outside the `f64` range (`1e400`) parse as infinite and are rejected.
fn parse_amount(value: &Value) -> Option<u64> {
    if let Some(amount) = value.as_u64() {
        return (amount > 0).then_some(amount);
    }

    let amount = value.as_f64()?;
    if amount.is_finite() && amount.fract() == 0.0 && amount > 0.0 && amount < u64::MAX as f64 {
        Some(amount as u64)
    } else {
        None
    }
}

fn entry_from_value(value: &Value) -> Option<WithdrawalEntry> {
    let object = value.as_object()?;
    let amount = parse_amount(object.get("amount")?)?;
    let created_at_iso = object.get("createdAtIso")?.as_str()?;
    let id = object.get("id")?.as_str()?;

    let entry = WithdrawalEntry {
        amount,
        created_at_iso: created_at_iso.to_string(),
        id: id.to_string(),
    };

    is_valid_entry(&entry).then_some(entry)
}

/// Sort newest first. Entries created in the same millisecond are ordered by
/// id so the result never depends on the stored order.
pub fn sort_newest_first(entries: &mut [WithdrawalEntry]) {
    entries.sort_by_cached_key(|entry| (Reverse(created_at(entry)), entry.id.clone()));
}

/// Keep the first (newest) entry for every id
fn dedupe_by_id(entries: Vec<WithdrawalEntry>) -> Vec<WithdrawalEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect()
}

/// Normalize a raw stored ledger value.
///
/// - missing or empty value: empty ledger, nothing to rewrite
/// - unparseable JSON or a non-array: empty ledger, rewrite to `[]`
/// - otherwise invalid elements are dropped and the rest sorted newest first
pub fn normalize_stored_withdrawal_history(raw: Option<&str>) -> NormalizedHistory {
    let raw = match raw {
        Some(value) if !value.is_empty() => value,
        _ => return NormalizedHistory::default(),
    };

    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Stored withdrawal history is not valid JSON, resetting it: {}", e);
            return NormalizedHistory::reset();
        }
    };

    let Some(candidates) = parsed.as_array() else {
        warn!("Stored withdrawal history is not an array, resetting it");
        return NormalizedHistory::reset();
    };

    let mut history: Vec<WithdrawalEntry> = candidates.iter().filter_map(entry_from_value).collect();
    sort_newest_first(&mut history);
    let history = dedupe_by_id(history);

    let dropped = candidates.len() - history.len();
    if dropped > 0 {
        warn!("Dropped {} invalid withdrawal entries from stored history", dropped);
    }

    let needs_rewrite = match serde_json::to_value(&history) {
        Ok(normalized) => normalized != parsed,
        Err(_) => true,
    };

    NormalizedHistory {
        history,
        needs_rewrite,
        dropped,
    }
}

/// Re-validate, sort and dedupe an already typed ledger
pub fn normalize_withdrawal_entries(entries: &[WithdrawalEntry]) -> Vec<WithdrawalEntry> {
    let mut valid: Vec<WithdrawalEntry> = entries.iter().filter(|entry| is_valid_entry(entry)).cloned().collect();
    sort_newest_first(&mut valid);
    dedupe_by_id(valid)
}

/// Combine accrual totals with the ledger.
///
/// Withdrawals reduce the lifetime total regardless of when they happened;
/// only accrual from completed months is available for withdrawal.
pub fn calculate_withdrawal_balances<Tz: TimeZone>(
    start_date: &DateTime<Tz>,
    daily_amount: u64,
    now: &DateTime<Tz>,
    withdrawals: &[WithdrawalEntry],
) -> WithdrawalBalances {
    let totals = calculate_counter_totals(start_date, daily_amount, now);
    let withdrawn_total = normalize_withdrawal_entries(withdrawals)
        .iter()
        .fold(0u64, |sum, entry| sum.saturating_add(entry.amount));
    let past_generated = totals.overall.saturating_sub(totals.monthly);

    WithdrawalBalances {
        generated_overall: totals.overall,
        generated_monthly: totals.monthly,
        past_accumulated_available: past_generated.saturating_sub(withdrawn_total),
        withdrawn_total,
        adjusted_overall: totals.overall.saturating_sub(withdrawn_total),
    }
}

/// Parsed creation instant of an entry that passed validation
pub fn created_at(entry: &WithdrawalEntry) -> Option<DateTime<Utc>> {
    parse_canonical_iso(&entry.created_at_iso)
}
