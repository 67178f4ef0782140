use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Counter configuration as persisted by the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSettings {
    /// Day the counter started, truncated to local midnight
    pub start_date: DateTime<Local>,
    /// Amount saved per day (whole units, never negative)
    pub daily_amount: u64,
}

/// A single withdrawal from the accumulated savings.
///
/// The serialized shape is the on-disk ledger format, so field order and the
/// `createdAtIso` name must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalEntry {
    /// Withdrawn amount, always positive
    pub amount: u64,
    /// Canonical ISO-8601 instant (`YYYY-MM-DDTHH:MM:SS.mmmZ`)
    #[serde(rename = "createdAtIso")]
    pub created_at_iso: String,
    /// Opaque unique identifier. Entries recorded here use
    /// `withdrawal::epoch_millis::suffix`; stored ledgers may carry any non-blank string.
    pub id: String,
}

/// Raw accrual totals for a counter at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CounterTotals {
    /// Everything accrued since the start date (inclusive of today)
    pub overall: u64,
    /// Accrual inside the current calendar month only
    pub monthly: u64,
}

/// Withdrawal-aware balances shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WithdrawalBalances {
    pub generated_overall: u64,
    pub generated_monthly: u64,
    /// Accrual from completed months that has not been withdrawn yet
    pub past_accumulated_available: u64,
    pub withdrawn_total: u64,
    /// Lifetime accrual minus every withdrawal, floored at zero
    pub adjusted_overall: u64,
}

/// How much of the current month is still ahead
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthRemainingProgress {
    pub days_in_month: u32,
    /// Calendar days left including today
    pub days_left: u32,
    /// Remaining share of the month's duration, in `[0, 1]`
    pub remaining_ratio: f64,
}

/// Appearance preference persisted next to the counter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Dark,
    Light,
    System,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Dark => "dark",
            ThemeMode::Light => "light",
            ThemeMode::System => "system",
        }
    }
}

impl FromStr for ThemeMode {
    type Err = ThemeModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dark" => Ok(ThemeMode::Dark),
            "light" => Ok(ThemeMode::Light),
            "system" => Ok(ThemeMode::System),
            _ => Err(ThemeModeError),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThemeModeError;

impl fmt::Display for ThemeModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Theme mode must be one of: dark, light, system")
    }
}

impl std::error::Error for ThemeModeError {}

impl WithdrawalEntry {
    /// Generate withdrawal ID from the creation timestamp and a random suffix
    pub fn generate_id(epoch_millis: u64, suffix: &str) -> String {
        format!("withdrawal::{}::{}", epoch_millis, suffix)
    }
}
