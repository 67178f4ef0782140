//! Counter settings: start date and daily amount.
//!
//! Loading follows a read-through-defaults pattern. Missing or invalid stored
//! values are replaced by defaults and the defaults written back, so storage
//! converges to a valid state. If storage is unavailable the defaults are
//! returned without writing anything.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use log::{debug, info, warn};
use shared::CounterSettings;
use std::sync::Arc;

use super::accrual::{local_midnight, normalize_daily_amount, start_of_local_day, to_iso_string};
use super::clock::Clock;
use crate::storage::{KeyValueStorage, StorageKey};

/// Service for reading and updating the counter settings
#[derive(Clone)]
pub struct SettingsService {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    default_daily_amount: u64,
}

/// Parse a stored start date and truncate it to local midnight.
/// Accepts any RFC 3339 instant, or a bare `YYYY-MM-DD` read as UTC midnight.
fn parse_stored_date(value: &str) -> Option<DateTime<Local>> {
    let instant = match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(_) => {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
            local_midnight(&Utc, date)
        }
    };

    Some(start_of_local_day(&instant.with_timezone(&Local)))
}

/// Parse a stored daily amount; fractions are floored, negatives rejected
fn parse_stored_daily_amount(value: &str) -> Option<u64> {
    let parsed = value.trim().parse::<f64>().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }

    Some(parsed.floor() as u64)
}

impl SettingsService {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>, default_daily_amount: u64) -> Self {
        Self {
            storage,
            clock,
            default_daily_amount,
        }
    }

    fn today(&self) -> DateTime<Local> {
        start_of_local_day(&self.clock.now())
    }

    /// Load the settings, repairing storage with defaults where needed.
    /// Never fails; storage errors yield in-memory defaults.
    pub async fn get_settings(&self) -> CounterSettings {
        let today = self.today();

        match self.load_or_repair(today).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Counter settings unavailable, using defaults: {}", e);
                CounterSettings {
                    start_date: today,
                    daily_amount: self.default_daily_amount,
                }
            }
        }
    }

    async fn load_or_repair(&self, today: DateTime<Local>) -> Result<CounterSettings> {
        let (stored_start_date, stored_daily_amount) = tokio::try_join!(
            self.storage.get_value(StorageKey::CounterStartDate.as_str()),
            self.storage.get_value(StorageKey::CounterDailyAmount.as_str()),
        )?;

        let parsed_start_date = stored_start_date.as_deref().and_then(parse_stored_date);
        let parsed_daily_amount = stored_daily_amount.as_deref().and_then(parse_stored_daily_amount);

        let settings = CounterSettings {
            start_date: parsed_start_date.unwrap_or(today),
            daily_amount: parsed_daily_amount.unwrap_or(self.default_daily_amount),
        };

        if parsed_start_date.is_none() || parsed_daily_amount.is_none() {
            info!(
                "Writing default counter settings (start date {}, daily amount {})",
                to_iso_string(&settings.start_date),
                settings.daily_amount
            );
            let start_date_iso = to_iso_string(&settings.start_date);
            let daily_amount = settings.daily_amount.to_string();
            tokio::try_join!(
                self.storage.put_value(StorageKey::CounterStartDate.as_str(), &start_date_iso),
                self.storage.put_value(StorageKey::CounterDailyAmount.as_str(), &daily_amount),
            )?;
        }

        Ok(settings)
    }

    /// Persist a new daily amount and return the value actually stored.
    /// Negative or non-finite input stores the configured default.
    pub async fn save_daily_amount(&self, amount: f64) -> Result<u64> {
        let normalized = normalize_daily_amount(amount, self.default_daily_amount);
        self.storage
            .put_value(StorageKey::CounterDailyAmount.as_str(), &normalized.to_string())
            .await?;

        debug!("Saved daily amount {}", normalized);
        Ok(normalized)
    }

    /// Persist a new start date, truncated to local midnight, and return it
    pub async fn save_start_date<Tz: TimeZone>(&self, date: &DateTime<Tz>) -> Result<DateTime<Local>> {
        let normalized = start_of_local_day(&date.with_timezone(&Local));
        self.storage
            .put_value(StorageKey::CounterStartDate.as_str(), &to_iso_string(&normalized))
            .await?;

        debug!("Saved start date {}", to_iso_string(&normalized));
        Ok(normalized)
    }

    /// Restart the counter from today
    pub async fn reset_start_date(&self) -> Result<DateTime<Local>> {
        let now = self.clock.now();
        info!("Resetting counter start date");
        self.save_start_date(&now).await
    }
}
