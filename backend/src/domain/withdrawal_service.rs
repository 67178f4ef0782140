//! Persisted withdrawal ledger.
//!
//! Reads never fail: a storage error yields an empty ledger. Mutations
//! (save, delete, checked withdraw) run one at a time behind an async mutex,
//! so two concurrent withdrawals cannot both read the same base ledger and
//! overwrite each other's entry.

use anyhow::Result;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use shared::{CounterSettings, WithdrawalBalances, WithdrawalEntry};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::accrual::to_iso_string;
use super::clock::Clock;
use super::validation::{validate_withdrawal_amount, WithdrawalError};
use super::withdrawal_ledger::{calculate_withdrawal_balances, normalize_stored_withdrawal_history, sort_newest_first};
use crate::storage::{KeyValueStorage, StorageKey};

const HISTORY_KEY: StorageKey = StorageKey::CounterWithdrawalHistory;

/// Service responsible for the withdrawal history and withdrawal-aware balances
#[derive(Clone)]
pub struct WithdrawalService {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    mutation_lock: Arc<Mutex<()>>,
}

impl WithdrawalService {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            mutation_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load the normalized ledger, newest first.
    /// A failed read returns an empty ledger.
    pub async fn get_history(&self) -> Vec<WithdrawalEntry> {
        let _guard = self.mutation_lock.lock().await;
        match self.read_history().await {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to read withdrawal history, using an empty ledger: {}", e);
                Vec::new()
            }
        }
    }

    /// Record a withdrawal of `amount` (floored) at the current instant.
    ///
    /// Amounts that are not positive after flooring leave the ledger as is.
    /// This does not check the amount against the available balance; use
    /// [`WithdrawalService::withdraw_checked`] for that.
    ///
    /// Unlike [`WithdrawalService::get_history`] this returns an error when the
    /// ledger cannot be read or the new ledger cannot be written. Nothing is
    /// written over a ledger that could not be read.
    pub async fn save_withdrawal(&self, amount: f64) -> Result<Vec<WithdrawalEntry>> {
        let normalized_amount = amount.floor();
        if !normalized_amount.is_finite() || normalized_amount <= 0.0 {
            info!("Ignoring withdrawal with invalid amount {}", amount);
            return Ok(self.get_history().await);
        }

        let _guard = self.mutation_lock.lock().await;
        let existing = self.read_history().await?;
        self.append_entry(existing, normalized_amount as u64).await
    }

    /// Remove the entry with the given id, if any, and persist the result.
    ///
    /// Returns an error when the ledger cannot be read or written, so the
    /// caller can report that the deletion did not happen.
    pub async fn delete_withdrawal(&self, entry_id: &str) -> Result<Vec<WithdrawalEntry>> {
        let entry_id = entry_id.trim();
        if entry_id.is_empty() {
            return Ok(self.get_history().await);
        }

        let _guard = self.mutation_lock.lock().await;
        let existing = self.read_history().await?;
        let before = existing.len();
        let next_history: Vec<WithdrawalEntry> = existing.into_iter().filter(|entry| entry.id != entry_id).collect();

        if next_history.len() == before {
            debug!("No withdrawal with id '{}' to delete", entry_id);
        } else {
            info!("Deleted withdrawal '{}'", entry_id);
        }

        self.write_history(&next_history).await?;
        Ok(next_history)
    }

    /// Validate `amount` against the currently withdrawable balance and record it.
    /// The check and the write happen under the same lock.
    pub async fn withdraw_checked(
        &self,
        amount: f64,
        settings: &CounterSettings,
    ) -> Result<Vec<WithdrawalEntry>, WithdrawalError> {
        let _guard = self.mutation_lock.lock().await;
        let existing = self.read_history().await?;

        let balances = self.balances_at(settings, &existing, self.clock.now());
        let requested = validate_withdrawal_amount(amount, balances.past_accumulated_available)?;

        Ok(self.append_entry(existing, requested).await?)
    }

    /// Balances for `settings` right now
    pub async fn current_balances(&self, settings: &CounterSettings) -> WithdrawalBalances {
        let history = self.get_history().await;
        self.balances_at(settings, &history, self.clock.now())
    }

    fn balances_at(
        &self,
        settings: &CounterSettings,
        history: &[WithdrawalEntry],
        now: DateTime<Local>,
    ) -> WithdrawalBalances {
        calculate_withdrawal_balances(&settings.start_date, settings.daily_amount, &now, history)
    }

    /// Read and normalize the stored ledger, writing the cleaned form back
    /// when it differs. Only the read itself can fail.
    async fn read_history(&self) -> Result<Vec<WithdrawalEntry>> {
        let raw = self.storage.get_value(HISTORY_KEY.as_str()).await?;
        let normalized = normalize_stored_withdrawal_history(raw.as_deref());

        if normalized.needs_rewrite {
            debug!(
                "Rewriting normalized withdrawal history ({} entries, {} dropped)",
                normalized.history.len(),
                normalized.dropped
            );
            if let Err(e) = self.write_history(&normalized.history).await {
                // Retried on the next read
                warn!("Failed to rewrite normalized withdrawal history: {}", e);
            }
        }

        Ok(normalized.history)
    }

    async fn append_entry(&self, existing: Vec<WithdrawalEntry>, amount: u64) -> Result<Vec<WithdrawalEntry>> {
        let entry = self.new_entry(amount);
        info!("Recording withdrawal '{}' of {}", entry.id, entry.amount);

        let mut next_history = Vec::with_capacity(existing.len() + 1);
        next_history.push(entry);
        next_history.extend(existing);
        sort_newest_first(&mut next_history);

        self.write_history(&next_history).await?;
        Ok(next_history)
    }

    fn new_entry(&self, amount: u64) -> WithdrawalEntry {
        let now = self.clock.now();
        let epoch_millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let suffix = Uuid::new_v4().simple().to_string();

        WithdrawalEntry {
            amount,
            created_at_iso: to_iso_string(&now),
            id: WithdrawalEntry::generate_id(epoch_millis, &suffix[..8]),
        }
    }

    async fn write_history(&self, history: &[WithdrawalEntry]) -> Result<()> {
        let serialized = serde_json::to_string(history)?;
        self.storage.put_value(HISTORY_KEY.as_str(), &serialized).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accrual::start_of_local_day;
    use crate::domain::clock::FixedClock;
    use crate::storage::test_utils::FlakyStorage;
    use crate::storage::DbConnection;
    use chrono::TimeZone;

    fn local(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    fn create_test_service(now: DateTime<Local>) -> (WithdrawalService, Arc<FlakyStorage>, Arc<FixedClock>) {
        let storage = Arc::new(FlakyStorage::new());
        let clock = Arc::new(FixedClock::new(now));
        let service = WithdrawalService::new(storage.clone(), clock.clone());
        (service, storage, clock)
    }

    fn settings(start: DateTime<Local>, daily_amount: u64) -> CounterSettings {
        CounterSettings {
            start_date: start_of_local_day(&start),
            daily_amount,
        }
    }

    async fn seed_history(storage: &FlakyStorage, raw: &str) {
        storage.seed(HISTORY_KEY.as_str(), raw).await;
    }

    fn ids(history: &[WithdrawalEntry]) -> Vec<&str> {
        history.iter().map(|entry| entry.id.as_str()).collect()
    }

    const THREE_ENTRIES: &str = r#"[
        {"amount":20,"createdAtIso":"2026-01-10T10:00:00.000Z","id":"older"},
        {"amount":40,"createdAtIso":"2026-03-10T10:00:00.000Z","id":"newest"},
        {"amount":30,"createdAtIso":"2026-02-10T10:00:00.000Z","id":"delete-me"}
    ]"#;

    #[tokio::test]
    async fn test_get_history_empty_storage() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));

        assert!(service.get_history().await.is_empty());
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_get_history_rewrites_dirty_value() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;

        let history = service.get_history().await;

        assert_eq!(ids(&history), vec!["newest", "delete-me", "older"]);
        assert_eq!(storage.write_count(), 1);
        let persisted = storage.raw(HISTORY_KEY.as_str()).await.unwrap();
        assert_eq!(persisted, serde_json::to_string(&history).unwrap());

        // Clean now, so a second read does not write again
        service.get_history().await;
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn test_get_history_self_heals_malformed_json() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, "{oops").await;

        assert!(service.get_history().await.is_empty());
        assert_eq!(storage.raw(HISTORY_KEY.as_str()).await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_get_history_read_failure_returns_empty() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;
        storage.set_fail_reads(true);

        assert!(service.get_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_history_rewrite_failure_is_not_fatal() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;
        storage.set_fail_writes(true);

        let history = service.get_history().await;

        assert_eq!(ids(&history), vec!["newest", "delete-me", "older"]);
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_save_withdrawal_prepends_entry() {
        let now = local(2026, 3, 15, 12);
        let (service, storage, _) = create_test_service(now);
        seed_history(&storage, THREE_ENTRIES).await;

        let history = service.save_withdrawal(25.9).await.unwrap();

        assert_eq!(history.len(), 4);
        assert_eq!(history[0].amount, 25);
        assert_eq!(history[0].created_at_iso, to_iso_string(&now));
        assert!(history[0]
            .id
            .starts_with(&format!("withdrawal::{}::", now.timestamp_millis())));
        assert_eq!(&ids(&history)[1..], &["newest", "delete-me", "older"]);

        let persisted = storage.raw(HISTORY_KEY.as_str()).await.unwrap();
        assert_eq!(persisted, serde_json::to_string(&history).unwrap());
    }

    #[tokio::test]
    async fn test_save_withdrawal_generates_unique_ids() {
        let (service, _, _) = create_test_service(local(2026, 3, 15, 12));

        service.save_withdrawal(10.0).await.unwrap();
        let history = service.save_withdrawal(10.0).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_ne!(history[0].id, history[1].id);
    }

    #[tokio::test]
    async fn test_save_withdrawal_rejects_invalid_amounts() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, r#"[{"amount":40,"createdAtIso":"2026-03-10T10:00:00.000Z","id":"only"}]"#).await;

        for amount in [0.0, 0.9, -10.0, f64::NAN, f64::INFINITY] {
            let history = service.save_withdrawal(amount).await.unwrap();
            assert_eq!(ids(&history), vec!["only"]);
        }
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_save_withdrawal_does_not_clobber_unreadable_ledger() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;
        storage.set_fail_reads(true);

        assert!(service.save_withdrawal(10.0).await.is_err());
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_save_withdrawal_write_failure_is_reported() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        storage.set_fail_writes(true);

        assert!(service.save_withdrawal(10.0).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_withdrawal_storage_failures_are_reported() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;
        service.get_history().await;

        storage.set_fail_writes(true);
        assert!(service.delete_withdrawal("delete-me").await.is_err());

        storage.set_fail_writes(false);
        storage.set_fail_reads(true);
        assert!(service.delete_withdrawal("delete-me").await.is_err());

        storage.set_fail_reads(false);
        assert_eq!(ids(&service.get_history().await), vec!["newest", "delete-me", "older"]);
    }

    #[tokio::test]
    async fn test_delete_withdrawal_removes_matching_id() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;

        let updated = service.delete_withdrawal("delete-me").await.unwrap();

        assert_eq!(ids(&updated), vec!["newest", "older"]);
    }

    #[tokio::test]
    async fn test_delete_withdrawal_trims_id() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;

        let updated = service.delete_withdrawal("  delete-me \n").await.unwrap();

        assert_eq!(ids(&updated), vec!["newest", "older"]);
    }

    #[tokio::test]
    async fn test_delete_withdrawal_missing_id_returns_unchanged_history() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;

        let updated = service.delete_withdrawal("missing-id").await.unwrap();
        let normalized_existing = service.get_history().await;

        assert_eq!(updated, normalized_existing);
    }

    #[tokio::test]
    async fn test_delete_withdrawal_blank_id_is_a_no_op() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(&storage, THREE_ENTRIES).await;

        let updated = service.delete_withdrawal("   ").await.unwrap();

        assert_eq!(ids(&updated), vec!["newest", "delete-me", "older"]);
    }

    #[tokio::test]
    async fn test_delete_withdrawal_persists_updated_history() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));
        seed_history(
            &storage,
            r#"[
                {"amount":20,"createdAtIso":"2026-01-10T10:00:00.000Z","id":"entry-1"},
                {"amount":40,"createdAtIso":"2026-03-10T10:00:00.000Z","id":"entry-2"}
            ]"#,
        )
        .await;

        let updated = service.delete_withdrawal("entry-1").await.unwrap();

        let persisted_raw = storage.raw(HISTORY_KEY.as_str()).await.expect("history should be stored");
        let persisted: Vec<WithdrawalEntry> = serde_json::from_str(&persisted_raw).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, "entry-2");
        assert_eq!(persisted, updated);
    }

    #[tokio::test]
    async fn test_withdraw_checked_enforces_available_balance() {
        let (service, _, _) = create_test_service(local(2026, 2, 15, 12));
        let settings = settings(local(2026, 1, 1, 0), 10);

        let history = service.withdraw_checked(300.0, &settings).await.unwrap();
        assert_eq!(history.len(), 1);

        let result = service.withdraw_checked(11.0, &settings).await;
        assert!(matches!(
            result,
            Err(WithdrawalError::ExceedsAvailable { requested: 11, available: 10 })
        ));

        let balances = service.current_balances(&settings).await;
        assert_eq!(balances.withdrawn_total, 300);
        assert_eq!(balances.past_accumulated_available, 10);
        assert_eq!(balances.adjusted_overall, 160);
    }

    #[tokio::test]
    async fn test_withdraw_checked_rejects_current_month_accrual() {
        // Started this month: nothing from completed months yet
        let (service, storage, _) = create_test_service(local(2026, 2, 15, 12));
        let settings = settings(local(2026, 2, 1, 0), 10);

        let result = service.withdraw_checked(10.0, &settings).await;

        assert!(matches!(result, Err(WithdrawalError::ExceedsAvailable { available: 0, .. })));
        assert_eq!(storage.write_count(), 0);
    }

    #[tokio::test]
    async fn test_balances_follow_the_clock() {
        let (service, storage, clock) = create_test_service(local(2026, 2, 15, 12));
        seed_history(
            &storage,
            r#"[
                {"amount":100,"createdAtIso":"2026-02-14T10:00:00.000Z","id":"withdraw-2"},
                {"amount":40,"createdAtIso":"2026-01-20T10:00:00.000Z","id":"withdraw-1"}
            ]"#,
        )
        .await;
        let settings = settings(local(2026, 1, 1, 0), 10);

        let balances = service.current_balances(&settings).await;
        assert_eq!(balances.withdrawn_total, 140);
        assert_eq!(balances.past_accumulated_available, 170);
        assert_eq!(balances.adjusted_overall, 320);

        // February completes: its accrual becomes withdrawable
        clock.set(local(2026, 3, 1, 8));
        let balances = service.current_balances(&settings).await;
        assert_eq!(balances.generated_overall, 600);
        assert_eq!(balances.generated_monthly, 10);
        assert_eq!(balances.past_accumulated_available, 450);
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_are_not_lost() {
        let (service, storage, _) = create_test_service(local(2026, 3, 15, 12));

        let tasks: Vec<_> = (1..=20)
            .map(|amount| {
                let service = service.clone();
                tokio::spawn(async move { service.save_withdrawal(f64::from(amount)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let history = service.get_history().await;
        assert_eq!(history.len(), 20);
        assert_eq!(history.iter().map(|entry| entry.amount).sum::<u64>(), 210);
        assert_eq!(storage.write_count(), 20);
    }

    #[tokio::test]
    async fn test_withdrawals_persist_in_sqlite() {
        let db = Arc::new(DbConnection::init_test().await.unwrap());
        let clock = Arc::new(FixedClock::new(local(2026, 3, 15, 12)));
        let service = WithdrawalService::new(db.clone(), clock);

        let saved = service.save_withdrawal(42.0).await.unwrap();

        let reloaded = WithdrawalService::new(db, Arc::new(FixedClock::new(local(2026, 3, 16, 12))));
        assert_eq!(reloaded.get_history().await, saved);
    }
}
