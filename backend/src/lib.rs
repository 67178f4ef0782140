//! # Smoke-Free Counter Backend
//!
//! Contains all non-UI logic of the savings counter.
//!
//! - **Domain**: accrual arithmetic, the withdrawal ledger and the settings
//! - **Storage**: string key/value persistence (SQLite, or memory as a fallback)
//! - **Config** and **Logging**: process setup for the host application
//!
//! ## Architecture
//!
//! ```text
//! Host UI
//!     ↓
//! AppState (services)
//!     ↓
//! Domain Layer (pure calculations + services)
//!     ↓
//! Storage Layer (KeyValueStorage)
//! ```

pub mod config;
pub mod domain;
pub mod logging;
pub mod storage;

use anyhow::Result;
use chrono::{DateTime, Local};
use log::{info, warn};
use shared::{CounterSettings, CounterTotals, MonthRemainingProgress, WithdrawalBalances, WithdrawalEntry};
use std::sync::Arc;

pub use config::CounterConfig;
use domain::accrual::{calculate_counter_totals, calculate_month_remaining_progress};
use domain::withdrawal_ledger::calculate_withdrawal_balances;
use domain::{Clock, SettingsService, SystemClock, ThemeService, WithdrawalService};
use storage::{DbConnection, KeyValueStorage, MemoryStorage};

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub settings_service: SettingsService,
    pub withdrawal_service: WithdrawalService,
    pub theme_service: ThemeService,
    clock: Arc<dyn Clock>,
}

/// Everything the counter screen shows, computed at a single instant
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSnapshot {
    pub now: DateTime<Local>,
    pub settings: CounterSettings,
    pub totals: CounterTotals,
    pub balances: WithdrawalBalances,
    pub month_progress: MonthRemainingProgress,
    pub history: Vec<WithdrawalEntry>,
}

impl AppState {
    /// Wire the services over an existing storage backend
    pub fn with_storage(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>, config: &CounterConfig) -> Self {
        Self {
            settings_service: SettingsService::new(storage.clone(), clock.clone(), config.default_daily_amount),
            withdrawal_service: WithdrawalService::new(storage.clone(), clock.clone()),
            theme_service: ThemeService::new(storage),
            clock,
        }
    }

    /// Load settings and ledger and compute every figure at the same "now"
    pub async fn load_snapshot(&self) -> CounterSnapshot {
        let (settings, history) = tokio::join!(
            self.settings_service.get_settings(),
            self.withdrawal_service.get_history(),
        );
        let now = self.clock.now();

        CounterSnapshot {
            totals: calculate_counter_totals(&settings.start_date, settings.daily_amount, &now),
            balances: calculate_withdrawal_balances(&settings.start_date, settings.daily_amount, &now, &history),
            month_progress: calculate_month_remaining_progress(&now),
            now,
            settings,
            history,
        }
    }
}

/// Initialize the backend with all required services.
/// Falls back to in-memory storage when the database cannot be opened.
pub async fn initialize_backend(config: &CounterConfig) -> Result<AppState> {
    info!("Setting up counter storage at {}", config.database_url);
    let storage: Arc<dyn KeyValueStorage> = match DbConnection::new(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            warn!(
                "Failed to open {} ({}), counter state will not survive a restart",
                config.database_url, e
            );
            Arc::new(MemoryStorage::new())
        }
    };

    info!("Setting up domain services");
    Ok(AppState::with_storage(storage, Arc::new(SystemClock), config))
}
