//! # Domain Module
//!
//! Contains the business logic of the smoke-free savings counter.
//!
//! Money accrues at a fixed daily amount from a start date. Completed months
//! can be spent through recorded withdrawals; the current month is still
//! accruing and cannot be withdrawn from.
//!
//! ## Module Organization
//!
//! - **accrual**: Calendar arithmetic, counter totals and month progress (pure)
//! - **withdrawal_ledger**: Normalization of the stored ledger and balance math (pure)
//! - **withdrawal_service**: Reading and mutating the persisted ledger
//! - **settings_service**: Start date and daily amount with read-through defaults
//! - **theme_service**: Appearance preference
//! - **validation**: Checks for user-entered amounts
//! - **clock**: Source of "now" for the services
//!
//! ## Business Rules
//!
//! - Both the start day and today count as accrued days
//! - Days before the start date accrue nothing
//! - Withdrawals never drive a balance below zero
//! - The ledger is kept newest first
//! - Malformed stored data never fails a read; it is dropped and rewritten

pub mod accrual;
pub mod clock;
pub mod settings_service;
pub mod theme_service;
pub mod validation;
pub mod withdrawal_ledger;
pub mod withdrawal_service;

pub use clock::{Clock, SystemClock};
pub use settings_service::SettingsService;
pub use theme_service::ThemeService;
pub use validation::{AmountInputError, WithdrawalError};
pub use withdrawal_ledger::NormalizedHistory;
pub use withdrawal_service::WithdrawalService;
