//! Validation of amounts typed by the user before they reach storage.

/// Errors for the daily amount form field
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AmountInputError {
    #[error("Enter an amount")]
    Empty,
    #[error("Enter a number")]
    NotANumber,
    #[error("Amount cannot be negative")]
    Negative,
    #[error("Enter a whole number")]
    NotWholeNumber,
}

/// Errors for a withdrawal request
#[derive(Debug, thiserror::Error)]
pub enum WithdrawalError {
    #[error("Withdrawal amount must be a whole number")]
    NotWholeNumber,
    #[error("Withdrawal amount must be positive")]
    NonPositiveAmount,
    #[error("Withdrawal of {requested} exceeds the available {available}")]
    ExceedsAvailable { requested: u64, available: u64 },
    #[error("Failed to record withdrawal: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Parse the daily amount field: a non-negative whole number, surrounding
/// whitespace allowed
pub fn parse_daily_amount_input(input: &str) -> Result<u64, AmountInputError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountInputError::Empty);
    }

    let amount = trimmed.parse::<f64>().map_err(|_| AmountInputError::NotANumber)?;
    if !amount.is_finite() {
        return Err(AmountInputError::NotANumber);
    }
    if amount < 0.0 {
        return Err(AmountInputError::Negative);
    }
    if amount.fract() != 0.0 {
        return Err(AmountInputError::NotWholeNumber);
    }

    Ok(amount as u64)
}

/// Check a requested withdrawal against what completed months have accrued
pub fn validate_withdrawal_amount(amount: f64, available: u64) -> Result<u64, WithdrawalError> {
    if !amount.is_finite() || amount.fract() != 0.0 {
        return Err(WithdrawalError::NotWholeNumber);
    }
    if amount <= 0.0 {
        return Err(WithdrawalError::NonPositiveAmount);
    }

    let requested = amount as u64;
    if requested > available {
        return Err(WithdrawalError::ExceedsAvailable { requested, available });
    }

    Ok(requested)
}
