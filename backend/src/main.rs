use anyhow::Result;
use log::info;
use smokefree_backend::domain::accrual::format_date_ymd;
use smokefree_backend::{initialize_backend, logging, CounterConfig};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let config = CounterConfig::from_env();
    let state = initialize_backend(&config).await?;
    let snapshot = state.load_snapshot().await;

    info!(
        "Smoke-free since {} at {} per day",
        format_date_ymd(&snapshot.settings.start_date),
        snapshot.settings.daily_amount
    );
    info!(
        "Saved {} overall, {} this month, {} withdrawn",
        snapshot.totals.overall, snapshot.totals.monthly, snapshot.balances.withdrawn_total
    );
    info!(
        "Available from completed months: {} ({} of {} days left this month)",
        snapshot.balances.past_accumulated_available,
        snapshot.month_progress.days_left,
        snapshot.month_progress.days_in_month
    );

    Ok(())
}
