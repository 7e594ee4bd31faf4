//! Recomputes pass-through value, profit margin and end date of every stored
//! capture point and rewrites the rows whose stored values drifted.
//!
//! Usage: `recompute_derived_fields [--dry-run]`
use capture_points_api::config::Config;
use capture_points_api::db::Database;
use capture_points_api::derivation::derive_fields;
use capture_points_api::storage::CapturePointStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let dry_run = std::env::args().any(|arg| arg == "--dry-run");
    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    let store = CapturePointStore::new(db.pool.clone());

    let points = store.list().await?;
    let total = points.len();
    tracing::info!(
        "Checking derived fields of {} capture point(s){}",
        total,
        if dry_run { " (dry run)" } else { "" }
    );

    let mut rewritten = 0;
    let mut unchanged = 0;
    let mut error_count = 0;

    for (idx, point) in points.iter().enumerate() {
        if (idx + 1) % 500 == 0 {
            tracing::info!(
                "Processed {}/{} points (Rewritten: {}, Unchanged: {}, Errors: {})",
                idx + 1,
                total,
                rewritten,
                unchanged,
                error_count
            );
        }

        let expected = derive_fields(&point.terms());
        if expected == point.derived() {
            unchanged += 1;
            continue;
        }

        tracing::warn!(
            "Point {} ({}) drifted: pass-through {} -> {}, margin {} -> {}, end {} -> {}",
            point.id,
            point.name,
            point.pass_through_value,
            expected.pass_through_value,
            point.profit_margin,
            expected.profit_margin,
            point.end_date,
            expected.end_date
        );

        if dry_run {
            rewritten += 1;
            continue;
        }

        match store.rewrite_derived(point.id, &expected).await {
            Ok(()) => rewritten += 1,
            Err(e) => {
                tracing::error!("Failed to rewrite point {}: {}", point.id, e);
                error_count += 1;
            }
        }
    }

    tracing::info!(
        "Done. Total: {}, Rewritten: {}, Unchanged: {}, Errors: {}",
        total,
        rewritten,
        unchanged,
        error_count
    );

    Ok(())
}
