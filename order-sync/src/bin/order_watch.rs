//! order-watch: console board for one staff role
//!
//! ```ignore
//! ORDER_API_URL=http://pos.local:8080 ORDER_API_TOKEN=... order-watch kitchen
//! ```

use anyhow::Context;
use order_sync::{SyncChannel, SyncConfig, StaffRole, logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);
    let log_dir = std::env::var("LOG_DIR").ok();
    logger::init_logger(&level, json, log_dir.as_deref())?;

    let role: StaffRole = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "manager".into())
        .parse()
        .context("usage: order-watch [kitchen|server|cashier|manager]")?;

    let config = SyncConfig::from_env();
    tracing::info!(url = %config.base_url, %role, "Starting order watch");

    let channel = SyncChannel::connect(&config)?;
    if config.token.is_none()
        && let (Ok(user), Ok(password)) = (
            std::env::var("ORDER_USERNAME"),
            std::env::var("ORDER_PASSWORD"),
        )
    {
        let http = order_sync::HttpClient::with_session(&config, channel.session().clone())?;
        http.login(&user, &password).await.context("login failed")?;
    }

    let view = channel.role_view(role);
    let mut subscription = view.subscribe();
    let mut expired_notice = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            update = subscription.changed() => {
                let Some(update) = update else { break };
                let staleness = subscription.staleness();
                tracing::info!(
                    orders = update.len(),
                    revision = update.revision,
                    push = staleness.push_connected,
                    failures = staleness.consecutive_failures,
                    age_secs = staleness.age().map(|a| a.num_seconds()),
                    "Board updated"
                );
                if staleness.session_expired && !expired_notice {
                    tracing::error!("Session expired; restart with a fresh ORDER_API_TOKEN");
                }
                expired_notice = staleness.session_expired;
                for card in view.cards(&update) {
                    tracing::info!(
                        order_id = card.order_id,
                        table = ?card.table_number,
                        status = card.display.label,
                        urgent = card.display.urgent,
                        items = card.item_count,
                        waiting_mins = shared::util::minutes_since(card.created_at),
                        total = card.total,
                        actions = ?card.actions,
                        "  card"
                    );
                }
            }
        }
    }

    drop(subscription);
    channel.shutdown();
    Ok(())
}
