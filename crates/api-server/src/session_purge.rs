use std::time::Duration;

use chrono::Utc;
use shared::sessions::FileSessionStore;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

/// Deletes expired session files every `interval`. The first sweep runs immediately.
pub fn spawn(sessions: FileSessionStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            sweep(&sessions).await;
        }
    })
}

async fn sweep(sessions: &FileSessionStore) {
    match sessions.purge_expired(Utc::now()).await {
        Ok(0) => {}
        Ok(removed) => info!(
            removed,
            dir = %sessions.dir().display(),
            metric_name = "session_purge",
            "purged expired sessions"
        ),
        Err(err) => error!("failed to purge expired sessions: {err}"),
    }
}
