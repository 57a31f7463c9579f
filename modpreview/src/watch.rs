//! Periodic reloads of one preview target

use chrono::{DateTime, Utc};
use modpreview_loader::{LoadResult, Loader, SessionSlot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Same bundle as the previous round
    Reused,
    Recomputed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchReport {
    pub round: usize,
    pub at: DateTime<Utc>,
    pub outcome: Outcome,
    pub dependencies: usize,
    pub warnings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reload `loader` every `interval`, each round in a new session that
/// supersedes the previous one. Stops after `rounds` rounds if given.
/// Only the first round honours `force`.
pub async fn watch<L, F>(
    loader: &L,
    slot: &SessionSlot,
    interval: Duration,
    rounds: Option<usize>,
    force: bool,
    mut report: F,
) where
    L: Loader,
    F: FnMut(WatchReport),
{
    let mut previous: Option<Arc<LoadResult<L::Output>>> = None;
    let mut round = 0;

    loop {
        let session = slot.begin(force && round == 0);
        let result = loader.load(&session).await;

        let entry = match result {
            Ok(bundle) => {
                let reused = previous.as_ref().is_some_and(|p| Arc::ptr_eq(p, &bundle));
                let entry = WatchReport {
                    round,
                    at: Utc::now(),
                    outcome: if reused { Outcome::Reused } else { Outcome::Recomputed },
                    dependencies: bundle.dependencies.len(),
                    warnings: bundle.warnings.len(),
                    error: None,
                };
                previous = Some(bundle);
                entry
            }
            Err(e) => {
                warn!("{} failed in round {}: {}", loader.label(), round, e);
                WatchReport {
                    round,
                    at: Utc::now(),
                    outcome: Outcome::Failed,
                    dependencies: 0,
                    warnings: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        info!("{} round {}: {:?}", loader.label(), round, entry.outcome);
        report(entry);

        round += 1;
        if rounds.is_some_and(|limit| round >= limit) {
            break;
        }
        tokio::time::sleep(interval).await;
    }
}
