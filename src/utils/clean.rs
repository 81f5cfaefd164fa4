use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time;
use tracing::{error, info, warn};

use crate::persist::PersistenceBackend;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned:       usize,
    pub empty_removed: usize,
    pub stale_removed: usize,
    pub failed:        usize,
}

/// Sweep once now, then every `every`.
pub async fn task(disk: Arc<dyn PersistenceBackend>, keep: chrono::Duration, every: Duration) {
    let mut tick = time::interval(every);
    tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        let r = sweep(&*disk, keep, Utc::now()).await;
        info!(
            scanned = r.scanned,
            empty = r.empty_removed,
            stale = r.stale_removed,
            failed = r.failed,
            "room sweep done"
        );
    }
}

/// Delete stored rooms that are empty or whose newest message is older than
/// `keep`. Works on disk only; rooms already in memory stay served from there.
pub async fn sweep(
    disk: &dyn PersistenceBackend,
    keep: chrono::Duration,
    now:  DateTime<Utc>,
) -> SweepReport {
    let mut r = SweepReport::default();
    let rooms = match disk.list_all().await {
        Ok(rooms) => rooms,
        Err(e) => {
            error!(error = %e, "cannot list stored rooms");
            return r;
        }
    };

    for room in rooms {
        r.scanned += 1;
        let log = match disk.load(&room).await {
            Ok(log) => log,
            Err(e) => {
                warn!(room = %room, error = %e, "skipping unreadable room");
                r.failed += 1;
                continue;
            }
        };

        let stale = match log.last() {
            None => false,
            Some(last) => now - last.time > keep,
        };
        if !log.is_empty() && !stale {
            continue;
        }

        if let Err(e) = disk.delete(&room).await {
            warn!(room = %room, error = %e, "failed to delete room file");
            r.failed += 1;
        } else if stale {
            info!(room = %room, "deleted old room file");
            r.stale_removed += 1;
        } else {
            info!(room = %room, "deleted empty room file");
            r.empty_removed += 1;
        }
    }
    r
}
