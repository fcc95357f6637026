//! Change notifications for the attendance database.
//!
//! The feed watches the database file from its own connection. `SQLite`'s
//! data version tells it when any other connection, including one in another
//! process, has committed; it then reports the commit only if the attendance
//! table changed. Class, student and teacher edits are not reported.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::Storage;

/// Sent once per observed change to the attendance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceChanged {
    /// The data version after the change.
    pub data_version: i64,
    /// Attendance records now stored.
    pub records: i64,
    /// When the change was noticed.
    pub observed_at: DateTime<Local>,
}

/// A running change feed.
///
/// Dropping the feed stops the polling task.
#[derive(Debug)]
pub struct ChangeFeed {
    path: PathBuf,
    rx: mpsc::Receiver<AttendanceChanged>,
    task: JoinHandle<()>,
}

impl ChangeFeed {
    /// Start polling the database at `path` every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or its initial data
    /// version cannot be read.
    pub fn spawn(path: impl AsRef<Path>, interval: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let storage = Storage::open(&path)?;
        let baseline = Baseline {
            data_version: storage.data_version()?,
            marker: storage.attendance_marker()?,
        };
        let (tx, rx) = mpsc::channel(16);

        debug!(
            "Watching {} every {:?} from data version {}",
            path.display(),
            interval,
            baseline.data_version
        );
        let task = tokio::spawn(poll(storage, baseline, interval, tx));

        Ok(Self { path, rx, task })
    }

    /// The watched database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next change. Returns `None` once the feed has stopped.
    pub async fn changed(&mut self) -> Option<AttendanceChanged> {
        self.rx.recv().await
    }

    /// Stop polling.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Last state seen by the polling task.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    data_version: i64,
    marker: (i64, i64),
}

async fn poll(
    storage: Storage,
    mut last: Baseline,
    interval: Duration,
    tx: mpsc::Sender<AttendanceChanged>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let current = match storage.data_version() {
            Ok(version) => version,
            Err(e) => {
                warn!("Change feed stopped: {}", e);
                break;
            }
        };
        if current == last.data_version {
            continue;
        }
        last.data_version = current;

        let marker = match storage.attendance_marker() {
            Ok(marker) => marker,
            Err(e) => {
                warn!("Change feed stopped: {}", e);
                break;
            }
        };
        if marker == last.marker {
            debug!("Commit at data version {} left attendance unchanged", current);
            continue;
        }
        last.marker = marker;

        let event = AttendanceChanged {
            data_version: current,
            records: marker.0,
            observed_at: Local::now(),
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}
