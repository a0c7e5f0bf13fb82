//! Journey log: aggregate movement counters that outlive a single walk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Counters as stored on disk, or taken from a live log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JourneyStats {
    pub fixes_processed: u64,
    pub messages_emitted: u64,
    /// Distance over all walks, in millimeters
    pub distance_mm: u64,
    /// Walk that last wrote the counters
    #[serde(default)]
    pub last_walk: Option<Uuid>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JourneyStats {
    pub fn lifetime_distance_m(&self) -> f64 {
        self.distance_mm as f64 / 1000.0
    }

    /// Read stored counters. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Live counters for the current walk, continuing from the stored ones.
#[derive(Debug)]
pub struct JourneyLog {
    fixes_processed: AtomicU64,
    messages_emitted: AtomicU64,
    distance_mm: AtomicU64,
    walk_id: Uuid,
    started_at: DateTime<Utc>,
    path: Option<PathBuf>,
}

/// Journey log shared between the daemon worker and the CLI.
pub type SharedJourneyLog = Arc<JourneyLog>;

impl JourneyLog {
    /// In-memory log starting from zero.
    pub fn new() -> Self {
        Self::continuing(JourneyStats::default(), None)
    }

    /// Log backed by `path`. An unreadable file is logged and starts over.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let previous = match JourneyStats::load(&path) {
            Ok(stats) => stats.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable journey log"
                );
                JourneyStats::default()
            }
        };
        Self::continuing(previous, Some(path))
    }

    fn continuing(previous: JourneyStats, path: Option<PathBuf>) -> Self {
        Self {
            fixes_processed: AtomicU64::new(previous.fixes_processed),
            messages_emitted: AtomicU64::new(previous.messages_emitted),
            distance_mm: AtomicU64::new(previous.distance_mm),
            walk_id: Uuid::new_v4(),
            started_at: Utc::now(),
            path,
        }
    }

    pub fn record_fix(&self) {
        self.fixes_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a measured displacement. Negative or non-finite values are ignored.
    pub fn record_distance(&self, meters: f64) {
        if meters.is_finite() && meters > 0.0 {
            let mm = (meters * 1000.0).round() as u64;
            self.distance_mm.fetch_add(mm, Ordering::Relaxed);
        }
    }

    pub fn walk_id(&self) -> Uuid {
        self.walk_id
    }

    pub fn stats(&self) -> JourneyStats {
        JourneyStats {
            fixes_processed: self.fixes_processed.load(Ordering::Relaxed),
            messages_emitted: self.messages_emitted.load(Ordering::Relaxed),
            distance_mm: self.distance_mm.load(Ordering::Relaxed),
            last_walk: Some(self.walk_id),
            updated_at: Some(Utc::now()),
        }
    }

    pub fn summary(&self) -> String {
        let stats = self.stats();
        let walked_secs = (Utc::now() - self.started_at).num_seconds().max(0);
        format!(
            "Journey Statistics:\n\
             - Fixes processed: {}\n\
             - Messages emitted: {}\n\
             - Lifetime distance: {:.1} km\n\
             - This walk: {} seconds",
            stats.fixes_processed,
            stats.messages_emitted,
            stats.lifetime_distance_m() / 1000.0,
            walked_secs
        )
    }

    /// Write the counters, replacing the stored file atomically.
    ///
    /// Does nothing for an in-memory log.
    pub fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.stats()).map_err(io::Error::other)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)
    }
}

impl Default for JourneyLog {
    fn default() -> Self {
        Self::new()
    }
}
