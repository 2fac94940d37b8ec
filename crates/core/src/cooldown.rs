//! Healthy-position cooldown table.
//!
//! Maps a candidate id to the unix-millisecond time it last reverted as
//! "position is healthy". Entries older than the window are pruned on
//! every read.

use crate::error::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Key-value store behind the cooldown table.
pub trait CooldownStore: Send + Sync + Debug {
    /// Live entries at `now_ms`; expired ones are dropped.
    fn load(&self, now_ms: u64) -> Result<HashMap<String, u64>>;

    fn record(&self, candidate_id: &str, now_ms: u64) -> Result<()>;

    fn window(&self) -> Duration;

    /// Time left on `candidate_id`'s cooldown, if any.
    fn remaining(&self, entries: &HashMap<String, u64>, candidate_id: &str, now_ms: u64) -> Option<Duration> {
        let seen = *entries.get(candidate_id)?;
        let elapsed = now_ms.saturating_sub(seen);
        let window = self.window().as_millis() as u64;
        (window > 0 && elapsed <= window).then(|| Duration::from_millis(window - elapsed))
    }
}

fn is_live(seen_ms: u64, now_ms: u64, window: Duration) -> bool {
    let window_ms = window.as_millis() as u64;
    window_ms > 0 && now_ms.saturating_sub(seen_ms) <= window_ms
}

/// In-process store for tests and single-run use.
#[derive(Debug)]
pub struct InMemoryCooldownStore {
    entries: DashMap<String, u64>,
    window: Duration,
}

impl InMemoryCooldownStore {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CooldownStore for InMemoryCooldownStore {
    fn load(&self, now_ms: u64) -> Result<HashMap<String, u64>> {
        self.entries.retain(|_, seen| is_live(*seen, now_ms, self.window));
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect())
    }

    fn record(&self, candidate_id: &str, now_ms: u64) -> Result<()> {
        self.entries.insert(candidate_id.to_string(), now_ms);
        Ok(())
    }

    fn window(&self) -> Duration {
        self.window
    }
}

/// JSON-file store (`{ "<candidateId>": <unix ms>, ... }`).
///
/// A missing or unreadable file is an empty table. Writes go through a temp
/// file and a rename.
#[derive(Debug)]
pub struct FileCooldownStore {
    path: PathBuf,
    window: Duration,
    lock: Mutex<()>,
}

impl FileCooldownStore {
    pub fn new(path: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            path: path.into(),
            window,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw(&self) -> HashMap<String, u64> {
        let body = match std::fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cooldown table unreadable; treating as empty");
                return HashMap::new();
            }
        };
        if body.trim().is_empty() {
            return HashMap::new();
        }
        match serde_json::from_str::<HashMap<String, serde_json::Value>>(&body) {
            Ok(raw) => raw
                .into_iter()
                .filter_map(|(k, v)| v.as_f64().filter(|n| n.is_finite() && *n >= 0.0).map(|n| (k, n as u64)))
                .collect(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cooldown table malformed; treating as empty");
                HashMap::new()
            }
        }
    }

    fn write_raw(&self, entries: &HashMap<String, u64>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CooldownStore for FileCooldownStore {
    fn load(&self, now_ms: u64) -> Result<HashMap<String, u64>> {
        if self.window.is_zero() {
            return Ok(HashMap::new());
        }
        let _guard = self.lock.lock();
        let raw = self.read_raw();
        let before = raw.len();
        let live: HashMap<String, u64> = raw
            .into_iter()
            .filter(|(_, seen)| is_live(*seen, now_ms, self.window))
            .collect();
        if live.len() != before {
            debug!(pruned = before - live.len(), live = live.len(), "Cooldown table pruned");
            self.write_raw(&live)?;
        }
        Ok(live)
    }

    fn record(&self, candidate_id: &str, now_ms: u64) -> Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_raw();
        entries.insert(candidate_id.to_string(), now_ms);
        self.write_raw(&entries)
    }

    fn window(&self) -> Duration {
        self.window
    }
}
