#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use lcpipe::mission::k2::K2;
use lcpipe::models::StampFile;
use lcpipe::{Season, TargetId};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// A 2x2 stamp over `ncads` cadences with a slow linear trend.
///
/// Pixel (1, 1) is dead (NaN in every cadence), so the K2 default aperture
/// keeps three pixels.
pub fn trending_stamp(ncads: usize) -> StampFile {
    let time: Vec<f64> = (0..ncads).map(|i| 2300.0 + i as f64 * 0.02).collect();
    let mut flux = Vec::with_capacity(ncads * 4);
    for i in 0..ncads {
        let trend = 1.0 + 0.01 * i as f64;
        flux.extend_from_slice(&[100.0 * trend, 50.0 * trend, 25.0 * trend, f64::NAN]);
    }
    StampFile {
        time,
        shape: [ncads, 2, 2],
        flux,
        error: vec![0.5; ncads * 4],
        aperture: None,
        season: None,
        magnitude: Some(12.3),
    }
}

/// A K2 archive under `root` holding `stamp` for every id in `season`.
pub fn k2_archive(root: &Path, season: u32, ids: &[u64], stamp: &StampFile) -> K2 {
    let k2 = K2::new(root);
    for id in ids {
        k2.write_stamp(&TargetId::from(*id), Season::new(season), stamp)
            .unwrap();
    }
    k2
}
