//! Iteration pacing and the reentrancy guard around `iterate()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;

use super::manager::AvSession;
use super::registry::CallRegistry;
use crate::config::AvConfig;

#[derive(Debug, Default)]
pub(crate) struct IterationScheduler {
    iterating: AtomicBool,
}

impl IterationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an iteration as running. Returns `None` if one already is; the
    /// flag is cleared when the returned guard drops.
    pub fn enter(&self) -> Option<scopeguard::ScopeGuard<(), impl FnOnce(()) + '_>> {
        if self.iterating.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(scopeguard::guard((), |_| {
            self.iterating.store(false, Ordering::SeqCst);
        }))
    }
}

/// How long to wait before the next `iterate()`.
///
/// The shortest frame period among streams that are actually flowing, or the
/// idle interval when nothing is.
pub(crate) fn interval_for(registry: &CallRegistry, config: &AvConfig) -> Duration {
    let mut interval_ms: Option<u64> = None;
    for session in registry.iter() {
        if session.state.sends_audio() {
            interval_ms = Some(interval_ms.map_or(config.audio_interval_ms, |ms| {
                ms.min(config.audio_interval_ms)
            }));
        }
        if session.state.sends_video() {
            interval_ms = Some(interval_ms.map_or(config.video_interval_ms, |ms| {
                ms.min(config.video_interval_ms)
            }));
        }
    }
    interval_ms.map_or_else(|| config.idle_interval(), Duration::from_millis)
}

/// Run `iterate()` on the session at the pace it asks for until `shutdown`
/// flips to true or its sender is dropped.
pub async fn drive(session: Arc<AvSession>, mut shutdown: watch::Receiver<bool>) {
    info!("AV iteration loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let interval = session.iterate();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!("Shutdown sender dropped");
                    break;
                }
            }
        }
    }
    info!("AV iteration loop stopped");
}
