//! # Cache Module
//!
//! Expiring caches for the session core.
//!
//! The only consumer today is the track-ident cache: when a sound is played, the
//! canonical URI Lavalink resolved for it is mapped back to the application
//! ident that was requested. Lavalink push events only carry the opaque track id,
//! so this mapping is how playback events are reported with the sound's ident.
//!
//! Entries live for the track length plus a grace period. A miss means the
//! track was either never started by this process or finished long ago, and the
//! push event is dropped.
//!
//! ```rust,no_run
//! use open_soundboard::cache::TrackIdentCache;
//! use std::time::Duration;
//!
//! # fn example() {
//! let cache = TrackIdentCache::new();
//! cache.insert("http://host:6969/file/bark".into(), "bark".into(), Duration::from_secs(32));
//! assert_eq!(cache.get(&"http://host:6969/file/bark".to_string()).as_deref(), Some("bark"));
//! # }
//! ```

pub mod timed_cache;

pub use timed_cache::TimedCache;

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Canonical backend track URI -> application sound ident.
pub type TrackIdentCache = TimedCache<String, String>;

impl TrackIdentCache {
    /// Removes expired entries and logs how many were dropped.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }
}

/// Spawns the periodic sweep of `cache`, stopped by `shutdown`.
pub fn spawn_cleanup(
    cache: TrackIdentCache,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // El primer tick es inmediato
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => cache.cleanup_old_entries(),
                _ = shutdown.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_sweeps_expired_entries() {
        let cache = TrackIdentCache::new();
        cache.insert("u1".into(), "bark".into(), Duration::from_secs(1));
        let shutdown = CancellationToken::new();
        let task = spawn_cleanup(cache.clone(), Duration::from_secs(10), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert!(cache.is_empty());

        shutdown.cancel();
        task.await.unwrap();
    }
}
