use dashmap::DashMap;
use std::hash::Hash;
use tokio::sync::watch;

/// Keyed one-shot rendezvous.
///
/// Each key holds at most one pending signal. Registering a key that is already
/// pending joins the existing signal instead of replacing it, so concurrent
/// waiters for the same key are all released by a single
/// [`broadcast_and_remove`](Waiters::broadcast_and_remove).
#[derive(Debug)]
pub struct Waiters<K: Eq + Hash> {
    pending: DashMap<K, watch::Sender<bool>>,
}

impl<K> Waiters<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Registers interest in `key` without waiting yet.
    ///
    /// Register before triggering whatever fires the key, otherwise a fast
    /// confirmation can slip past.
    pub fn register(&self, key: K) -> Waiter {
        let rx = self
            .pending
            .entry(key)
            .or_insert_with(|| watch::channel(false).0)
            .subscribe();
        Waiter { rx }
    }

    /// Like [`register`](Self::register), but the key is forgotten again if the
    /// returned registration is dropped before it fires and nobody else shares it.
    ///
    /// Use this when the wait can be abandoned (a failed request, a timeout) so
    /// no stale signal is left behind for the key.
    pub fn register_scoped(&self, key: K) -> Registration<'_, K> {
        let Waiter { rx } = self.register(key.clone());
        Registration {
            waiters: self,
            key,
            rx,
        }
    }

    /// Forgets `key` without firing it. Any other waiter sharing the key is
    /// released as if it had fired.
    pub fn remove(&self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Waits until `key` is fired. There is no timeout.
    pub async fn create_and_wait(&self, key: K) {
        self.register(key).wait().await;
    }

    /// Releases every waiter of `key` and forgets it. Returns `false` when nobody
    /// was waiting.
    pub fn broadcast_and_remove(&self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some((_, tx)) => {
                tx.send_replace(true);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }
}

impl<K> Default for Waiters<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A registered, not yet fired wait.
#[derive(Debug)]
pub struct Waiter {
    rx: watch::Receiver<bool>,
}

impl Waiter {
    pub async fn wait(mut self) {
        // El sender solo se elimina después de marcar `true`
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

/// A [`Waiter`] that withdraws its key when dropped unfired.
#[derive(Debug)]
pub struct Registration<'a, K>
where
    K: Eq + Hash + Clone,
{
    waiters: &'a Waiters<K>,
    key: K,
    rx: watch::Receiver<bool>,
}

impl<K> Registration<'_, K>
where
    K: Eq + Hash + Clone,
{
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

impl<K> Drop for Registration<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // Nuestro receiver sigue vivo: 1 significa que nadie más espera la clave
        self.waiters
            .pending
            .remove_if(&self.key, |_, tx| tx.receiver_count() <= 1);
    }
}
