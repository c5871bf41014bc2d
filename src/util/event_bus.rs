use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

/// What happens to a subscriber that falls `capacity` events behind the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Skip the oldest queued events and keep receiving.
    #[default]
    DropOldest,
    /// End the subscription.
    Disconnect,
}

/// Generic in-process publish/subscribe bus.
///
/// Every subscriber owns a queue bounded by `capacity`. Publishing never waits for
/// slow subscribers; a subscriber that overflows its queue is handled according to
/// the bus' [`OverflowPolicy`].
#[derive(Debug)]
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
    policy: OverflowPolicy,
}

impl<T> EventBus<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, OverflowPolicy::default())
    }

    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, policy }
    }

    /// Fans `event` out to every live subscriber and returns how many received it.
    pub fn publish(&self, event: T) -> usize {
        // Sin suscriptores el envío falla, no es un error
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
            policy: self.policy,
        }
    }

    /// Runs `f` for every published event on a dedicated task.
    ///
    /// The loop ends when the returned handle is used to unsubscribe or the bus is
    /// dropped.
    pub fn subscribe_fn<F>(&self, mut f: F) -> Unsubscribe
    where
        F: FnMut(T) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                f(event);
            }
        });
        Unsubscribe { handle }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
    policy: OverflowPolicy,
}

impl<T: Clone> Subscription<T> {
    /// Waits for the next event. `None` once the bus is gone, or after an
    /// overflow under [`OverflowPolicy::Disconnect`].
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => match self.policy {
                    OverflowPolicy::DropOldest => {
                        warn!(skipped, "Suscriptor lento, eventos descartados");
                    }
                    OverflowPolicy::Disconnect => {
                        warn!(skipped, "Suscriptor lento desconectado");
                        return None;
                    }
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

/// Handle returned by [`EventBus::subscribe_fn`].
#[derive(Debug)]
pub struct Unsubscribe {
    handle: JoinHandle<()>,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}
