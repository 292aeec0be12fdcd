use crate::core::types::FarmEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::broadcast;

// ---------- Topic trait (broadcast semantics) ----------
#[async_trait::async_trait]
pub trait Topic<T>: Sync + Send + 'static {
    /// Publish a message to all subscribers.
    async fn publish(&self, msg: T) -> Result<()>;

    /// Subscribe to the stream (each subscriber has an independent cursor).
    fn subscribe(&self) -> broadcast::Receiver<Arc<T>>;
}

// ---------- Concrete broadcast topic ----------
// 1->N fanout, lossy under lag.
pub struct BroadcastTopic<T: Clone + Send + Sync + 'static> {
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Clone + Send + Sync + 'static> BroadcastTopic<T> {
    pub fn with_capacity(cap: usize) -> Self {
        let (tx, _rx) = broadcast::channel(cap);
        Self { tx }
    }
}

#[async_trait]
impl<T: Debug + Clone + Send + Sync + 'static> Topic<T> for BroadcastTopic<T> {
    async fn publish(&self, msg: T) -> Result<()> {
        // No receivers is not an error: notifications are fire-and-forget.
        let _ = self.tx.send(Arc::new(msg));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

#[derive(Clone)]
pub struct Bus {
    pub farm_events: Arc<dyn Topic<FarmEvent>>,
}

impl Bus {
    pub fn new() -> Self {
        let cap = 256;

        Self {
            farm_events: Arc::new(BroadcastTopic::<FarmEvent>::with_capacity(cap)),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FarmEventKind;

    #[tokio::test]
    async fn test_publish_fans_out() {
        let bus = Bus::new();
        let mut a = bus.farm_events.subscribe();
        let mut b = bus.farm_events.subscribe();

        let ev = FarmEvent::new(
            "acc",
            FarmEventKind::CatalogFetchFailed {
                error: "boom".to_string(),
            },
        );
        bus.farm_events.publish(ev.clone()).await.unwrap();

        assert_eq!(*a.recv().await.unwrap(), ev);
        assert_eq!(*b.recv().await.unwrap(), ev);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = Bus::new();
        let ev = FarmEvent::new(
            "acc",
            FarmEventKind::BalanceTooLow {
                balance: 1,
                best_card: None,
            },
        );
        assert!(bus.farm_events.publish(ev).await.is_ok());
    }
}
