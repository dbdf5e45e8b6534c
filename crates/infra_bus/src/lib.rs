use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("topic publisher dropped")]
    Closed,
}

#[derive(Debug)]
pub struct Topic<T> {
    tx: watch::Sender<T>,
}

impl<T> Topic<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Stores `value` and notifies subscribers, unless it equals the current value.
    pub fn publish(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn stream(&self) -> WatchStream<T> {
        WatchStream::new(self.subscribe())
    }

    /// Subscribes to a projection of the slice; wakes only when the projection changes.
    pub fn select<U, F>(&self, selector: F) -> Selection<T, U, F>
    where
        U: Clone + PartialEq,
        F: Fn(&T) -> U,
    {
        Selection::new(self.subscribe(), selector)
    }
}

pub struct Selection<T, U, F> {
    rx: watch::Receiver<T>,
    selector: F,
    last: U,
}

impl<T, U, F> Selection<T, U, F>
where
    U: Clone + PartialEq,
    F: Fn(&T) -> U,
{
    fn new(mut rx: watch::Receiver<T>, selector: F) -> Self {
        let last = selector(&rx.borrow_and_update());
        Self { rx, selector, last }
    }

    pub fn current(&self) -> &U {
        &self.last
    }

    pub async fn changed(&mut self) -> Result<U, BusError> {
        loop {
            self.rx.changed().await.map_err(|_| BusError::Closed)?;
            let next = (self.selector)(&self.rx.borrow_and_update());
            if next != self.last {
                self.last = next.clone();
                return Ok(next);
            }
        }
    }
}

#[derive(Clone)]
pub struct RingBus<T: Clone + Send + Sync + 'static> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> RingBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self { tx }
    }

    /// Returns the number of subscribers reached; publishing with none is not an error.
    pub fn publish(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Slice {
        slot: i64,
        playing: bool,
    }

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let bus = RingBus::new(32);
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(7u64), 1);
        let v = rx.recv().await.expect("recv");
        assert_eq!(v, 7);
    }

    #[test]
    fn ring_bus_tolerates_no_subscribers() {
        let bus = RingBus::new(4);
        assert_eq!(bus.publish("tick"), 0);
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn topic_skips_unchanged_values() {
        let topic = Topic::new(Slice {
            slot: 1,
            playing: true,
        });
        let mut rx = topic.subscribe();
        assert!(!topic.publish(Slice {
            slot: 1,
            playing: true
        }));
        assert!(!rx.has_changed().expect("open"));

        assert!(topic.publish(Slice {
            slot: 2,
            playing: true
        }));
        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow_and_update().slot, 2);
        assert_eq!(topic.current().slot, 2);
    }

    #[tokio::test]
    async fn selection_wakes_only_on_projected_change() {
        let topic = Topic::new(Slice {
            slot: 1,
            playing: true,
        });
        let mut playing = topic.select(|s: &Slice| s.playing);
        assert!(*playing.current());

        topic.publish(Slice {
            slot: 2,
            playing: true,
        });
        topic.publish(Slice {
            slot: 3,
            playing: true,
        });
        let pending = tokio::time::timeout(Duration::from_millis(20), playing.changed()).await;
        assert!(pending.is_err());

        topic.publish(Slice {
            slot: 4,
            playing: false,
        });
        assert_eq!(playing.changed().await, Ok(false));
    }

    #[tokio::test]
    async fn selection_reports_closed_topic() {
        let topic = Topic::new(0u8);
        let mut sel = topic.select(|v: &u8| *v);
        drop(topic);
        assert_eq!(sel.changed().await, Err(BusError::Closed));
    }

    #[tokio::test]
    async fn stream_yields_current_then_updates() {
        let topic = Topic::new(10i64);
        let mut stream = topic.stream();
        assert_eq!(stream.next().await, Some(10));
        topic.publish(11);
        assert_eq!(stream.next().await, Some(11));
    }
}
