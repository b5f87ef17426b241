//! Bounded landmark queue between the capture thread and the persistence
//! worker.
//!
//! Producers never block: an item offered to a full queue is dropped and
//! counted. The consumer half is not `Clone`, so a queue has exactly one
//! consumer.

use std::time::Duration;

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use ml_core::{LandmarkArray, LandmarkBatch, LandmarkCategory};
use tracing::{debug, warn};

/// One category's landmarks from one frame, as handed to persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueItem {
    pub category: LandmarkCategory,
    pub frame_number: u64,
    pub captured_at: DateTime<Local>,
    pub sets: LandmarkArray,
}

impl QueueItem {
    pub fn from_batch(
        batch: &LandmarkBatch,
        frame_number: u64,
        captured_at: DateTime<Local>,
    ) -> Self {
        Self {
            category: batch.category(),
            frame_number,
            captured_at,
            sets: batch.to_array(),
        }
    }
}

/// Anything the queue can label for logs and metrics.
pub trait Categorized {
    fn category_label(&self) -> &'static str;
}

impl Categorized for QueueItem {
    fn category_label(&self) -> &'static str {
        self.category.label()
    }
}

/// Create a queue holding at most `capacity` items.
pub fn bounded<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        QueueProducer { tx, capacity },
        QueueConsumer {
            rx,
            capacity,
            closed: false,
        },
    )
}

pub struct QueueProducer<T> {
    tx: Sender<T>,
    capacity: usize,
}

impl<T> Clone for QueueProducer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: Categorized> QueueProducer<T> {
    /// Enqueue without blocking. Returns `false` when the item was dropped.
    pub fn offer(&self, item: T) -> bool {
        let category = item.category_label();
        match self.tx.try_send(item) {
            Ok(()) => {
                metrics::gauge!("pipeline_queue_depth").set(self.tx.len() as f64);
                true
            }
            Err(TrySendError::Full(_)) => {
                metrics::counter!("pipeline_queue_dropped_total", "category" => category)
                    .increment(1);
                tracing::info_span!(
                    "queue.drop",
                    category,
                    queue_depth = self.tx.len(),
                    capacity = self.capacity
                )
                .in_scope(|| warn!("landmark queue full; dropping {category} item"));
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                metrics::counter!("pipeline_queue_dropped_total", "category" => category)
                    .increment(1);
                debug!("persistence worker gone; dropping {category} item");
                false
            }
        }
    }
}

impl<T> QueueProducer<T> {
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub struct QueueConsumer<T> {
    rx: Receiver<T>,
    capacity: usize,
    closed: bool,
}

impl<T> QueueConsumer<T> {
    /// Wait up to `timeout` for the next item.
    pub fn take(&mut self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    pub fn try_take(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// True once every producer is gone and the queue has been emptied.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, thread};

    use super::*;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Tagged(u32, u32);

    impl Categorized for Tagged {
        fn category_label(&self) -> &'static str {
            "test"
        }
    }

    #[test]
    fn offering_one_past_capacity_drops_exactly_the_newest() {
        let (tx, mut rx) = bounded(3);
        let accepted: Vec<bool> = (0..4).map(|i| tx.offer(Tagged(0, i))).collect();
        assert_eq!(accepted, [true, true, true, false]);

        let drained: Vec<_> = std::iter::from_fn(|| rx.try_take()).collect();
        assert_eq!(drained, [Tagged(0, 0), Tagged(0, 1), Tagged(0, 2)]);
    }

    #[test]
    fn take_times_out_on_empty_queue_and_reports_closure() {
        let (tx, mut rx) = bounded::<Tagged>(1);
        assert!(rx.take(Duration::from_millis(10)).is_none());
        assert!(!rx.is_closed());

        assert!(tx.offer(Tagged(0, 7)));
        drop(tx);
        assert_eq!(rx.take(Duration::from_millis(10)), Some(Tagged(0, 7)));
        assert!(rx.take(Duration::from_millis(10)).is_none());
        assert!(rx.is_closed());
    }

    #[test]
    fn offer_after_consumer_dropped_returns_false() {
        let (tx, rx) = bounded(2);
        drop(rx);
        assert!(!tx.offer(Tagged(1, 1)));
    }

    #[test]
    fn producers_flooding_never_duplicate_items() {
        let (tx, mut rx) = bounded(16);
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || (0..500).filter(|&i| tx.offer(Tagged(p, i))).count())
            })
            .collect();
        drop(tx);

        let mut seen = HashSet::new();
        while !rx.is_closed() {
            if let Some(item) = rx.take(Duration::from_millis(50)) {
                assert!(seen.insert(item), "item delivered twice");
            }
        }
        let accepted: usize = producers.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(seen.len(), accepted);
    }

    #[test]
    fn queue_item_copies_batch_rows() {
        use ml_core::LandmarkSet;

        let batch = LandmarkBatch::new(
            LandmarkCategory::Hand,
            vec![LandmarkSet::from_rows(&[[0.1, 0.2, 0.3]])],
        );
        let item = QueueItem::from_batch(&batch, 9, Local::now());
        assert_eq!(item.category, LandmarkCategory::Hand);
        assert_eq!(item.frame_number, 9);
        assert_eq!(item.sets, vec![vec![[0.1, 0.2, 0.3]]]);
        assert_eq!(item.category_label(), "hand");
    }
}
