use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How long a blocked dequeue waits before rechecking the stop signal.
const STOP_POLL: Duration = Duration::from_millis(10);

/// Creates a connected sender/receiver pair sharing `stop`. Cancelling the
/// token stops the queue from either side.
pub fn handoff<T>(stop: CancellationToken) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = std::sync::mpsc::channel();
    (
        HandoffSender {
            tx,
            stop: stop.clone(),
        },
        HandoffReceiver { rx, stop },
    )
}

pub struct HandoffSender<T> {
    tx: Sender<T>,
    stop: CancellationToken,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            stop: self.stop.clone(),
        }
    }
}

impl<T> HandoffSender<T> {
    /// Appends without blocking. Returns false once the queue is stopped;
    /// the item is dropped.
    pub fn enqueue(&self, item: T) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        self.tx.send(item).is_ok()
    }

    /// Stops the queue and wakes blocked waiters. Idempotent; items already
    /// enqueued stay dequeueable.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

pub struct HandoffReceiver<T> {
    rx: Receiver<T>,
    stop: CancellationToken,
}

impl<T> HandoffReceiver<T> {
    /// Blocks until an item is available or the queue is stopped. Returns
    /// `None` exactly when the queue is stopped and drained.
    pub fn dequeue(&mut self) -> Option<T> {
        loop {
            if self.stop.is_cancelled() {
                return self.rx.try_recv().ok();
            }
            match self.rx.recv_timeout(STOP_POLL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_dequeue(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_dequeue_returns_items_in_order() {
        let (tx, mut rx) = handoff(CancellationToken::new());
        assert!(tx.enqueue(1));
        assert!(tx.enqueue(2));
        assert_eq!(rx.dequeue(), Some(1));
        assert_eq!(rx.dequeue(), Some(2));
    }

    #[test]
    fn test_stop_wakes_blocked_dequeue() {
        let stop = CancellationToken::new();
        let (_tx, mut rx) = handoff::<i32>(stop.clone());
        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop.cancel();
        });
        let started = Instant::now();
        assert_eq!(rx.dequeue(), None);
        assert!(started.elapsed() < Duration::from_secs(2));
        waker.join().unwrap();
    }

    #[test]
    fn test_items_survive_stop_until_drained() {
        let (tx, mut rx) = handoff(CancellationToken::new());
        assert!(tx.enqueue("a"));
        tx.stop();
        assert!(!tx.enqueue("b"));
        assert_eq!(rx.dequeue(), Some("a"));
        assert_eq!(rx.dequeue(), None);
    }

    #[test]
    fn test_try_dequeue_empty_is_none() {
        let (_tx, mut rx) = handoff::<u8>(CancellationToken::new());
        assert_eq!(rx.try_dequeue(), None);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (tx, rx) = handoff::<u8>(CancellationToken::new());
        tx.stop();
        tx.stop();
        rx.stop();
        assert!(tx.is_stopped());
        assert!(rx.is_stopped());
    }
}
