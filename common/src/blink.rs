use std::{
    sync::mpsc::{self, Receiver, SyncSender, TrySendError},
    thread,
    time::Duration,
};

use log::{debug, info};

use crate::outputs::LedHandle;

/// Non-blocking producer side of the blink queue.
#[derive(Clone)]
pub struct BlinkSender {
    tx: SyncSender<u8>,
}

pub struct BlinkReceiver {
    rx: Receiver<u8>,
}

pub fn blink_channel(capacity: usize) -> (BlinkSender, BlinkReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (BlinkSender { tx }, BlinkReceiver { rx })
}

impl BlinkSender {
    /// Queues `times` blinks. Drops the request when the queue is full.
    pub fn request(&self, times: u8) -> bool {
        match self.tx.try_send(times) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("blink queue full; dropping request for {times} blinks");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("blink worker not running; dropping request for {times} blinks");
                false
            }
        }
    }
}

impl BlinkReceiver {
    pub fn try_next(&self) -> Option<u8> {
        self.rx.try_recv().ok()
    }
}

/// Drains blink requests until every sender has been dropped.
pub fn run_blink_worker(led: LedHandle, receiver: BlinkReceiver, interval: Duration) {
    while let Ok(times) = receiver.rx.recv() {
        info!("blink: start, times={times}");
        for _ in 0..times {
            led.on();
            thread::sleep(interval);
            led.off();
            thread::sleep(interval);
        }
        info!("blink: end");
    }
    debug!("blink queue closed; worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingLed;

    #[test]
    fn full_queue_drops_new_requests() {
        let (sender, receiver) = blink_channel(2);

        assert!(sender.request(2));
        assert!(sender.request(3));
        assert!(!sender.request(4));

        assert_eq!(receiver.try_next(), Some(2));
        assert_eq!(receiver.try_next(), Some(3));
        assert_eq!(receiver.try_next(), None);
    }

    #[test]
    fn request_without_worker_is_dropped() {
        let (sender, receiver) = blink_channel(4);
        drop(receiver);

        assert!(!sender.request(2));
    }

    #[test]
    fn worker_toggles_led_per_request() {
        let led = RecordingLed::default();
        let (sender, receiver) = blink_channel(4);
        sender.request(2);
        sender.request(1);
        drop(sender);

        run_blink_worker(LedHandle::new(led.clone()), receiver, Duration::ZERO);

        assert_eq!(led.edges(), vec![true, false, true, false, true, false]);
    }
}
