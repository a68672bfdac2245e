// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Notification delivery with a single delayed retry.
//!
//! A rejected notification is replayed exactly once after a fixed delay.
//! The retry re-enters the core through its own event queue, is never
//! cancelled, and a second rejection is dropped. The engine only holds a
//! weak handle to that queue, so it never keeps the queue open on its own.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::bluetooth::protocol::Message;
use crate::bluetooth::RadioStack;
use crate::events::PeripheralEvent;
use crate::session::CentralId;

/// What happened to a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the radio on the first attempt.
    Sent,
    /// Rejected; one retry is scheduled.
    RetryScheduled,
}

/// An encoded notification waiting for its retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub payload: Vec<u8>,
    pub recipients: Vec<CentralId>,
}

/// Pushes responses to subscribed centrals.
pub struct NotificationDelivery {
    characteristic: Uuid,
    retry_delay: Duration,
    event_tx: mpsc::WeakSender<PeripheralEvent>,
}

impl NotificationDelivery {
    pub fn new(
        characteristic: Uuid,
        retry_delay: Duration,
        event_tx: &mpsc::Sender<PeripheralEvent>,
    ) -> Self {
        Self {
            characteristic,
            retry_delay,
            event_tx: event_tx.downgrade(),
        }
    }

    /// Send a response to the recipients.
    pub fn deliver<R: RadioStack + ?Sized>(
        &self,
        radio: &R,
        response: &Message,
        recipients: &[CentralId],
    ) -> DeliveryOutcome {
        let payload = response.encode();
        debug!(
            "Notifying {} to {} central(s): {}",
            response.kind(),
            recipients.len(),
            hex::encode(&payload)
        );

        if radio.notify(self.characteristic, &payload, recipients) {
            return DeliveryOutcome::Sent;
        }

        debug!(
            "{} rejected by radio, retrying in {:?}",
            response.kind(),
            self.retry_delay
        );
        self.schedule_retry(PendingNotification {
            payload,
            recipients: recipients.to_vec(),
        });
        DeliveryOutcome::RetryScheduled
    }

    /// Replay a rejected notification once. Returns whether it was accepted.
    pub fn retry<R: RadioStack + ?Sized>(&self, radio: &R, pending: &PendingNotification) -> bool {
        let accepted = radio.notify(self.characteristic, &pending.payload, &pending.recipients);
        if accepted {
            debug!("Retried notification accepted");
        } else {
            warn!(
                "Retried notification rejected again, dropping {} bytes",
                pending.payload.len()
            );
        }
        accepted
    }

    fn schedule_retry(&self, pending: PendingNotification) {
        let event_tx = self.event_tx.clone();
        let delay = self.retry_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(event_tx) = event_tx.upgrade() else {
                debug!("Event queue closed, retry dropped");
                return;
            };
            if event_tx
                .send(PeripheralEvent::RetryNotification(pending))
                .await
                .is_err()
            {
                error!("Event queue closed, retry dropped");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Radio that answers `notify` from a script and records every call.
    struct ScriptedRadio {
        answers: Mutex<VecDeque<bool>>,
        calls: Arc<Mutex<Vec<(Vec<u8>, Vec<CentralId>)>>>,
    }

    impl ScriptedRadio {
        fn new(answers: &[bool]) -> (Self, Arc<Mutex<Vec<(Vec<u8>, Vec<CentralId>)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let radio = Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                calls: calls.clone(),
            };
            (radio, calls)
        }
    }

    impl RadioStack for ScriptedRadio {
        fn advertise(&mut self, _service_uuid: Uuid, _local_name: &str) {}

        fn stop_advertising(&mut self) {}

        fn notify(&self, _characteristic: Uuid, payload: &[u8], recipients: &[CentralId]) -> bool {
            self.calls.lock().push((payload.to_vec(), recipients.to_vec()));
            self.answers.lock().pop_front().unwrap_or(true)
        }
    }

    fn engine() -> (
        NotificationDelivery,
        mpsc::Sender<PeripheralEvent>,
        mpsc::Receiver<PeripheralEvent>,
    ) {
        let (tx, rx) = mpsc::channel(8);
        let delivery = NotificationDelivery::new(Uuid::nil(), Duration::from_millis(100), &tx);
        (delivery, tx, rx)
    }

    #[tokio::test]
    async fn test_accepted_first_time() {
        let (delivery, _tx, mut rx) = engine();
        let (radio, calls) = ScriptedRadio::new(&[true]);
        let to = vec![CentralId::new("A")];

        let outcome = delivery.deliver(&radio, &Message::EchoResponse(b"hi".to_vec()), &to);

        assert_eq!(outcome, DeliveryOutcome::Sent);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(calls.lock()[0].0, vec![0x81, 0x02, b'h', b'i']);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_once() {
        let (delivery, _tx, mut rx) = engine();
        let (radio, calls) = ScriptedRadio::new(&[false, true]);
        let to = vec![CentralId::new("A")];
        let response = Message::EchoResponse(b"hello".to_vec());

        let started = tokio::time::Instant::now();
        assert_eq!(
            delivery.deliver(&radio, &response, &to),
            DeliveryOutcome::RetryScheduled
        );

        let pending = match rx.recv().await {
            Some(PeripheralEvent::RetryNotification(pending)) => pending,
            other => panic!("unexpected event: {:?}", other),
        };
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(pending.payload, response.encode());
        assert_eq!(pending.recipients, to);

        assert!(delivery.retry(&radio, &pending));
        {
            let calls = calls.lock();
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[0], calls[1]);
        }

        // Nothing further is scheduled
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rejection_dropped() {
        let (delivery, _tx, mut rx) = engine();
        let (radio, calls) = ScriptedRadio::new(&[false, false]);
        let to = vec![CentralId::new("A")];

        delivery.deliver(&radio, &Message::VersionRequest, &to);
        let pending = match rx.recv().await {
            Some(PeripheralEvent::RetryNotification(pending)) => pending,
            other => panic!("unexpected event: {:?}", other),
        };

        assert!(!delivery.retry(&radio, &pending));
        assert_eq!(calls.lock().len(), 2);

        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_does_not_hold_queue_open() {
        let (delivery, tx, mut rx) = engine();
        let (radio, calls) = ScriptedRadio::new(&[false]);

        delivery.deliver(&radio, &Message::VersionRequest, &[CentralId::new("A")]);
        drop(tx);

        // The pending retry finds the queue closed and is dropped
        assert_eq!(rx.recv().await, None);
        assert_eq!(calls.lock().len(), 1);
    }
}
