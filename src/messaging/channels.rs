// Communication channels lock-free

use crate::messaging::notification::Notification;
use ringbuf::{HeapRb, traits::Split};

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::notification::NotificationCategory;
    use ringbuf::traits::{Consumer, Producer};

    #[test]
    fn test_notification_channel_drops_when_full() {
        let (mut tx, mut rx) = create_notification_channel(1);

        let first = Notification::info(NotificationCategory::Playback, "first".to_string());
        let second = Notification::info(NotificationCategory::Playback, "second".to_string());
        assert!(tx.try_push(first).is_ok());
        assert!(tx.try_push(second).is_err());

        let received = rx.try_pop().unwrap();
        assert_eq!(received.message, "first");
        assert!(rx.try_pop().is_none());
    }
}
