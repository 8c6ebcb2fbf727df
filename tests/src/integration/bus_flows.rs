//! # Bus Flows over the Local Exchange
//!
//! Several buses in one process exchanging messages through a shared
//! [`LocalExchange`], the way participants of one study exchange shares.

#[cfg(test)]
mod tests {
    use shared_bus::{
        Bus, BusConfig, BusError, BusState, LocalExchange, LocalTransport, MessageListener,
        TransportAdapter,
    };
    use shared_types::{Message, Participant, Round, Scope};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn participant(name: &str) -> Participant {
        Participant::email(name, format!("{}@example.org", name.to_lowercase())).unwrap()
    }

    fn config(max_message_size: usize) -> BusConfig {
        BusConfig {
            poll_interval_ms: 10,
            max_message_size,
            ..BusConfig::default()
        }
    }

    fn bus(exchange: &Arc<LocalExchange>, max_message_size: usize) -> Bus {
        let transport: Arc<dyn TransportAdapter> =
            Arc::new(LocalTransport::new(Arc::clone(exchange)));
        Bus::new(config(max_message_size), transport).unwrap()
    }

    struct Collector(mpsc::UnboundedSender<Message>);

    impl MessageListener for Collector {
        fn receive(&self, message: Message) {
            let _ = self.0.send(message);
        }
    }

    fn collector() -> (Arc<Collector>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Collector(tx)), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for message")
            .expect("listener channel closed")
    }

    // =========================================================================
    // FLOWS
    // =========================================================================

    /// Every participant sends a share to every other one.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_round_exchange_between_three_participants() {
        let exchange = Arc::new(LocalExchange::new());
        let names = ["Alice", "Bob", "Carol"];
        let scope = Scope::for_round("study-7", Round::First);

        let mut buses = Vec::new();
        let mut inboxes = Vec::new();
        for name in names {
            let bus = bus(&exchange, 1024 * 1024);
            let (listener, rx) = collector();
            bus.receive(scope.clone(), participant(name), listener);
            bus.start().unwrap();
            buses.push(bus);
            inboxes.push(rx);
        }

        for (i, sender) in names.iter().enumerate() {
            for receiver in names.iter().filter(|r| *r != sender) {
                let payload = format!("share {sender}->{receiver}").into_bytes();
                buses[i]
                    .send(
                        Message::new(payload).with_sender(participant(sender)),
                        scope.clone(),
                        participant(receiver),
                    )
                    .unwrap()
                    .await
                    .unwrap();
            }
        }

        for (i, receiver) in names.iter().enumerate() {
            let mut payloads = vec![
                next(&mut inboxes[i]).await.into_payload(),
                next(&mut inboxes[i]).await.into_payload(),
            ];
            payloads.sort();
            let mut expected: Vec<Vec<u8>> = names
                .iter()
                .filter(|s| *s != receiver)
                .map(|s| format!("share {s}->{receiver}").into_bytes())
                .collect();
            expected.sort();
            assert_eq!(payloads, expected);
        }

        for bus in &buses {
            bus.stop().await;
        }
        assert!(exchange.is_empty(), "delivered items must be deleted");
    }

    /// Large payload split into many fragments is reassembled intact.
    #[tokio::test]
    async fn test_fragmented_message_end_to_end() {
        let exchange = Arc::new(LocalExchange::new());
        let sender = bus(&exchange, 256);
        let receiver = bus(&exchange, 256);
        let scope = Scope::new("big_round2");
        let (listener, mut rx) = collector();
        receiver.receive(scope.clone(), participant("Dave"), listener);

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let message = Message::new(payload.clone()).with_reply_id("r-1");
        let id = message.id();
        sender
            .send(message, scope, participant("Dave"))
            .unwrap()
            .await
            .unwrap();
        assert!(exchange.len() > 1, "message should travel as fragments");

        receiver.start().unwrap();
        let received = next(&mut rx).await;
        assert_eq!(received.id(), id);
        assert_eq!(received.reply_id(), Some("r-1"));
        assert_eq!(received.payload(), payload.as_slice());

        receiver.stop().await;
        assert!(exchange.is_empty());
    }

    /// Messages for another scope stay stored.
    #[tokio::test]
    async fn test_unsubscribed_scope_untouched() {
        let exchange = Arc::new(LocalExchange::new());
        let bus = bus(&exchange, 1024);
        let (listener, mut rx) = collector();
        bus.receive(Scope::new("s_round1"), participant("Erin"), listener);

        for scope in ["s_round1", "s_round2"] {
            bus.send(Message::new(b"x".to_vec()), Scope::new(scope), participant("Erin"))
                .unwrap()
                .await
                .unwrap();
        }

        bus.start().unwrap();
        next(&mut rx).await;
        bus.stop().await;
        assert_eq!(exchange.len(), 1);
    }

    /// A listener can stop the bus from inside its callback.
    #[tokio::test]
    async fn test_stop_from_listener() {
        let exchange = Arc::new(LocalExchange::new());
        let bus = Arc::new(bus(&exchange, 1024));
        let scope = Scope::new("s_round1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let stopper = {
            let bus = Arc::downgrade(&bus);
            move |message: Message| {
                if let Some(bus) = bus.upgrade() {
                    bus.request_stop();
                }
                let _ = tx.send(message);
            }
        };
        bus.receive(scope.clone(), participant("Frank"), Arc::new(stopper));

        bus.send(Message::new(b"bye".to_vec()), scope.clone(), participant("Frank"))
            .unwrap()
            .await
            .unwrap();
        bus.start().unwrap();

        next(&mut rx).await;
        assert_eq!(bus.state(), BusState::Stopped);
        assert!(matches!(
            bus.send(Message::new(b"late".to_vec()), scope, participant("Frank")),
            Err(BusError::Stopped)
        ));
        bus.stop().await;
        assert!(!bus.is_alive());
    }
}
