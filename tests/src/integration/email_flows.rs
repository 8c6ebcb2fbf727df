//! # Bus Flows over a Mailbox Directory
//!
//! Participants open their own [`DirectoryMailStore`] handle on one directory,
//! which plays the role of the mail server.

#[cfg(test)]
mod tests {
    use eb_02_email::{DirectoryMailStore, EmailSettings, EmailTransport, MailStore};
    use shared_bus::{
        Bus, BusConfig, InitialMessageManager, MessageFilter, MessageListener, TransportAdapter,
    };
    use shared_types::{Message, Participant, Scope};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn participant(name: &str) -> Participant {
        Participant::email(name, format!("{}@example.org", name.to_lowercase())).unwrap()
    }

    async fn mailbox(dir: &Path) -> Arc<dyn MailStore> {
        Arc::new(DirectoryMailStore::open(dir).await.unwrap())
    }

    async fn transport(dir: &Path, who: &Participant) -> Arc<dyn TransportAdapter> {
        let settings = EmailSettings::new(who.identifier());
        Arc::new(EmailTransport::new(&settings, mailbox(dir).await).unwrap())
    }

    fn config() -> BusConfig {
        BusConfig {
            poll_interval_ms: 20,
            max_message_size: 300,
            ..BusConfig::default()
        }
    }

    struct Collector(mpsc::UnboundedSender<Message>);

    impl MessageListener for Collector {
        fn receive(&self, message: Message) {
            let _ = self.0.send(message);
        }
    }

    // =========================================================================
    // FLOWS
    // =========================================================================

    #[tokio::test]
    async fn test_fragmented_exchange_through_mailbox() {
        let dir = TempDir::new().unwrap();
        let alice = participant("Alice");
        let bob = participant("Bob");
        let sender = Bus::new(config(), transport(dir.path(), &alice).await).unwrap();
        let receiver = Bus::new(config(), transport(dir.path(), &bob).await).unwrap();
        let scope = Scope::new("study_round1");

        let payload: Vec<u8> = (0..2_000u32).map(|i| (i % 199) as u8).collect();
        sender
            .send(
                Message::new(payload.clone()).with_sender(alice.clone()),
                scope.clone(),
                bob.clone(),
            )
            .unwrap()
            .await
            .unwrap();

        let store = mailbox(dir.path()).await;
        let stored = store.list().await.unwrap();
        assert!(stored.len() > 1, "payload should travel in several mails");
        assert!(stored.iter().all(|mail| mail.recipient == "bob@example.org"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        receiver.receive(scope, bob, Arc::new(Collector(tx)));
        receiver.start().unwrap();

        let received = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for message")
            .unwrap();
        assert_eq!(received.payload(), payload.as_slice());
        assert_eq!(received.sender(), Some(&alice));

        receiver.stop().await;
        assert!(
            store.list().await.unwrap().is_empty(),
            "delivered mails must be expunged"
        );
    }

    #[tokio::test]
    async fn test_other_participant_mail_untouched() {
        let dir = TempDir::new().unwrap();
        let alice = participant("Alice");
        let bob = participant("Bob");
        let carol = participant("Carol");
        let sender = Bus::new(config(), transport(dir.path(), &alice).await).unwrap();
        let scope = Scope::new("study_round1");

        for receiver in [&bob, &carol] {
            sender
                .send(Message::new(b"share".to_vec()), scope.clone(), receiver.clone())
                .unwrap()
                .await
                .unwrap();
        }

        let bob_bus = Bus::new(config(), transport(dir.path(), &bob).await).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bob_bus.receive(scope, bob, Arc::new(Collector(tx)));
        bob_bus.start().unwrap();
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for message")
            .unwrap();
        bob_bus.stop().await;

        let left = mailbox(dir.path()).await.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].recipient, "carol@example.org");
    }

    #[tokio::test]
    async fn test_initial_message_over_mailbox() {
        let dir = TempDir::new().unwrap();
        let alice = participant("Alice");
        let bob = participant("Bob");
        let sender = Bus::new(config(), transport(dir.path(), &alice).await).unwrap();
        sender
            .send(
                Message::new(b"invitation".to_vec()).with_sender(alice),
                Scope::new("study_round0"),
                bob.clone(),
            )
            .unwrap()
            .await
            .unwrap();

        let manager = InitialMessageManager::new(
            transport(dir.path(), &bob).await,
            bob,
            config().max_message_size,
            Duration::from_millis(20),
        );
        let messages = manager.retrieve_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.message.payload(), b"invitation");
        assert_eq!(messages[0].message.scope.name(), "study_round0");

        let receipts = messages[0].receipts.len();
        assert_eq!(manager.delete(&messages[0]).await, receipts);
        assert!(manager.retrieve_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_clears_tagged_mail() {
        let dir = TempDir::new().unwrap();
        let alice = participant("Alice");
        let bob = participant("Bob");
        let alice_bus = Bus::new(config(), transport(dir.path(), &alice).await).unwrap();
        alice_bus
            .send(Message::new(b"x".to_vec()), Scope::new("s_round1"), bob)
            .unwrap()
            .await
            .unwrap();

        alice_bus.purge(&MessageFilter::all()).await.unwrap();
        assert!(mailbox(dir.path()).await.list().await.unwrap().is_empty());
    }
}
