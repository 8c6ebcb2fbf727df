//! # easybackend Transport against the Mock Server
//!
//! Exercises the HTTP adapter end to end: password grant, bearer tokens,
//! renewal after 401, the 418 duplicate-initial-message conflict, malformed
//! items, purge and initial message browsing.

#[cfg(test)]
mod tests {
    use crate::mock_backend::MockBackend;
    use eb_01_easybackend::EasyBackendTransport;
    use serde_json::json;
    use shared_bus::{
        Bus, BusConfig, BusError, InitialMessageManager, MessageFilter, MessageListener,
        TransportAdapter, TransportError,
    };
    use shared_types::{codec, BusMessage, Message, Participant, Scope, WireUnit};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn alice() -> Participant {
        Participant::email("Alice", "alice@example.org").unwrap()
    }

    fn bob() -> Participant {
        Participant::email("Bob", "bob@example.org").unwrap()
    }

    async fn backend() -> MockBackend {
        let backend = MockBackend::start().await.unwrap();
        backend.add_user("alice", "alice-pw", "alice@example.org");
        backend.add_user("bob", "bob-pw", "bob@example.org");
        backend
    }

    fn transport(backend: &MockBackend, user: &str) -> Arc<EasyBackendTransport> {
        let settings = backend.settings(user, &format!("{user}-pw"));
        Arc::new(EasyBackendTransport::new(&settings).unwrap())
    }

    fn unit(scope: &Scope, receiver: Participant, payload: &[u8]) -> WireUnit {
        WireUnit::Message(BusMessage::new(
            Message::new(payload.to_vec()),
            scope.clone(),
            receiver,
        ))
    }

    struct Collector(mpsc::UnboundedSender<Message>);

    impl MessageListener for Collector {
        fn receive(&self, message: Message) {
            let _ = self.0.send(message);
        }
    }

    // =========================================================================
    // HAPPY PATH
    // =========================================================================

    #[tokio::test]
    async fn test_bus_roundtrip_over_http() {
        let backend = backend().await;
        let config = BusConfig {
            poll_interval_ms: 20,
            max_message_size: 512,
            ..BusConfig::default()
        };
        let alice_bus = Bus::new(config.clone(), transport(&backend, "alice")).unwrap();
        let bob_bus = Bus::new(config, transport(&backend, "bob")).unwrap();
        let scope = Scope::new("study_round1");

        let (tx, mut rx) = mpsc::unbounded_channel();
        bob_bus.receive(scope.clone(), bob(), Arc::new(Collector(tx)));
        bob_bus.start().unwrap();

        let payload = vec![7u8; 4096];
        alice_bus
            .send(
                Message::new(payload.clone()).with_sender(alice()),
                scope,
                bob(),
            )
            .unwrap()
            .await
            .unwrap();
        assert!(backend.stored() > 1, "payload should be fragmented");

        let received = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for message")
            .unwrap();
        assert_eq!(received.payload(), payload.as_slice());
        assert_eq!(received.sender(), Some(&alice()));

        bob_bus.stop().await;
        assert_eq!(backend.stored(), 0, "delivered fragments must be deleted");
    }

    #[tokio::test]
    async fn test_scoped_listing_and_delete() {
        let backend = backend().await;
        let alice_http = transport(&backend, "alice");
        let bob_http = transport(&backend, "bob");
        let scope = Scope::new("s_round1");

        let sent = unit(&scope, bob(), b"share");
        alice_http.send_message(&scope, &bob(), &sent).await.unwrap();

        assert!(alice_http.list_messages(&scope, &alice()).await.unwrap().is_empty());
        let listed = bob_http.list_messages(&scope, &bob()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].unit, sent);

        bob_http.delete_message(&listed[0].receipt).await.unwrap();
        assert_eq!(backend.stored(), 0);
    }

    #[tokio::test]
    async fn test_requests_routed_through_proxy() {
        let backend = backend().await;
        let proxied = |user: &str| {
            let settings = eb_01_easybackend::EasyBackendSettings {
                api_server: "http://backend.invalid".into(),
                proxy: Some(backend.url()),
                ..backend.settings(user, &format!("{user}-pw"))
            };
            EasyBackendTransport::new(&settings).unwrap()
        };
        let alice_http = proxied("alice");
        let bob_http = proxied("bob");
        let scope = Scope::new("s_round1");

        let sent = unit(&scope, bob(), b"via proxy");
        alice_http.send_message(&scope, &bob(), &sent).await.unwrap();
        let listed = bob_http.list_messages(&scope, &bob()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].unit, sent);
    }

    // =========================================================================
    // TOKEN RENEWAL
    // =========================================================================

    #[tokio::test]
    async fn test_expired_token_renewed_once() {
        let backend = backend().await;
        let bob_http = transport(&backend, "bob");
        let scope = Scope::new("s_round1");

        bob_http.list_messages(&scope, &bob()).await.unwrap();
        assert_eq!(backend.token_requests(), 1);

        backend.expire_tokens();
        bob_http.list_messages(&scope, &bob()).await.unwrap();
        assert_eq!(backend.token_requests(), 2);
        assert_eq!(bob_http.tokens().renewal_count(), 1);
    }

    #[tokio::test]
    async fn test_second_401_surfaces() {
        let backend = backend().await;
        let bob_http = transport(&backend, "bob");
        let scope = Scope::new("s_round1");
        bob_http.list_messages(&scope, &bob()).await.unwrap();

        backend.reject_next(2);
        let err = bob_http.list_messages(&scope, &bob()).await.unwrap_err();
        assert_eq!(err, TransportError::Unauthenticated);
        assert_eq!(bob_http.tokens().renewal_count(), 1);

        bob_http.list_messages(&scope, &bob()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_credentials() {
        let backend = backend().await;
        let settings = backend.settings("bob", "wrong");
        let bob_http = EasyBackendTransport::new(&settings).unwrap();

        let err = bob_http
            .list_messages(&Scope::new("s_round1"), &bob())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Auth(_)));
    }

    // =========================================================================
    // DUPLICATE INITIAL MESSAGE
    // =========================================================================

    #[tokio::test]
    async fn test_duplicate_initial_message_is_fatal() {
        let backend = backend().await;
        let alice_http = transport(&backend, "alice");
        let scope = Scope::new("study_round0");

        alice_http
            .send_message(&scope, &bob(), &unit(&scope, bob(), b"invite"))
            .await
            .unwrap();
        let err = alice_http
            .send_message(&scope, &bob(), &unit(&scope, bob(), b"invite again"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::DuplicateInitialMessage { ref scope, ref receiver }
                if scope == "study_round0" && receiver == "bob@example.org"
        ));
        assert!(err.is_fatal());
        assert_eq!(alice_http.tokens().renewal_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_initial_message_fails_send_handle() {
        let backend = backend().await;
        let bus = Bus::new(BusConfig::default(), transport(&backend, "alice")).unwrap();
        let scope = Scope::new("study_round0");

        bus.send(Message::new(b"a".to_vec()), scope.clone(), bob())
            .unwrap()
            .await
            .unwrap();
        let err = bus
            .send(Message::new(b"b".to_vec()), scope, bob())
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::Transport(TransportError::DuplicateInitialMessage { .. })
        ));
        assert!(err.is_fatal());
    }

    // =========================================================================
    // MALFORMED ITEMS & PURGE
    // =========================================================================

    #[tokio::test]
    async fn test_malformed_items_skipped() {
        let backend = backend().await;
        let bob_http = transport(&backend, "bob");
        let scope = Scope::new("s_round1");
        let valid = unit(&scope, bob(), b"ok");

        backend.inject_item("s_round1", "bob@example.org", json!({ "id": 900 }));
        backend.inject_item(
            "s_round1",
            "bob@example.org",
            json!({ "content": codec::encode_unit(&valid).unwrap() }),
        );
        backend.inject_item(
            "s_round1",
            "bob@example.org",
            json!({ "id": 901, "content": "%%% not base64 %%%" }),
        );
        backend.inject_item(
            "s_round1",
            "bob@example.org",
            json!({ "id": 902, "content": codec::encode_unit(&valid).unwrap() }),
        );

        let listed = bob_http.list_messages(&scope, &bob()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].unit, valid);
        assert_eq!(listed[0].receipt.as_str(), "902");
    }

    #[tokio::test]
    async fn test_purge_removes_own_messages() {
        let backend = backend().await;
        let alice_http = transport(&backend, "alice");
        let bob_http = transport(&backend, "bob");
        for scope in ["s_round1", "s_round2"] {
            let scope = Scope::new(scope);
            alice_http
                .send_message(&scope, &bob(), &unit(&scope, bob(), b"x"))
                .await
                .unwrap();
        }
        let scope = Scope::new("s_round1");
        bob_http.send_message(&scope, &alice(), &unit(&scope, alice(), b"y"))
            .await
            .unwrap();

        bob_http.purge(&MessageFilter::all()).await.unwrap();
        assert_eq!(backend.stored(), 1);
        assert_eq!(alice_http.list_messages(&scope, &alice()).await.unwrap().len(), 1);
    }

    // =========================================================================
    // INITIAL MESSAGES
    // =========================================================================

    #[tokio::test]
    async fn test_browse_and_confirm_initial_message() {
        let backend = backend().await;
        let alice_http = transport(&backend, "alice");
        let bob_http = transport(&backend, "bob");
        let initial = Scope::new("study_round0");
        alice_http
            .send_message(&initial, &bob(), &unit(&initial, bob(), b"invite"))
            .await
            .unwrap();
        let round1 = Scope::new("study_round1");
        alice_http
            .send_message(&round1, &bob(), &unit(&round1, bob(), b"share"))
            .await
            .unwrap();

        let manager = InitialMessageManager::new(bob_http, bob(), 1024, Duration::from_millis(50));
        let messages = manager.retrieve_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.message.payload(), b"invite");

        // Browsing does not consume
        assert_eq!(manager.retrieve_messages().await.unwrap().len(), 1);
        assert_eq!(backend.stored(), 2);

        assert_eq!(manager.delete(&messages[0]).await, 1);
        assert!(manager.retrieve_messages().await.unwrap().is_empty());
        assert_eq!(backend.stored(), 1);
    }
}
