//! # Runtime Flows
//!
//! `easybus` commands driven through [`BusRuntime`] with configurations as
//! an operator would write them.

#[cfg(test)]
mod tests {
    use crate::mock_backend::MockBackend;
    use bus_runtime::{BusRuntime, ParticipantConfig, RuntimeConfig, TransportKind};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn email_config(name: &str, address: &str, mailbox: &Path) -> RuntimeConfig {
        let text = format!(
            r#"
transport = "email"

[participant]
name = "{name}"
email = "{address}"

[email]
email_address = "{address}"
mailbox_dir = '{}'
max_message_size = 400
check_interval_ms = 20
"#,
            mailbox.display()
        );
        let config = RuntimeConfig::from_toml(&text).unwrap();
        config.check().unwrap();
        config
    }

    fn easybackend_config(backend: &MockBackend, user: &str, name: &str) -> RuntimeConfig {
        RuntimeConfig {
            transport: TransportKind::Easybackend,
            participant: ParticipantConfig {
                name: name.into(),
                email: format!("{user}@example.org"),
            },
            bus: None,
            easybackend: Some(backend.settings(user, &format!("{user}-pw"))),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_send_and_listen_over_email_config() {
        let mailbox = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let alice = BusRuntime::connect(&email_config("Alice", "alice@example.org", mailbox.path()))
            .await
            .unwrap();
        let bob = BusRuntime::connect(&email_config("Bob", "bob@example.org", mailbox.path()))
            .await
            .unwrap();
        assert_eq!(bob.bus().config().poll_interval_ms, 20);

        let input = TempDir::new().unwrap();
        let share = input.path().join("share.bin");
        std::fs::write(&share, vec![3u8; 1500]).unwrap();
        alice
            .send_file("study_round1", bob.participant().clone(), &share)
            .await
            .unwrap();

        let received = timeout(
            Duration::from_secs(5),
            bob.listen(
                &["study_round1".to_string()],
                Some(output.path()),
                Some(1),
                std::future::pending(),
            ),
        )
        .await
        .expect("timeout waiting for message")
        .unwrap();
        assert_eq!(received, 1);

        let written: Vec<_> = std::fs::read_dir(output.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(written.len(), 1);
        assert_eq!(std::fs::read(&written[0]).unwrap(), vec![3u8; 1500]);
    }

    #[tokio::test]
    async fn test_easybackend_runtime_against_mock() {
        let backend = MockBackend::start().await.unwrap();
        backend.add_user("alice", "alice-pw", "alice@example.org");
        backend.add_user("bob", "bob-pw", "bob@example.org");

        let alice = BusRuntime::connect(&easybackend_config(&backend, "alice", "Alice"))
            .await
            .unwrap();
        let bob = BusRuntime::connect(&easybackend_config(&backend, "bob", "Bob"))
            .await
            .unwrap();

        alice
            .send_payload("study_round0", bob.participant().clone(), b"invite".to_vec())
            .await
            .unwrap();
        let initial = bob.initial_messages().await.unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].message.message.payload(), b"invite");
        assert_eq!(
            initial[0].message.message.sender(),
            Some(alice.participant())
        );

        alice
            .send_payload("study_round1", bob.participant().clone(), b"share".to_vec())
            .await
            .unwrap();
        bob.purge().await.unwrap();
        assert_eq!(backend.stored(), 0);
    }

    #[tokio::test]
    async fn test_runtime_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bus.toml");
        std::fs::write(
            &path,
            r#"
transport = "local"

[participant]
name = "Carol"
email = "carol@example.org"
"#,
        )
        .unwrap();

        let config = RuntimeConfig::load(&path).unwrap();
        let runtime = BusRuntime::connect(&config).await.unwrap();
        assert_eq!(runtime.participant().identifier(), "carol@example.org");
        assert!(runtime.initial_messages().await.unwrap().is_empty());
        runtime.shutdown().await;
    }
}
