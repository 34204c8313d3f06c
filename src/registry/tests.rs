//! Registry Module Tests
//!
//! ## Test Scopes
//! - **Store**: registration rules, upsert/remove semantics, per-name atomicity.
//! - **Health Monitor**: failure counting, eviction threshold, probe timeouts.
//! - **Query Surface**: HTTP routes driven through `RegistryClient`.

#[cfg(test)]
mod tests {
    use crate::config::{HealthConfig, TransportConfig};
    use crate::directory::{Address, Protocol, UserRecord};
    use crate::error::ChatError;
    use crate::registry::client::{DirectoryQuery, RegistryClient};
    use crate::registry::health::{HealthMonitor, HealthProbe, TransportProbe};
    use crate::registry::server;
    use crate::registry::store::{FailureOutcome, RegistryStore};
    use crate::transport::{ChatServer, MessageListener};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn http_address(port: u16) -> Address {
        Address::new(Protocol::Http, "127.0.0.1", port)
    }

    // ============================================================
    // STORE TESTS
    // ============================================================

    #[test]
    fn test_register_then_list_contains_entry_once() {
        let store = RegistryStore::new();
        store.register("alice", http_address(9001)).unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed.get("alice"), Some(&http_address(9001)));
        assert_eq!(listed["alice"].to_string(), "http://127.0.0.1:9001");
    }

    #[test]
    fn test_duplicate_register_fails_and_upsert_replaces() {
        let store = RegistryStore::new();
        store.register("alice", http_address(9001)).unwrap();

        let again = store.register("alice", http_address(9002));
        assert_eq!(again, Err(ChatError::DuplicateName("alice".to_string())));
        assert_eq!(store.get("alice"), Some(http_address(9001)));

        store.upsert("alice", http_address(9002)).unwrap();
        assert_eq!(store.get("alice"), Some(http_address(9002)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_names_are_never_stored() {
        let store = RegistryStore::new();
        store.register("alice", http_address(9001)).unwrap();

        for name in ["Маша", "bad name", "", "semi;colon", "alice!"] {
            assert_eq!(
                store.register(name, http_address(9001)),
                Err(ChatError::InvalidName(name.to_string()))
            );
            assert_eq!(
                store.upsert(name, http_address(9001)),
                Err(ChatError::InvalidName(name.to_string()))
            );
        }

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let store = RegistryStore::new();

        assert!(matches!(
            store.register("alice", http_address(0)),
            Err(ChatError::InvalidAddress(_))
        ));
        assert!(matches!(
            store.upsert("alice", Address::new(Protocol::Udp, "", 3000)),
            Err(ChatError::InvalidAddress(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = RegistryStore::new();
        store.register("alice", http_address(9001)).unwrap();

        assert!(store.remove("alice"));
        assert!(!store.remove("alice"));
        assert!(!store.remove("never-there"));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_upsert_resets_failures() {
        let store = RegistryStore::new();
        let address = http_address(9001);
        store.register("alice", address.clone()).unwrap();

        store.record_failure("alice", &address, 3);
        store.record_failure("alice", &address, 3);
        assert_eq!(store.failure_count("alice"), Some(2));

        store.upsert("alice", address).unwrap();
        assert_eq!(store.failure_count("alice"), Some(0));
    }

    #[test]
    fn test_failure_for_moved_entry_is_stale() {
        let store = RegistryStore::new();
        let old = http_address(9001);
        store.register("alice", old.clone()).unwrap();
        store.upsert("alice", http_address(9002)).unwrap();

        assert_eq!(store.record_failure("alice", &old, 0), FailureOutcome::Stale);
        assert_eq!(store.failure_count("alice"), Some(0));
        assert_eq!(store.record_failure("ghost", &old, 0), FailureOutcome::Stale);
    }

    #[test]
    fn test_failure_counter_evicts_past_threshold() {
        let store = RegistryStore::new();
        let address = http_address(9001);
        store.register("alice", address.clone()).unwrap();

        assert_eq!(store.record_failure("alice", &address, 3), FailureOutcome::Counted(1));
        assert_eq!(store.record_failure("alice", &address, 3), FailureOutcome::Counted(2));
        assert_eq!(store.record_failure("alice", &address, 3), FailureOutcome::Counted(3));
        assert_eq!(store.record_failure("alice", &address, 3), FailureOutcome::Evicted);
        assert!(store.get("alice").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_admits_exactly_one() {
        let store = Arc::new(RegistryStore::new());

        let mut handles = Vec::new();
        for port in 1..=32u16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.register("contested", http_address(port)).is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }

    // ============================================================
    // HEALTH MONITOR TESTS
    // ============================================================

    /// Reports ports in `dead` as down and hangs forever on ports in `hung`.
    #[derive(Default)]
    struct ScriptedProbe {
        dead: Mutex<HashSet<u16>>,
        hung: Mutex<HashSet<u16>>,
    }

    impl ScriptedProbe {
        fn kill(&self, port: u16) {
            self.dead.lock().unwrap().insert(port);
        }

        fn revive(&self, port: u16) {
            self.dead.lock().unwrap().remove(&port);
        }

        fn hang(&self, port: u16) {
            self.hung.lock().unwrap().insert(port);
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, address: &Address) -> anyhow::Result<()> {
            let hung = self.hung.lock().unwrap().contains(&address.port);
            if hung {
                std::future::pending::<()>().await;
            }
            let dead = self.dead.lock().unwrap().contains(&address.port);
            if dead {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    fn quick_health() -> HealthConfig {
        HealthConfig {
            period: Duration::from_millis(20),
            eviction_threshold: 3,
            probe_timeout: Duration::from_millis(100),
            max_concurrent_probes: 8,
        }
    }

    #[tokio::test]
    async fn test_four_failed_rounds_evict() {
        let store = Arc::new(RegistryStore::new());
        store.register("alice", http_address(9001)).unwrap();
        store.register("bob", http_address(9002)).unwrap();

        let probe = Arc::new(ScriptedProbe::default());
        probe.kill(9001);
        let monitor = HealthMonitor::new(store.clone(), probe.clone(), quick_health());

        for round in 1..=3 {
            let report = monitor.check_all().await;
            assert!(report.evicted.is_empty());
            assert_eq!(store.failure_count("alice"), Some(round));
        }

        let report = monitor.check_all().await;
        assert_eq!(report.evicted, vec!["alice".to_string()]);
        assert!(!store.list().contains_key("alice"));
        assert!(store.list().contains_key("bob"));
        assert_eq!(store.failure_count("bob"), Some(0));
    }

    #[tokio::test]
    async fn test_success_after_three_failures_resets_counter() {
        let store = Arc::new(RegistryStore::new());
        store.register("alice", http_address(9001)).unwrap();

        let probe = Arc::new(ScriptedProbe::default());
        probe.kill(9001);
        let monitor = HealthMonitor::new(store.clone(), probe.clone(), quick_health());

        for _ in 0..3 {
            monitor.check_all().await;
        }
        assert_eq!(store.failure_count("alice"), Some(3));

        probe.revive(9001);
        let report = monitor.check_all().await;
        assert_eq!(report.alive, 1);
        assert_eq!(store.failure_count("alice"), Some(0));
        assert!(store.list().contains_key("alice"));
    }

    #[tokio::test]
    async fn test_hanging_probe_does_not_block_round() {
        let store = Arc::new(RegistryStore::new());
        store.register("stuck", http_address(9001)).unwrap();
        store.register("fine", http_address(9002)).unwrap();

        let probe = Arc::new(ScriptedProbe::default());
        probe.hang(9001);
        let monitor = HealthMonitor::new(store.clone(), probe.clone(), quick_health());

        let report = tokio::time::timeout(Duration::from_secs(2), monitor.check_all())
            .await
            .expect("round should finish despite a hanging probe");

        assert_eq!(report.alive, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.failure_count("stuck"), Some(1));
        assert_eq!(store.failure_count("fine"), Some(0));
    }

    #[tokio::test]
    async fn test_background_monitor_evicts_and_stops() {
        let store = Arc::new(RegistryStore::new());
        store.register("ghost", http_address(9001)).unwrap();

        let probe = Arc::new(ScriptedProbe::default());
        probe.kill(9001);
        let task = HealthMonitor::new(store.clone(), probe, quick_health()).spawn();

        for _ in 0..100 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty(), "ghost should have been evicted");

        task.stop().await;
    }

    #[tokio::test]
    async fn test_transport_probe_tracks_real_server() {
        let listener: MessageListener = Arc::new(|_: &str, _: &str| {});
        let mut chat = ChatServer::new(Protocol::Http, "127.0.0.1", 0, listener, &TransportConfig::default());
        let port = chat.start().await.unwrap().port();

        let store = Arc::new(RegistryStore::new());
        store.register("alice", http_address(port)).unwrap();
        store.register("carol", Address::new(Protocol::Udp, "127.0.0.1", 1)).unwrap();

        let probe = Arc::new(TransportProbe::new(reqwest::Client::new(), Duration::from_secs(1)));
        let monitor = HealthMonitor::new(store.clone(), probe, quick_health());

        let report = monitor.check_all().await;
        assert_eq!(report.alive, 2);

        chat.stop().await;
        let report = monitor.check_all().await;
        assert_eq!(report.failed, 1);
        assert_eq!(store.failure_count("alice"), Some(1));
        // Datagram peers cannot be verified and always pass.
        assert_eq!(store.failure_count("carol"), Some(0));
    }

    // ============================================================
    // QUERY SURFACE TESTS
    // ============================================================

    async fn start_registry() -> (crate::background::ServerTask, RegistryClient, Arc<RegistryStore>) {
        let store = Arc::new(RegistryStore::new());
        let task = server::start("127.0.0.1", 0, store.clone()).await.unwrap();
        let client = RegistryClient::new(
            &format!("http://{}", task.local_addr()),
            reqwest::Client::new(),
            Duration::from_secs(2),
        )
        .unwrap();
        (task, client, store)
    }

    #[tokio::test]
    async fn test_registry_routes_round_trip() {
        let (task, client, store) = start_registry().await;

        client.health().await.expect("registry should be alive");

        let alice = UserRecord::new("alice", http_address(9001));
        client.register(&alice).await.unwrap();
        assert_eq!(
            client.register(&alice).await,
            Err(ChatError::DuplicateName("alice".to_string()))
        );

        let listed = DirectoryQuery::list(&client).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed["alice"].to_string(), "http://127.0.0.1:9001");

        client.upsert("alice", &http_address(9009)).await.unwrap();
        assert_eq!(store.get("alice"), Some(http_address(9009)));

        client.unregister("alice").await.unwrap();
        client.unregister("alice").await.unwrap();
        assert!(DirectoryQuery::list(&client).await.unwrap().is_empty());

        task.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_dot_names_round_trip() {
        let (task, client, store) = start_registry().await;

        for name in [".", "..", "a.b"] {
            client
                .register(&UserRecord::new(name, http_address(9001)))
                .await
                .unwrap();

            client.upsert(name, &http_address(9002)).await.unwrap();
            assert_eq!(store.get(name), Some(http_address(9002)), "upsert {:?}", name);

            client.unregister(name).await.unwrap();
            assert_eq!(store.get(name), None, "unregister {:?}", name);
        }

        client.upsert("..", &http_address(9003)).await.unwrap();
        assert_eq!(store.get(".."), Some(http_address(9003)));
        assert_eq!(store.len(), 1);

        task.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_registry_rejects_bad_input() {
        let (task, client, store) = start_registry().await;

        let illegal = UserRecord::new("Маша", http_address(9001));
        assert_eq!(
            client.register(&illegal).await,
            Err(ChatError::InvalidName("Маша".to_string()))
        );
        assert_eq!(
            client.upsert("Маша", &http_address(9001)).await,
            Err(ChatError::InvalidName("Маша".to_string()))
        );
        assert!(matches!(
            client.register(&UserRecord::new("bob", http_address(0))).await,
            Err(ChatError::InvalidAddress(_))
        ));
        assert!(store.is_empty());

        task.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_directory_unavailable() {
        let (task, client, _store) = start_registry().await;
        task.stop(Duration::from_secs(1)).await;

        assert!(matches!(
            DirectoryQuery::list(&client).await,
            Err(ChatError::DirectoryUnavailable(_))
        ));
    }
}
