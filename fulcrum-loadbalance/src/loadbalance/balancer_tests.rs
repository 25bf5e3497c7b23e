#[cfg(test)]
mod tests {
    use crate::loadbalance::balancer::*;
    use crate::loadbalance::policy::RoundRobinPolicy;
    use crate::loadbalance::probe::{AlwaysAliveProbe, FixedProbe, HealthProbe};
    use crate::loadbalance::process::ProcessPoolStrategy;
    use crate::loadbalance::strategy::{SequentialStrategy, ThreadPoolStrategy};
    use async_trait::async_trait;
    use fulcrum_core::{
        BalancerError, DiscoveryError, DiscoveryFailurePolicy, Server, ServerSource,
        StaticServerSource,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// 可以切换为失败的服务器来源
    struct FlakySource {
        servers: Vec<Server>,
        failing: AtomicBool,
        resolves: AtomicUsize,
    }

    impl FlakySource {
        fn new(ports: &[u16]) -> Self {
            Self {
                servers: ports.iter().map(|&p| Server::new("127.0.0.1", p)).collect(),
                failing: AtomicBool::new(false),
                resolves: AtomicUsize::new(0),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ServerSource for FlakySource {
        async fn resolve(&self) -> Result<Vec<Server>, DiscoveryError> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(DiscoveryError::Unavailable("catalog down".to_string()));
            }
            Ok(self.servers.clone())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// 每次解析在两组服务器之间切换：
    /// A 组 3 个服务器（端口 10..12，全部可达），B 组 5 个服务器（端口 21..25，奇数端口可达）
    struct FlippingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ServerSource for FlippingSource {
        async fn resolve(&self) -> Result<Vec<Server>, DiscoveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let ports: Vec<u16> = if call % 2 == 0 {
                vec![10, 11, 12]
            } else {
                vec![21, 22, 23, 24, 25]
            };
            Ok(ports.into_iter().map(|p| Server::new("127.0.0.1", p)).collect())
        }

        fn name(&self) -> &str {
            "flipping"
        }
    }

    /// A 组全部可达，B 组只有奇数端口可达
    struct GroupProbe;

    #[async_trait]
    impl HealthProbe for GroupProbe {
        async fn is_alive(&self, server: &Server) -> bool {
            tokio::task::yield_now().await;
            server.port < 20 || server.port % 2 == 1
        }

        fn name(&self) -> &str {
            "group"
        }
    }

    /// 只有指定端口可达
    struct PortProbe {
        alive_ports: Vec<u16>,
    }

    #[async_trait]
    impl HealthProbe for PortProbe {
        async fn is_alive(&self, server: &Server) -> bool {
            self.alive_ports.contains(&server.port)
        }

        fn name(&self) -> &str {
            "port"
        }
    }

    fn create_test_source() -> Arc<StaticServerSource> {
        Arc::new(StaticServerSource::from_addresses([
            "127.0.0.1",
            "127.0.0.2",
            "127.0.0.3",
        ]))
    }

    #[tokio::test]
    async fn test_uninitialized_balancer_has_no_servers() {
        let balancer = Balancer::builder(create_test_source())
            .probe_on_start(false)
            .build()
            .await
            .unwrap();

        assert_eq!(balancer.state(), BalancerState::Uninitialized);
        assert!(balancer.servers().is_empty());
        assert!(matches!(
            balancer.choose(),
            Err(BalancerError::NoServerAvailable)
        ));

        balancer.refresh().await.unwrap();
        assert_eq!(balancer.state(), BalancerState::Ready);
        assert!(balancer.choose().is_ok());
    }

    #[tokio::test]
    async fn test_probe_on_start_populates_snapshot() {
        let balancer = Balancer::new(
            create_test_source(),
            Arc::new(AlwaysAliveProbe),
            Arc::new(SequentialStrategy),
            Arc::new(RoundRobinPolicy::new()),
            true,
        )
        .await
        .unwrap();

        assert_eq!(balancer.state(), BalancerState::Ready);
        let servers = balancer.servers();
        assert_eq!(servers.len(), 3);
        assert!(servers.iter().all(|s| s.is_probed() && s.is_alive()));

        let stats = balancer.stats();
        assert_eq!(stats.total_servers, 3);
        assert_eq!(stats.alive_servers, 3);
        assert_eq!(stats.refresh_count, 1);
        assert!(stats.last_refresh_at.is_some());
        assert!(balancer.last_probe_duration().is_some());
    }

    #[tokio::test]
    async fn test_equal_choice_through_balancer() {
        let balancer = Balancer::builder(create_test_source())
            .build()
            .await
            .unwrap();

        let mut stats = std::collections::HashMap::new();
        for _ in 0..3000 {
            *stats.entry(balancer.choose().unwrap()).or_insert(0) += 1;
        }

        assert_eq!(stats.len(), 3);
        assert!(stats.values().all(|&count| count == 1000));
    }

    #[tokio::test]
    async fn test_no_servers_reachable() {
        let balancer = Balancer::builder(create_test_source())
            .probe(Arc::new(FixedProbe::new(false, Duration::ZERO)))
            .build()
            .await
            .unwrap();

        assert_eq!(balancer.servers().len(), 3);
        assert!(balancer.alive_servers().is_empty());
        assert!(matches!(
            balancer.choose(),
            Err(BalancerError::NoServerAvailable)
        ));
    }

    #[tokio::test]
    async fn test_only_alive_servers_are_chosen() {
        let source = Arc::new(FlakySource::new(&[1, 2, 3]));
        let balancer = Balancer::builder(source.clone())
            .probe(Arc::new(PortProbe {
                alive_ports: vec![2],
            }))
            .build()
            .await
            .unwrap();

        assert_eq!(balancer.snapshot().alive_count(), 1);
        for _ in 0..5 {
            assert_eq!(balancer.choose().unwrap().port, 2);
        }
    }

    #[tokio::test]
    async fn test_discovery_failure_retains_stale_snapshot() {
        let source = Arc::new(FlakySource::new(&[1, 2]));
        let balancer = Balancer::builder(source.clone())
            .discovery_failure(DiscoveryFailurePolicy::RetainStale)
            .build()
            .await
            .unwrap();
        let before = balancer.snapshot();

        source.set_failing(true);
        balancer.refresh().await.unwrap();

        let after = balancer.snapshot();
        assert_eq!(after.generation(), before.generation());
        assert_eq!(after.servers().len(), 2);
        assert!(balancer.choose().is_ok());

        let stats = balancer.stats();
        assert_eq!(stats.discovery_failures, 1);
        assert!(stats
            .last_discovery_error
            .as_deref()
            .unwrap()
            .contains("catalog down"));

        source.set_failing(false);
        balancer.refresh().await.unwrap();
        assert_eq!(balancer.snapshot().generation(), before.generation() + 1);
        assert!(balancer.stats().last_discovery_error.is_none());
    }

    #[tokio::test]
    async fn test_discovery_failure_propagates_when_configured() {
        let source = Arc::new(FlakySource::new(&[1, 2]));
        let balancer = Balancer::builder(source.clone())
            .discovery_failure(DiscoveryFailurePolicy::Propagate)
            .build()
            .await
            .unwrap();

        source.set_failing(true);
        let result = balancer.refresh().await;
        assert!(matches!(result, Err(BalancerError::Discovery(_))));

        // 快照依然保留
        assert_eq!(balancer.servers().len(), 2);
        assert!(balancer.choose().is_ok());
    }

    #[tokio::test]
    async fn test_failed_initial_refresh() {
        let source = Arc::new(FlakySource::new(&[1]));
        source.set_failing(true);

        let stale = Balancer::builder(source.clone()).build().await.unwrap();
        assert_eq!(stale.state(), BalancerState::Uninitialized);
        assert!(matches!(
            stale.choose(),
            Err(BalancerError::NoServerAvailable)
        ));

        let result = Balancer::builder(source)
            .discovery_failure(DiscoveryFailurePolicy::Propagate)
            .build()
            .await;
        assert!(matches!(result, Err(BalancerError::Discovery(_))));
    }

    #[tokio::test]
    async fn test_process_pool_rejects_local_only_probe() {
        let result = Balancer::builder(create_test_source())
            .probe(Arc::new(PortProbe {
                alive_ports: vec![80],
            }))
            .strategy(Arc::new(ProcessPoolStrategy::new("fulcrum-probe-worker")))
            .build()
            .await;

        assert!(matches!(
            result,
            Err(BalancerError::PredicateNotTransferable { .. })
        ));
    }

    #[tokio::test]
    async fn test_policy_cannot_serve_two_balancers() {
        let policy = Arc::new(RoundRobinPolicy::new());

        let first = Balancer::builder(Arc::new(StaticServerSource::from_addresses(["10.0.0.1"])))
            .policy(policy.clone())
            .build()
            .await
            .unwrap();

        let second = Balancer::builder(Arc::new(StaticServerSource::from_addresses(["10.9.9.9"])))
            .policy(policy.clone())
            .build()
            .await;
        assert!(matches!(second, Err(BalancerError::AlreadyBound)));

        // 第一个负载均衡器仍然只从自己的快照中选择
        for _ in 0..3 {
            assert_eq!(first.choose().unwrap().address, "10.0.0.1");
        }
    }

    #[tokio::test]
    async fn test_dynamic_topology_keeps_cursor() {
        let source = Arc::new(FlippingSource {
            calls: AtomicUsize::new(0),
        });
        let balancer = Balancer::builder(source)
            .probe(Arc::new(GroupProbe))
            .build()
            .await
            .unwrap();

        // A 组：10, 11, 12
        assert_eq!(balancer.choose().unwrap().port, 10);
        assert_eq!(balancer.choose().unwrap().port, 11);

        // B 组可达：21, 23, 25；计数器为 2，不随刷新重置
        balancer.refresh().await.unwrap();
        assert_eq!(balancer.servers().len(), 5);
        assert_eq!(balancer.choose().unwrap().port, 25);
        assert_eq!(balancer.choose().unwrap().port, 21);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_and_choose_see_whole_snapshots() {
        let source = Arc::new(FlippingSource {
            calls: AtomicUsize::new(0),
        });
        let balancer = Balancer::builder(source)
            .probe(Arc::new(GroupProbe))
            .strategy(Arc::new(ThreadPoolStrategy::new()))
            .build()
            .await
            .unwrap();

        let stop = Arc::new(AtomicBool::new(false));

        let refresher = {
            let balancer = balancer.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut refreshes = 0;
                while !stop.load(Ordering::SeqCst) {
                    balancer.refresh().await.unwrap();
                    refreshes += 1;
                }
                refreshes
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let balancer = balancer.clone();
                std::thread::spawn(move || {
                    for _ in 0..20_000 {
                        let snapshot = balancer.snapshot();
                        let total = snapshot.servers().len();
                        let alive = snapshot.alive_count();
                        assert!(snapshot.servers().iter().all(|s| s.is_probed()));
                        match total {
                            3 => assert_eq!(alive, 3),
                            5 => assert_eq!(alive, 3),
                            other => panic!("unexpected snapshot size {}", other),
                        }

                        let chosen = balancer.choose().unwrap();
                        assert!(chosen.is_alive());
                        assert!(chosen.port < 20 || chosen.port % 2 == 1);
                    }
                })
            })
            .collect();

        for reader in readers {
            tokio::task::spawn_blocking(move || reader.join().unwrap())
                .await
                .unwrap();
        }
        stop.store(true, Ordering::SeqCst);

        let refreshes = refresher.await.unwrap();
        assert!(refreshes > 0);
    }

    #[tokio::test]
    async fn test_refresh_loop_runs_until_stopped() {
        let source = Arc::new(FlakySource::new(&[1, 2]));
        let balancer = Balancer::builder(source.clone())
            .probe_on_start(false)
            .build()
            .await
            .unwrap();

        let handle = balancer.spawn_refresh_loop(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop().await;

        let refreshes = balancer.stats().refresh_count;
        assert!(refreshes >= 2, "only {} refreshes", refreshes);
        assert_eq!(balancer.state(), BalancerState::Ready);

        // 停止后不再刷新
        let resolves = source.resolves.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(source.resolves.load(Ordering::SeqCst), resolves);
    }

    #[tokio::test]
    async fn test_refresh_loop_survives_discovery_failures() {
        let source = Arc::new(FlakySource::new(&[1]));
        source.set_failing(true);
        let balancer = Balancer::builder(source.clone())
            .probe_on_start(false)
            .discovery_failure(DiscoveryFailurePolicy::Propagate)
            .build()
            .await
            .unwrap();

        let handle = balancer.spawn_refresh_loop(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(100)).await;
        source.set_failing(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        let stats = balancer.stats();
        assert!(stats.discovery_failures >= 1);
        assert!(stats.refresh_count >= 1);
        assert_eq!(balancer.choose().unwrap().port, 1);
    }
}
