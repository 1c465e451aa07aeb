mod support;

use std::collections::BTreeMap;
use std::time::Duration;

use runall::application::orchestrator::{ExitReason, LaunchOutcome, StopOutcome};
use runall::application::SupervisorSettings;
use runall::domain::{DomainError, ServiceState};
use runall::error::{Error, LaunchError};
use runall::port::outbound::process::ProcessExit;
use runall::testkit::config;
use runall::testkit::http::Route;
use runall::testkit::process::ProcessEvent;
use tokio::time::{sleep, Instant};

use support::Harness;

fn spawned_at(harness: &Harness, service: &str) -> Instant {
    harness
        .launcher
        .events()
        .into_iter()
        .find_map(|(at, event)| match event {
            ProcessEvent::Spawned { service: s, .. } if s == service => Some(at),
            _ => None,
        })
        .unwrap_or_else(|| panic!("{service} was never spawned"))
}

#[tokio::test(start_paused = true)]
async fn launches_in_order_and_waits_for_each_gate() {
    let mut harness = Harness::new(
        vec![
            config::service("api", 0),
            config::service("ui", 1),
            config::service("worker", 2),
        ],
        config::settings(),
    );
    harness
        .http
        .route(config::health_url(0), Route::HealthyAfter { failures: 2 });
    harness.http.route(config::health_url(1), Route::ok());
    harness.http.route(config::health_url(2), Route::ok());

    let report = harness.orchestrator.start(&[]).await.unwrap();

    assert_eq!(report.outcome, LaunchOutcome::Completed);
    assert_eq!(harness.launcher.spawn_order(), vec!["api", "ui", "worker"]);
    let names: Vec<_> = report.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["api", "ui", "worker"]);

    // api needs three probes one poll interval apart before ui may spawn.
    let api = spawned_at(&harness, "api");
    let ui = spawned_at(&harness, "ui");
    let worker = spawned_at(&harness, "worker");
    assert!(ui - api >= Duration::from_secs(2));
    assert!(ui - api < Duration::from_secs(3));
    assert!(worker >= ui);
    assert_eq!(harness.http.call_count(&config::health_url(0)), 3);
    assert_eq!(report.services[0].boot_time, ui - api);

    assert!(harness.orchestrator.status().all_healthy());
}

#[tokio::test(start_paused = true)]
async fn health_timeout_blocks_later_services() {
    let mut harness = Harness::new(
        vec![config::service("api", 0), config::service("ui", 1)],
        config::settings(),
    );
    harness.http.route(config::health_url(0), Route::Refuse);

    let started = Instant::now();
    let err = harness.orchestrator.start(&[]).await.unwrap_err();

    match err {
        Error::Launch(LaunchError::HealthTimeout {
            service,
            waited,
            last_error,
        }) => {
            assert_eq!(service, "api");
            assert_eq!(waited, Duration::from_secs(10));
            assert!(last_error.is_some());
        }
        other => panic!("expected health timeout, got {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11));

    assert!(!harness.launcher.was_spawned("ui"));
    // The failed process is still reaped on rollback.
    assert_eq!(harness.launcher.terminate_order(), vec!["api"]);
    assert_eq!(
        harness.orchestrator.status().states(),
        BTreeMap::from([("api".to_string(), ServiceState::Failed)])
    );
}

#[tokio::test(start_paused = true)]
async fn per_service_launch_timeout_overrides_the_default() {
    let mut harness = Harness::new(
        vec![config::service("api", 0).with_launch_timeout(Duration::from_secs(3))],
        config::settings(),
    );

    let started = Instant::now();
    let err = harness.orchestrator.start(&[]).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Launch(LaunchError::HealthTimeout { waited, .. }) if waited == Duration::from_secs(3)
    ));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn stops_in_reverse_launch_order() {
    let mut harness = Harness::all_healthy(&["api", "ui", "worker"], config::settings());
    harness.orchestrator.start(&[]).await.unwrap();

    harness.trigger.trigger();
    let report = harness.orchestrator.supervise().await.unwrap();

    assert_eq!(report.reason, ExitReason::ShutdownRequested);
    assert_eq!(
        harness.launcher.terminate_order(),
        vec!["worker", "ui", "api"]
    );
    let stopped: Vec<_> = report
        .shutdown
        .stopped
        .iter()
        .map(|s| (s.name.as_str(), s.outcome))
        .collect();
    assert_eq!(
        stopped,
        vec![
            ("worker", StopOutcome::Graceful),
            ("ui", StopOutcome::Graceful),
            ("api", StopOutcome::Graceful),
        ]
    );
    assert!(harness
        .orchestrator
        .status()
        .services
        .iter()
        .all(|s| s.state == ServiceState::Stopped));
    assert!(harness.launcher.killed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn service_without_health_url_is_healthy_immediately() {
    let mut harness = Harness::new(
        vec![config::bare_service("worker")],
        config::monitored(Duration::from_secs(5)),
    );

    let report = harness.orchestrator.start(&[]).await.unwrap();
    sleep(Duration::from_secs(30)).await;

    assert_eq!(report.services[0].boot_time, Duration::ZERO);
    assert_eq!(harness.state("worker"), Some(ServiceState::Healthy));
    assert_eq!(harness.http.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn api_and_ui_come_up_with_their_own_health_paths() {
    let api_health = "http://127.0.0.1:8000/health";
    let ui_health = "http://127.0.0.1:8501/_stcore/health";
    let mut harness = Harness::new(
        vec![
            config::bare_service("api")
                .with_health_url(api_health)
                .with_export("base_url", "http://127.0.0.1:8000"),
            config::bare_service("ui").with_health_url(ui_health),
        ],
        config::settings(),
    );
    harness.http.route(api_health, Route::ok());
    harness
        .http
        .route(ui_health, Route::HealthyAfter { failures: 4 });

    let report = harness.orchestrator.start(&[]).await.unwrap();

    assert_eq!(report.outcome, LaunchOutcome::Completed);
    assert_eq!(harness.state("api"), Some(ServiceState::Healthy));
    assert_eq!(harness.state("ui"), Some(ServiceState::Healthy));
    assert_eq!(harness.http.call_count(ui_health), 5);

    let targets = harness.orchestrator.broadcast_targets(false);
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].service, "api");
}

#[tokio::test(start_paused = true)]
async fn exports_flow_into_later_services() {
    let harness = Harness::new(
        vec![
            config::service("api", 0),
            config::bare_service("ui")
                .with_env("API_BASE_URL", "${api.base_url}")
                .with_export("lan_url", "http://${lan_ip}:8501"),
        ],
        config::settings(),
    );
    harness.http.route(config::health_url(0), Route::ok());
    let Harness {
        launcher,
        orchestrator,
        ..
    } = harness;
    let mut orchestrator = orchestrator.with_builtins(BTreeMap::from([(
        "lan_ip".to_string(),
        "10.0.0.5".to_string(),
    )]));

    orchestrator.start(&[]).await.unwrap();

    let specs = launcher.specs();
    assert_eq!(specs[1].service, "ui");
    assert_eq!(specs[1].env["API_BASE_URL"], config::base_url(0));
    let status = orchestrator.status();
    assert_eq!(
        status.get("ui").unwrap().exports["lan_url"],
        "http://10.0.0.5:8501"
    );
}

#[tokio::test(start_paused = true)]
async fn stubborn_process_is_killed_after_the_grace_period() {
    let mut harness = Harness::all_healthy(&["api", "ui"], config::settings());
    harness.launcher.ignore_terminate("ui");
    harness
        .launcher
        .slow_terminate("api", Duration::from_millis(500));
    harness.orchestrator.start(&[]).await.unwrap();

    let started = Instant::now();
    let report = harness.orchestrator.stop().await;

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(harness.launcher.killed(), vec!["ui"]);
    assert_eq!(report.forced().collect::<Vec<_>>(), vec!["ui"]);
    assert_eq!(report.stopped[1].outcome, StopOutcome::Graceful);
    assert_eq!(harness.state("ui"), Some(ServiceState::Stopped));
    assert_eq!(harness.state("api"), Some(ServiceState::Stopped));
    assert_eq!(
        harness.orchestrator.handles()[1].exit(),
        Some(ProcessExit::signal(9))
    );
}

#[tokio::test(start_paused = true)]
async fn stop_twice_is_a_no_op() {
    let mut harness = Harness::all_healthy(&["api"], config::settings());
    harness.orchestrator.start(&[]).await.unwrap();

    assert_eq!(harness.orchestrator.stop().await.stopped.len(), 1);
    assert!(harness.orchestrator.stop().await.stopped.is_empty());
    assert_eq!(harness.launcher.terminate_order(), vec!["api"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_health_wait_cancels_and_tears_down() {
    let mut harness = Harness::new(
        vec![config::service("api", 0), config::service("ui", 1)],
        config::settings(),
    );
    let trigger = harness.trigger.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(3)).await;
        trigger.trigger();
    });

    let started = Instant::now();
    let report = harness.orchestrator.start(&[]).await.unwrap();

    assert_eq!(report.outcome, LaunchOutcome::Cancelled);
    assert!(report.services.is_empty());
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(!harness.launcher.was_spawned("ui"));
    assert_eq!(harness.state("api"), Some(ServiceState::Stopped));
    assert!(harness.orchestrator.status().shutting_down);
}

#[tokio::test(start_paused = true)]
async fn monitor_flips_between_healthy_and_unhealthy() {
    let harness = Harness::all_healthy(&["api"], config::monitored(Duration::from_secs(5)));
    let Harness {
        http,
        trigger,
        mut orchestrator,
        ..
    } = harness;
    orchestrator.start(&[]).await.unwrap();
    let reader = orchestrator.status_reader();

    let checks = async {
        http.route(config::health_url(0), Route::json(503, "down"));
        sleep(Duration::from_secs(6)).await;
        assert_eq!(reader.current().state("api"), Some(ServiceState::Unhealthy));

        http.route(config::health_url(0), Route::ok());
        sleep(Duration::from_secs(5)).await;
        assert_eq!(reader.current().state("api"), Some(ServiceState::Healthy));
        let probe = reader.current().get("api").unwrap().last_probe.clone().unwrap();
        assert!(probe.healthy);

        trigger.trigger();
    };
    let (report, ()) = tokio::join!(orchestrator.supervise(), checks);

    let report = report.unwrap();
    assert_eq!(report.reason, ExitReason::ShutdownRequested);
    assert_eq!(orchestrator.status().state("api"), Some(ServiceState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn unexpected_exit_fails_the_service_and_stops_the_rest() {
    let mut harness = Harness::all_healthy(&["api", "ui"], config::settings());
    harness
        .launcher
        .exit_after("ui", Duration::from_secs(20), ProcessExit::code(1));
    harness.orchestrator.start(&[]).await.unwrap();

    let report = harness.orchestrator.supervise().await.unwrap();

    assert_eq!(
        report.reason,
        ExitReason::ServiceExited {
            service: "ui".into(),
            exit: ProcessExit::code(1),
        }
    );
    assert_eq!(harness.state("ui"), Some(ServiceState::Failed));
    assert_eq!(harness.state("api"), Some(ServiceState::Stopped));
    assert_eq!(harness.launcher.terminate_order(), vec!["api"]);
    assert_eq!(
        harness.orchestrator.status().get("ui").unwrap().exit_code,
        Some(1)
    );
}

#[tokio::test(start_paused = true)]
async fn exit_before_healthy_is_a_launch_failure() {
    let mut harness = Harness::new(
        vec![config::service("api", 0), config::service("ui", 1)],
        config::settings(),
    );
    harness
        .launcher
        .exit_after("api", Duration::from_secs(2), ProcessExit::code(3));

    let err = harness.orchestrator.start(&[]).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Launch(LaunchError::ExitedBeforeHealthy { ref service, exit })
            if service == "api" && exit == ProcessExit::code(3)
    ));
    assert_eq!(harness.state("api"), Some(ServiceState::Failed));
    assert!(!harness.launcher.was_spawned("ui"));
    assert!(harness.launcher.terminate_order().is_empty());
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_rolls_back_started_services() {
    let mut harness = Harness::all_healthy(&["api", "ui", "worker"], config::settings());
    harness.launcher.fail_spawn("ui");

    let err = harness.orchestrator.start(&[]).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Launch(LaunchError::Spawn { ref service, .. }) if service == "ui"
    ));
    assert_eq!(harness.launcher.spawn_order(), vec!["api"]);
    assert_eq!(harness.launcher.terminate_order(), vec!["api"]);
    assert_eq!(harness.state("api"), Some(ServiceState::Stopped));
    assert_eq!(harness.state("ui"), Some(ServiceState::Failed));
    assert_eq!(harness.state("worker"), None);
}

#[tokio::test(start_paused = true)]
async fn start_is_not_reentrant() {
    let mut harness = Harness::all_healthy(&["api"], config::settings());
    assert!(matches!(
        harness.orchestrator.supervise().await,
        Err(Error::InvalidState(_))
    ));

    harness.orchestrator.start(&[]).await.unwrap();
    assert!(matches!(
        harness.orchestrator.start(&[]).await,
        Err(Error::InvalidState(_))
    ));

    harness.orchestrator.stop().await;
    assert!(matches!(
        harness.orchestrator.start(&[]).await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(harness.launcher.spawn_order(), vec!["api"]);
}

#[tokio::test(start_paused = true)]
async fn subset_launches_only_the_named_services() {
    let mut harness = Harness::all_healthy(&["api", "ui"], config::settings());

    let report = harness
        .orchestrator
        .start(&[config::name("api")])
        .await
        .unwrap();

    assert_eq!(report.services.len(), 1);
    assert_eq!(harness.launcher.spawn_order(), vec!["api"]);
    assert_eq!(harness.state("ui"), None);
}

#[tokio::test(start_paused = true)]
async fn unknown_subset_is_rejected_before_spawning() {
    let mut harness = Harness::all_healthy(&["api"], config::settings());

    let err = harness
        .orchestrator
        .start(&[config::name("nope")])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Domain(DomainError::UnknownService(ref name)) if name == "nope"
    ));
    assert!(harness.launcher.spawn_order().is_empty());
}

#[tokio::test(start_paused = true)]
async fn oversized_timings_are_capped_instead_of_overflowing() {
    let settings = SupervisorSettings {
        launch_timeout: Duration::from_secs(u64::MAX),
        monitor_interval: Some(Duration::MAX),
        ..config::settings()
    };
    let mut harness = Harness::new(
        vec![
            config::service("api", 0),
            config::service("ui", 1).with_launch_timeout(Duration::MAX),
        ],
        settings,
    );
    harness
        .http
        .route(config::health_url(0), Route::HealthyAfter { failures: 2 });
    harness.http.route(config::health_url(1), Route::ok());

    let report = harness.orchestrator.start(&[]).await.unwrap();
    assert_eq!(report.outcome, LaunchOutcome::Completed);

    harness.trigger.trigger();
    let report = harness.orchestrator.supervise().await.unwrap();
    assert_eq!(report.reason, ExitReason::ShutdownRequested);
}

#[tokio::test(start_paused = true)]
async fn any_health_url_can_vouch_for_a_service() {
    let fallback = "http://localhost:8000/health";
    let harness = Harness::new(
        vec![config::service("api", 0).with_health_url(fallback)],
        config::monitored(Duration::from_secs(5)),
    );
    harness.http.route(config::health_url(0), Route::Refuse);
    harness.http.route(fallback, Route::ok());
    let Harness {
        http,
        trigger,
        mut orchestrator,
        ..
    } = harness;

    let report = orchestrator.start(&[]).await.unwrap();
    assert_eq!(report.outcome, LaunchOutcome::Completed);
    assert_eq!(report.services[0].boot_time, Duration::ZERO);
    assert_eq!(
        orchestrator.status().get("api").unwrap().health_urls,
        vec![config::health_url(0), fallback.to_string()]
    );
    let reader = orchestrator.status_reader();

    let checks = async {
        sleep(Duration::from_secs(6)).await;
        assert_eq!(reader.current().state("api"), Some(ServiceState::Healthy));
        assert_eq!(http.call_count(fallback), 2);

        http.route(fallback, Route::json(503, "down"));
        sleep(Duration::from_secs(5)).await;
        assert_eq!(reader.current().state("api"), Some(ServiceState::Unhealthy));
        assert_eq!(http.call_count(&config::health_url(0)), 3);

        trigger.trigger();
    };
    let (report, ()) = tokio::join!(orchestrator.supervise(), checks);
    assert_eq!(report.unwrap().reason, ExitReason::ShutdownRequested);
}
