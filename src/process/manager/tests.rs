use super::*;
use std::time::Duration;

fn create_test_config(name: &str, script: &str) -> ProcessConfig {
    let mut config = ProcessConfig::new("/bin/sh");
    config.name = name.to_string();
    config.args = vec!["-c".to_string(), script.to_string()];
    config.interval_ms = 0;
    config.stop_timeout_secs = 2;
    config
}

fn sleeper(name: &str) -> ProcessConfig {
    create_test_config(name, "exec sleep 30")
}

async fn wait_for_status(manager: &Manager, name: &str, wanted: Status) {
    let mut rx = manager.get(name).unwrap().subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {} to be {}", name, wanted))
        .unwrap();
}

fn is_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[test]
fn test_load_preserves_order() {
    let manager = Manager::new(
        vec![sleeper("a"), sleeper("b"), sleeper("c")],
        Span::none(),
    );
    assert_eq!(manager.names(), &["a", "b", "c"]);

    let all = manager.status("").unwrap();
    let names: Vec<&str> = all.iter().map(|info| info.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(all.iter().all(|info| info.status == Status::Stopped));
}

#[test]
fn test_duplicate_name_keeps_first() {
    let mut second = sleeper("dup");
    second.description = "second".to_string();
    let mut first = sleeper("dup");
    first.description = "first".to_string();

    let manager = Manager::new(vec![first, sleeper("other"), second], Span::none());
    assert_eq!(manager.names(), &["dup", "other"]);
    assert_eq!(manager.get("dup").unwrap().config().description, "first");
}

#[test]
fn test_status_single_and_unknown() {
    let manager = Manager::new(vec![sleeper("a"), sleeper("b")], Span::none());

    let one = manager.status("b").unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].name, "b");

    let err = manager.status("missing").unwrap_err();
    assert_eq!(err.to_string(), "unknown proc name: missing");
}

#[tokio::test]
async fn test_unknown_target_for_mutations() {
    let manager = Manager::new(vec![sleeper("a")], Span::none());

    assert!(matches!(
        manager.start("nope"),
        Err(SupervisorError::UnknownProcess(_))
    ));
    assert!(matches!(
        manager.stop("nope").await,
        Err(SupervisorError::UnknownProcess(_))
    ));
    assert!(matches!(
        manager.run("nope"),
        Err(SupervisorError::UnknownProcess(_))
    ));
    assert_eq!(manager.get("a").unwrap().status(), Status::Stopped);
}

#[tokio::test]
async fn test_start_all_and_stop_all() {
    let manager = Manager::new(
        vec![sleeper("a"), sleeper("b"), sleeper("c")],
        Span::none(),
    );
    manager.start_all();

    let mut pids = Vec::new();
    for name in ["a", "b", "c"] {
        wait_for_status(&manager, name, Status::Running).await;
        pids.push(manager.get(name).unwrap().info().pid.unwrap());
    }

    tokio::time::timeout(Duration::from_secs(10), manager.stop_all())
        .await
        .expect("stop_all did not return");

    for info in manager.status("").unwrap() {
        assert_eq!(info.status, Status::Stopped);
        assert!(info.pid.is_none());
    }
    for pid in pids {
        assert!(!is_alive(pid));
    }
}

#[tokio::test]
async fn test_stop_all_is_idempotent() {
    let manager = Manager::new(vec![sleeper("a")], Span::none());
    manager.start_all();
    wait_for_status(&manager, "a", Status::Running).await;

    manager.stop_all().await;
    manager.stop_all().await;
    assert_eq!(manager.get("a").unwrap().status(), Status::Stopped);
}

#[tokio::test]
async fn test_stop_all_catches_process_in_backoff() {
    let mut flaky = create_test_config("flaky", "sleep 0.2; exit 1");
    flaky.retry = 100;
    flaky.interval_ms = 300;

    let manager = Manager::new(vec![flaky], Span::none());
    manager.start_all();
    wait_for_status(&manager, "flaky", Status::RetryWait).await;

    tokio::time::timeout(Duration::from_secs(10), manager.stop_all())
        .await
        .expect("stop_all did not return");

    let info = &manager.status("flaky").unwrap()[0];
    assert_eq!(info.status, Status::Stopped);
    assert!(info.pid.is_none());
}

#[tokio::test]
async fn test_stop_all_after_natural_exit() {
    let manager = Manager::new(vec![create_test_config("once", "exit 0")], Span::none());
    manager.start_all();
    wait_for_status(&manager, "once", Status::Stopped).await;

    manager.stop_all().await;
    assert_eq!(manager.get("once").unwrap().status(), Status::Stopped);
}

#[tokio::test]
async fn test_control_start_and_stop() {
    let manager = Manager::new(vec![sleeper("svc")], Span::none());

    let status = manager.start("svc").unwrap();
    assert_eq!(status, Status::Standby);
    wait_for_status(&manager, "svc", Status::Running).await;

    // A second start is absorbed by the supervisor's own guard
    assert_eq!(manager.start("svc").unwrap(), Status::Running);

    let status = manager.stop("svc").await.unwrap();
    assert_eq!(status, Status::Stopped);

    // Stop on a stopped process changes nothing
    assert_eq!(manager.stop("svc").await.unwrap(), Status::Stopped);

    manager.stop_all().await;
}

#[tokio::test]
async fn test_restart_after_stop_all() {
    let manager = Manager::new(vec![sleeper("svc")], Span::none());

    for _ in 0..2 {
        manager.start_all();
        wait_for_status(&manager, "svc", Status::Running).await;
        manager.stop_all().await;
        assert_eq!(manager.get("svc").unwrap().status(), Status::Stopped);
    }
}

#[test]
fn test_from_config_set() {
    let config = ConfigSet {
        procs: vec![sleeper("x"), sleeper("y")],
        ..ConfigSet::default()
    };
    let manager = Manager::from_config_set(&config, Span::none());
    assert_eq!(manager.names(), &["x", "y"]);
}
