// Integration tests for the control server

use procward::config::{ControlEndpoint, ProcessConfig};
use procward::error::SupervisorError;
use procward::ipc::{Command, Controller, IpcClient, IpcServer, ResponseData};
use procward::process::{Manager, Status};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::Span;

fn sleeper(name: &str) -> ProcessConfig {
    let mut config = ProcessConfig::new("/bin/sleep");
    config.name = name.to_string();
    config.args = vec!["30".to_string()];
    config
}

async fn request(
    client: &Arc<IpcClient>,
    command: Command,
) -> procward::error::Result<ResponseData> {
    let client = Arc::clone(client);
    tokio::task::spawn_blocking(move || client.request(command))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unix_socket_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = temp_dir.path().join("procward.sock");
    let endpoint = ControlEndpoint::Unix(socket_path.clone());

    let manager = Arc::new(Manager::new(
        vec![sleeper("alpha"), sleeper("beta")],
        Span::none(),
    ));
    let server = IpcServer::bind(&endpoint, Controller::new(Arc::clone(&manager)))
        .await
        .unwrap();
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    let client = Arc::new(IpcClient::new(endpoint));

    match request(&client, Command::Status { target: String::new() })
        .await
        .unwrap()
    {
        ResponseData::ProcessList(list) => {
            let names: Vec<&str> = list.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, vec!["alpha", "beta"]);
            assert!(list.iter().all(|p| p.status == Status::Stopped));
        }
        other => panic!("Expected ProcessList, got {:?}", other),
    }

    let started = request(
        &client,
        Command::Start {
            target: "alpha".to_string(),
        },
    )
    .await
    .unwrap();
    // The supervision loop may already have launched the child
    assert!(matches!(
        started,
        ResponseData::State(Status::Standby | Status::Running)
    ));

    let mut rx = manager.get("alpha").unwrap().subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == Status::Running))
        .await
        .unwrap()
        .unwrap();

    let stopped = request(
        &client,
        Command::Stop {
            target: "alpha".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(stopped, ResponseData::State(Status::Stopped));

    shutdown.cancel();
    server_task.await.unwrap().unwrap();
    assert!(!socket_path.exists());

    manager.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_target_error_travels_to_client() {
    let temp_dir = TempDir::new().unwrap();
    let endpoint = ControlEndpoint::Unix(temp_dir.path().join("procward.sock"));

    let manager = Arc::new(Manager::new(vec![sleeper("only")], Span::none()));
    let server = IpcServer::bind(&endpoint, Controller::new(Arc::clone(&manager)))
        .await
        .unwrap();
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    let client = Arc::new(IpcClient::new(endpoint));
    let err = request(
        &client,
        Command::Status {
            target: "missing".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "unknown proc name: missing");

    shutdown.cancel();
    server_task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tcp_round_trip() {
    let manager = Arc::new(Manager::new(vec![sleeper("net")], Span::none()));
    let server = IpcServer::bind(
        &ControlEndpoint::Tcp("127.0.0.1:0".to_string()),
        Controller::new(Arc::clone(&manager)),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    let client = Arc::new(IpcClient::connect_uri(&format!("tcp://{}", addr)).unwrap());
    let data = request(&client, Command::Status { target: "net".to_string() })
        .await
        .unwrap();
    match data {
        ResponseData::ProcessList(list) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].name, "net");
        }
        other => panic!("Expected ProcessList, got {:?}", other),
    }

    shutdown.cancel();
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_reports_daemon_not_running() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(IpcClient::new(ControlEndpoint::Unix(
        temp_dir.path().join("nobody.sock"),
    )));

    let err = request(&client, Command::Status { target: String::new() })
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::DaemonNotRunning));
}
