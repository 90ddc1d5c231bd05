//! End-to-end: the controller launches the real `hive-executor` binary and
//! talks to it over WebSocket.

use std::path::PathBuf;

use hive_bridge::supervisor::ProcessState;
use hive_bridge::Session;
use hive_types::{BridgeConfig, ExecutorConfig, HiveError};
use serde_json::json;

fn config() -> BridgeConfig {
    BridgeConfig {
        request_timeout_secs: 10,
        connect_timeout_secs: 10,
        executor: ExecutorConfig {
            program: PathBuf::from(env!("CARGO_BIN_EXE_hive-executor")),
            args: vec!["--ignore-ssl-errors=true".into()],
            env: vec![("RUST_LOG".into(), "info".into())],
        },
        ..BridgeConfig::default()
    }
}

#[tokio::test]
async fn launch_drive_and_exit() {
    let session = Session::launch(&config()).await.unwrap();
    let process = session.process().expect("launched sessions supervise a process");
    assert!(process.is_running());

    let page = session.create_page().await.unwrap();
    assert_eq!(page.open("http://example.com").await.unwrap(), "success");
    assert_eq!(
        page.evaluate("function () { return location.href; }", vec![])
            .await
            .unwrap(),
        json!("http://example.com")
    );

    let dir = tempfile::tempdir().unwrap();
    let shot = dir.path().join("page.png");
    page.render(shot.to_str().unwrap()).await.unwrap();
    assert!(std::fs::metadata(&shot).unwrap().len() > 0);

    session.exit().await.unwrap();
    assert_eq!(process.wait().await, Some(0));
    assert_eq!(process.state(), ProcessState::Exited(Some(0)));
    assert!(!session.is_alive());
}

#[tokio::test]
async fn listen_exits_the_session_when_the_callback_returns() {
    let title = hive_bridge::listen(&config(), |session| async move {
        let page = session.create_page().await?;
        page.set("content", json!("<html><title>Local</title></html>"))
            .await?;
        page.evaluate("function () { return document.title; }", vec![])
            .await
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(title, json!("Local"));
}

#[tokio::test]
async fn executor_that_never_connects_fails_the_launch() {
    let config = BridgeConfig {
        executor: ExecutorConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "exit 3".into()],
            env: Vec::new(),
        },
        ..config()
    };
    let err = Session::launch(&config).await.unwrap_err();
    assert!(matches!(err, HiveError::Spawn(_)), "{err:?}");
}
