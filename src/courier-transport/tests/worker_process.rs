//! Drives a real child process: a small shell script speaking the protocol.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use courier_core::WorkerConfig;
use courier_transport::{AnalysisClient, CallError, Consumer, RequestError};
use serde_json::json;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

const WORKER_SCRIPT: &str = r#"
echo '{"event":"server.connected","params":{"version":"0.0.1"}}'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([0-9]*\)".*/\1/p')
  case "$line" in
    *'"server.getVersion"'*)
      printf '{"id":"%s","result":{"version":"0.0.1"}}\n' "$id" ;;
    *'"server.shutdown"'*)
      printf '{"id":"%s","result":null}\n' "$id"
      exit 0 ;;
    *'"echo.slow"'*)
      ;;
    *)
      printf '{"id":"%s","error":{"code":"UNKNOWN_REQUEST","message":"unsupported"}}\n' "$id" ;;
  esac
done
"#;

fn worker_config(dir: &TempDir) -> WorkerConfig {
    let script = dir.path().join("worker.sh");
    fs::write(&script, WORKER_SCRIPT).unwrap();
    WorkerConfig {
        runtime_path: Some(PathBuf::from("bash")),
        script_path: Some(script),
        kill_on_drop: true,
        ..WorkerConfig::default()
    }
}

#[test]
fn version_from_a_spawned_worker() {
    let dir = TempDir::new().unwrap();
    let client = AnalysisClient::start(&worker_config(&dir)).expect("worker should start");
    assert!(client.transport().worker_pid().is_some());

    assert_eq!(client.version(WAIT).unwrap(), "0.0.1");
    assert!(!client.transport().has_pending());
}

#[test]
fn unsupported_methods_come_back_as_remote_errors() {
    let dir = TempDir::new().unwrap();
    let client = AnalysisClient::start(&worker_config(&dir)).unwrap();

    let err = client
        .call::<Option<String>, _>(WAIT, |c, done| c.find_member_declarations("main", done))
        .expect_err("script only knows a few methods");
    match err {
        CallError::Request(RequestError::Remote { code, .. }) => assert_eq!(code, "UNKNOWN_REQUEST"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn worker_exit_after_shutdown_fails_outstanding_requests() {
    let dir = TempDir::new().unwrap();
    let client = AnalysisClient::start(&worker_config(&dir)).unwrap();
    let (tx, rx) = mpsc::channel();

    client
        .transport()
        .send_request(
            "echo.slow",
            Some(json!({ "payload": 1 })),
            Some(Consumer::value(move |r| tx.send(r).unwrap())),
        )
        .unwrap();
    client.shutdown().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Err(RequestError::WorkerExited));
    for _ in 0..1000 {
        if !client.transport().is_running() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!client.transport().is_running());
}

#[test]
fn worker_that_skips_the_handshake_is_rejected() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("silent.sh");
    fs::write(&script, "echo 'starting up'\nsleep 5\n").unwrap();
    let config = WorkerConfig {
        runtime_path: Some(PathBuf::from("bash")),
        script_path: Some(script),
        handshake_timeout_ms: 2_000,
        ..WorkerConfig::default()
    };

    let err = AnalysisClient::start(&config).err().expect("handshake line is not JSON");
    assert!(matches!(err, courier_transport::TransportError::Handshake { .. }));
}
