//! Pulp Client Integration Tests
//!
//! Runs the client against a local mock Pulp server over real HTTP.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use repotrack::adapters::PulpClient;
use repotrack::core::RetryPolicy;
use repotrack::PulpError;
use serde_json::json;

const SEARCH: &str = "/pulp/api/v2/repositories/search/";

fn client(server: &ServerGuard) -> PulpClient {
    PulpClient::new(&server.url(), "qa", "qa")
        .unwrap()
        .with_timeout(Duration::from_secs(5))
        .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1)))
        .unwrap()
}

#[test]
fn test_content_sets_follow_input_order() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", SEARCH)
        .match_header("authorization", "Basic cWE6cWE=")
        .match_body(Matcher::Json(json!({
            "criteria": {
                "filters": {
                    "id": {"$in": [
                        "rhel-7-hpc-node-rpms__7ComputeNode__x86_64",
                        "rhel-7-workstation-rpms__7Workstation__x86_64",
                        "rhel-7-desktop-rpms__7Client__x86_64",
                    ]}
                },
                "fields": ["notes"],
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": "rhel-7-desktop-rpms__7Client__x86_64", "notes": {"content_set": "cs-desk"}},
                {"id": "rhel-7-workstation-rpms__7Workstation__x86_64", "notes": {"content_set": "cs-work"}},
            ])
            .to_string(),
        )
        .expect(1)
        .create();

    let content_sets = client(&server)
        .get_content_sets(&[
            "rhel-7-hpc-node-rpms__7ComputeNode__x86_64",
            "rhel-7-workstation-rpms__7Workstation__x86_64",
            "rhel-7-desktop-rpms__7Client__x86_64",
        ])
        .unwrap();

    assert_eq!(content_sets, vec!["cs-work", "cs-desk"]);
    mock.assert();
}

#[test]
fn test_docker_repository_name() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/pulp/api/v2/repositories/foo-526/")
        .match_query(Matcher::UrlEncoded("distributors".into(), "true".into()))
        .match_header("authorization", "Basic cWE6cWE=")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "foo-526",
                "distributors": [
                    {"distributor_type_id": "docker_distributor_export", "config": {}},
                    {
                        "distributor_type_id": "docker_distributor_web",
                        "config": {"repo-registry-id": "scl/foo-526"}
                    }
                ]
            })
            .to_string(),
        )
        .create();

    let name = client(&server).get_docker_repository_name("foo-526").unwrap();

    assert_eq!(name, "scl/foo-526");
    mock.assert();
}

#[test]
fn test_server_error_is_retried_until_budget_is_spent() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", SEARCH)
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(3)
        .create();

    let err = client(&server).get_content_sets(&["repo"]).unwrap_err();

    match err {
        PulpError::Transport { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {:?}", other),
    }
    mock.assert();
}

#[test]
fn test_repository_lookup_is_retried_until_budget_is_spent() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/pulp/api/v2/repositories/foo-526/")
        .match_query(Matcher::UrlEncoded("distributors".into(), "true".into()))
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(3)
        .create();

    let err = client(&server).get_docker_repository_name("foo-526").unwrap_err();

    match err {
        PulpError::Transport {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(source.is_transient());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    mock.assert();
}

/// Reads one request (headers plus any declared body)
fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let body_len = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            return;
        }
    }
}

#[test]
fn test_truncated_body_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            read_request(&mut stream);
            counter.fetch_add(1, Ordering::SeqCst);
            // Promise 200 bytes, send 5, hang up
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n[{\"id",
            );
        }
    });

    let client = PulpClient::new(&url, "qa", "qa")
        .unwrap()
        .with_timeout(Duration::from_secs(5))
        .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1)))
        .unwrap();

    let err = client.get_content_sets(&["repo"]).unwrap_err();

    match err {
        PulpError::Transport {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(source.is_transient(), "unexpected error: {:?}", source);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn test_recovers_after_transient_failure() {
    let mut server = Server::new();
    let failing = server
        .mock("GET", "/pulp/api/v2/repositories/foo/")
        .match_query(Matcher::UrlEncoded("distributors".into(), "true".into()))
        .with_status(503)
        .expect(1)
        .create();
    let succeeding = server
        .mock("GET", "/pulp/api/v2/repositories/foo/")
        .match_query(Matcher::UrlEncoded("distributors".into(), "true".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "distributors": [{
                    "distributor_type_id": "docker_distributor_web",
                    "config": {"repo-registry-id": "scl/foo"}
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create();

    let name = client(&server).get_docker_repository_name("foo").unwrap();

    assert_eq!(name, "scl/foo");
    failing.assert();
    succeeding.assert();
}

#[test]
fn test_unauthorized_is_not_retried() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", SEARCH)
        .with_status(401)
        .expect(1)
        .create();

    let err = client(&server).get_content_sets(&["repo"]).unwrap_err();

    assert!(matches!(err, PulpError::Transport { attempts: 1, .. }));
    mock.assert();
}

#[test]
fn test_missing_distributor_is_reported() {
    let mut server = Server::new();
    server
        .mock("GET", "/pulp/api/v2/repositories/bare/")
        .match_query(Matcher::UrlEncoded("distributors".into(), "true".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"distributors": []}).to_string())
        .create();

    let err = client(&server).get_docker_repository_name("bare").unwrap_err();

    assert!(matches!(err, PulpError::MalformedResponse { .. }));
}
