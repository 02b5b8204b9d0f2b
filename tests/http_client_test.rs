use chrono::Utc;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use meditation_caller::calling::{BatchCallingClient, CallingError};
use meditation_caller::config::{self, Config};
use meditation_caller::grouping::group_by_language;
use meditation_caller::model::RawRow;
use meditation_caller::normalize::Normalizer;
use meditation_caller::simulation::build_simulation;
use meditation_caller::submitter::{BatchSubmitter, FailureReason, SubmitOutcome};

#[derive(Debug, Clone)]
struct Captured {
    head: String,
    body: String,
}

type Responder = fn(&Captured) -> (&'static str, String);

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before body was complete");
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();
    Captured { head, body }
}

/// Serve `connections` requests, answering each with `respond`.
async fn serve(connections: usize, respond: Responder) -> (Url, Arc<Mutex<Vec<Captured>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    tokio::spawn(async move {
        for _ in 0..connections {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            let (status_line, body) = respond(&request);
            sink.lock().await.push(request);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    (Url::parse(&format!("http://{addr}/")).unwrap(), captured)
}

fn config_for(base: &Url) -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.api.base_url = base.to_string();
    cfg.api.api_key = "test-key".into();
    cfg
}

fn row(phone: &str, language: &str) -> RawRow {
    [("phone_number", phone), ("language", language)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn server_error_for_one_group_does_not_block_sibling() {
    let (base, captured) = serve(2, |req| {
        if req.body.contains("meditation-hi-") {
            ("500 Internal Server Error", r#"{"detail":"boom"}"#.to_string())
        } else {
            ("200 OK", r#"{"id":"abc"}"#.to_string())
        }
    })
    .await;
    let cfg = config_for(&base);
    let client = BatchCallingClient::from_config(&cfg).unwrap();
    let normalizer = Normalizer::new(&cfg.prompts, cfg.recipients.sessions_completed);
    let grouped = group_by_language(&[row("+1", "hi"), row("+2", "en")], &normalizer);

    let submitter = BatchSubmitter::new(&cfg, &client);
    let outcomes = submitter.submit_all(&grouped.groups).await;

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        &outcomes[0],
        SubmitOutcome::Failed {
            language,
            reason: FailureReason::Rejected { status: 500, body },
            ..
        } if language == "hi" && body == r#"{"detail":"boom"}"#
    ));
    assert_eq!(
        outcomes[1],
        SubmitOutcome::Submitted {
            language: "en".into(),
            batch_id: "abc".into()
        }
    );

    let captured = captured.lock().await;
    assert_eq!(captured.len(), 2);
    let head = captured[1].head.to_lowercase();
    assert!(head.starts_with("post /v1/convai/batch-calling/submit "));
    assert!(head.contains("xi-api-key: test-key"));
    assert!(head.contains("content-type: application/json"));
    let body: Value = serde_json::from_str(&captured[1].body).unwrap();
    assert_eq!(body["agent_id"], "AGENT_EN_ID");
    assert_eq!(body["recipients"][0]["phone_number"], "+2");

    let rejected: Value = serde_json::from_str(&captured[0].body).unwrap();
    let reported: Value = serde_json::from_str(outcomes[0].failed_request().unwrap()).unwrap();
    assert_eq!(reported, rejected);
}

#[tokio::test]
async fn success_without_id_reports_sentinel() {
    let (base, _) = serve(1, |_| ("202 Accepted", r#"{"status":"pending"}"#.to_string())).await;
    let cfg = config_for(&base);
    let client = BatchCallingClient::from_config(&cfg).unwrap();
    let normalizer = Normalizer::new(&cfg.prompts, cfg.recipients.sessions_completed);
    let grouped = group_by_language(&[row("+1", "en")], &normalizer);

    let outcomes = BatchSubmitter::new(&cfg, &client)
        .submit_all_at(&grouped.groups, Utc::now())
        .await;
    assert_eq!(
        outcomes,
        vec![SubmitOutcome::Submitted {
            language: "en".into(),
            batch_id: "N/A".into()
        }]
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    let cfg = config_for(&base);
    let client = BatchCallingClient::from_config(&cfg).unwrap();
    let normalizer = Normalizer::new(&cfg.prompts, cfg.recipients.sessions_completed);
    let grouped = group_by_language(&[row("+1", "en")], &normalizer);

    let outcomes = BatchSubmitter::new(&cfg, &client).submit_all(&grouped.groups).await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        &outcomes[0],
        SubmitOutcome::Failed { language, reason: FailureReason::Transport(_), .. } if language == "en"
    ));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        }
    });

    let base = Url::parse(&format!("http://{addr}/")).unwrap();
    let client =
        BatchCallingClient::with_base_url("k".into(), base, Duration::from_millis(200)).unwrap();
    let cfg = config_for(&Url::parse(&format!("http://{addr}/")).unwrap());
    let normalizer = Normalizer::new(&cfg.prompts, cfg.recipients.sessions_completed);
    let grouped = group_by_language(&[row("+1", "en")], &normalizer);
    let submitter = BatchSubmitter::new(&cfg, &client);

    let request = match submitter.plan(&grouped.groups, Utc::now()).remove(0) {
        meditation_caller::submitter::PlannedBatch::Ready { request, .. } => request,
        other => panic!("expected a ready batch, got {other:?}"),
    };
    let err = client.submit_batch(&request).await.unwrap_err();
    match err {
        CallingError::Transport(inner) => assert!(inner.is_timeout()),
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn simulate_conversation_posts_to_agent_path() {
    let (base, captured) = serve(1, |_| ("200 OK", r#"{"simulated_conversation":[]}"#.to_string())).await;
    let cfg = config_for(&base);
    let client = BatchCallingClient::from_config(&cfg).unwrap();
    let plan = build_simulation(&row("", "en"), &cfg, &cfg.prompts).unwrap();

    let response = client
        .simulate_conversation(&plan.agent_id, &plan.request)
        .await
        .unwrap();
    assert!(response["simulated_conversation"].is_array());

    let captured = captured.lock().await;
    assert!(captured[0]
        .head
        .starts_with("POST /v1/convai/agents/AGENT_EN_ID/simulate-conversation "));
    let body: Value = serde_json::from_str(&captured[0].body).unwrap();
    assert_eq!(
        body["simulation_specification"]["simulated_user_config"]["first_message"],
        "hello"
    );
}
