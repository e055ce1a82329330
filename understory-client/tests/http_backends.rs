//! HTTP backends against a scripted local server.

use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::Span;
use understory_client::{Backends, GitHubClient, HttpAgent, HttpEmbeddingProvider};
use understory_core::vcs::{FileChangeStatus, VcsClient};
use understory_core::{
    Agent, AgentRequest, CommitSha, Config, EmbeddingProvider, FilePath, UnderstoryError,
};

#[derive(Debug)]
struct Recorded {
    request_line: String,
    headers: Vec<String>,
    body: String,
}

/// Serve `responses` in order, one connection each, and hand back what was
/// received.
fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Recorded>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = std::thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut headers = Vec::new();
            let mut length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        length = value.trim().parse().unwrap();
                    }
                }
                headers.push(line);
            }
            let mut buf = vec![0u8; length];
            reader.read_exact(&mut buf).unwrap();

            let reply = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).unwrap();
            seen.push(Recorded {
                request_line: request_line.trim_end().to_string(),
                headers,
                body: String::from_utf8(buf).unwrap(),
            });
        }
        seen
    });
    (base, handle)
}

fn github(base: &str) -> GitHubClient {
    GitHubClient::new("acme/shop", "t0ken", Span::none())
        .unwrap()
        .with_api_base(base)
}

#[test]
fn ref_lookup_reads_the_sha_and_treats_404_as_missing() {
    let (base, server) = serve(vec![
        (200, json!({"object": {"sha": "abc123", "type": "commit"}}).to_string()),
        (404, json!({"message": "Not Found"}).to_string()),
    ]);
    let client = github(&base);

    assert_eq!(
        client.get_ref_sha("understory-index").unwrap(),
        Some(CommitSha::new("abc123"))
    );
    assert_eq!(client.get_ref_sha("nope").unwrap(), None);

    let seen = server.join().unwrap();
    assert_eq!(
        seen[0].request_line,
        "GET /repos/acme/shop/git/ref/heads/understory-index HTTP/1.1"
    );
    assert!(seen[0]
        .headers
        .iter()
        .any(|h| h.eq_ignore_ascii_case("authorization: Bearer t0ken")));
}

#[test]
fn pull_request_files_follow_pagination() {
    let full_page: Vec<_> = (0..100)
        .map(|i| json!({"filename": format!("src/f{i}.py"), "status": "modified"}))
        .collect();
    let last_page = json!([{
        "filename": "src/new.py",
        "status": "renamed",
        "previous_filename": "src/old.py",
        "patch": "@@ -1 +1 @@"
    }]);
    let (base, server) = serve(vec![
        (200, serde_json::Value::Array(full_page).to_string()),
        (200, last_page.to_string()),
    ]);

    let files = github(&base).pull_request_files(12).unwrap();
    assert_eq!(files.len(), 101);
    let renamed = &files[100];
    assert_eq!(renamed.status, FileChangeStatus::Renamed);
    assert_eq!(renamed.previous_path, Some(FilePath::new("src/old.py")));

    let seen = server.join().unwrap();
    assert!(seen[1].request_line.contains("page=2"));
}

#[test]
fn rejected_ref_update_is_a_publish_error() {
    let (base, server) = serve(vec![(
        422,
        json!({"message": "Update is not a fast forward"}).to_string(),
    )]);

    let err = github(&base)
        .update_ref("understory-index", &CommitSha::new("def456"))
        .unwrap_err();
    match err {
        UnderstoryError::Publish { operation, message } => {
            assert_eq!(operation, "update_ref");
            assert!(message.contains("not a fast forward"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let seen = server.join().unwrap();
    assert!(seen[0].request_line.starts_with("PATCH "));
    assert!(seen[0].body.contains("\"force\":false"));
}

#[test]
fn client_construction_validates_inputs() {
    assert!(matches!(
        GitHubClient::new("acme", "t", Span::none()),
        Err(UnderstoryError::Configuration(_))
    ));
    assert!(matches!(
        GitHubClient::new("acme/shop", " ", Span::none()),
        Err(UnderstoryError::Configuration(_))
    ));
}

#[test]
fn embeddings_are_returned_in_input_order() {
    let (base, server) = serve(vec![(
        200,
        json!({"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]})
        .to_string(),
    )]);
    let provider = HttpEmbeddingProvider::new(&base, "k", "tiny", 2, Span::none()).unwrap();

    let vectors = provider
        .embed(&["first".to_string(), "second".to_string()])
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    let seen = server.join().unwrap();
    assert_eq!(seen[0].request_line, "POST /embeddings HTTP/1.1");
    assert!(seen[0].body.contains("\"model\":\"tiny\""));
}

#[test]
fn wrong_embedding_dimension_is_rejected() {
    let (base, _server) = serve(vec![(
        200,
        json!({"data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]}).to_string(),
    )]);
    let provider = HttpEmbeddingProvider::new(&base, "k", "tiny", 2, Span::none()).unwrap();

    let err = provider.embed(&["x".to_string()]).unwrap_err();
    assert!(matches!(err, UnderstoryError::Embedding(_)));
}

fn chat_reply(content: &str) -> String {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
}

#[test]
fn agent_retries_transient_failures() {
    let (base, server) = serve(vec![
        (500, json!({"error": "overloaded"}).to_string()),
        (200, chat_reply("not json")),
        (200, chat_reply(r#"{"done": true}"#)),
    ]);
    let agent = HttpAgent::new(&base, "k", "m", 3, Span::none())
        .unwrap()
        .with_backoff(Duration::ZERO);

    let request = AgentRequest::new("search_plan", json!({"type": "object"}), "go")
        .with_system("be brief");
    let value = agent.complete(&request).unwrap();
    assert_eq!(value, json!({"done": true}));

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].body.contains("\"json_schema\""));
    assert!(seen[0].body.contains("be brief"));
}

#[test]
fn agent_gives_up_on_client_errors() {
    let (base, server) = serve(vec![(400, json!({"error": "bad"}).to_string())]);
    let agent = HttpAgent::new(&base, "k", "m", 3, Span::none())
        .unwrap()
        .with_backoff(Duration::ZERO);

    let err = agent
        .complete(&AgentRequest::new("x", json!({}), "p"))
        .unwrap_err();
    assert!(matches!(err, UnderstoryError::Agent(_)));
    assert_eq!(server.join().unwrap().len(), 1);
}

#[test]
fn disabled_backends_are_absent_and_enabled_ones_need_keys() {
    let config = Config::default();
    let backends = Backends::from_config(&config, &Span::none()).unwrap();
    assert!(backends.embedder.is_none());
    assert!(backends.agent.is_none());

    let mut config = Config::default();
    config.agent.enabled = true;
    config.agent.api_key_env = "UNDERSTORY_TEST_KEY_THAT_IS_NEVER_SET".into();
    assert!(matches!(
        Backends::from_config(&config, &Span::none()),
        Err(UnderstoryError::Configuration(_))
    ));
}
