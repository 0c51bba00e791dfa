use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steady::{
  ChatSettings, ClientConfig, Conversation, ErrorKind, Event,
  InferenceClient, MemorySink, Outcome, Role
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const UNIT_MS: u64 = 5;

/// Client with a short backoff unit and a recording sink
fn test_client(
  base_url: &str
, request_timeout_ms: Option<u64>
) -> (InferenceClient, Arc<MemorySink>)
{   steady::init_logging();
    let mut config = ClientConfig::with_base_url(base_url);
    config.retry.backoff_unit_ms = UNIT_MS;
    if let Some(ms) = request_timeout_ms
    {   config.request_timeout_ms = ms;
    }
    let sink = Arc::new(MemorySink::new());
    let client = InferenceClient::new(config)
      .expect("valid config")
      .with_sink(sink.clone());
    (client, sink)
}

async fn mock_tags(server: &mut mockito::ServerGuard) -> mockito::Mock
{   server
      .mock("GET", "/api/tags")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"models": [{"name": "llama2:latest"}]}"#)
      .create_async()
      .await
}

/// Address nothing is listening on
fn dead_url() -> String
{   let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn final_attempts(sink: &MemorySink) -> Option<usize>
{   sink.events().iter().rev().find_map(|e| match e
    {   Event::Success { attempts, .. } => Some(*attempts)
      , Event::Failure { attempts, .. } => Some(*attempts)
      , _ => None
    })
}

// ===== Validation =====

#[tokio::test]
async fn test_blank_prompts_make_no_network_calls()
{   let mut server = mockito::Server::new_async().await;
    let tags = server
      .mock("GET", "/api/tags")
      .expect(0)
      .create_async()
      .await;
    let generate = server
      .mock("POST", "/api/generate")
      .expect(0)
      .create_async()
      .await;

    let (client, sink) = test_client(&server.url(), None);
    for prompt in ["", "   ", "\n\t"]
    {   let outcome = client.generate(prompt, "llama2", 0.7).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ValidationError));
    }

    assert_eq!(sink.attempts(), 0);
    tags.assert_async().await;
    generate.assert_async().await;
}

#[tokio::test]
async fn test_overlong_prompt_is_rejected()
{   let (client, sink) = test_client(&dead_url(), None);
    let prompt = "x".repeat(10_001);

    let outcome = client.generate(&prompt, "llama2", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ValidationError));
    assert_eq!(sink.attempts(), 0);
}

#[tokio::test]
async fn test_script_tag_in_any_case_is_rejected()
{   let (client, _sink) = test_client(&dead_url(), None);
    for prompt in ["<script>", "a <ScRiPt src=x>", "<SCRIPT"]
    {   let outcome = client.generate(prompt, "llama2", 0.7).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ValidationError));
    }
}

#[tokio::test]
async fn test_out_of_range_temperature_is_rejected()
{   let (client, _sink) = test_client(&dead_url(), None);
    let outcome = client.generate("hi", "llama2", 2.5).await;
    assert_eq!(outcome.error_kind(), Some(ErrorKind::ValidationError));
}

// ===== Liveness probe =====

#[tokio::test]
async fn test_unreachable_probe_is_connection_error()
{   let (client, sink) = test_client(&dead_url(), None);

    let outcome = client.generate("hello", "llama2", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ConnectionError));
    assert_eq!(sink.attempts(), 0);
    assert!(sink.delays().is_empty());
}

#[tokio::test]
async fn test_silent_probe_is_timeout_error()
{   // accepts connections but never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let mut held = Vec::new();
      while let Ok((socket, _)) = listener.accept().await
      {   held.push(socket);
      }
    });

    steady::init_logging();
    let mut config = ClientConfig::with_base_url(format!("http://{}", addr));
    config.probe_timeout_ms = 100;
    let sink = Arc::new(MemorySink::new());
    let client = InferenceClient::new(config)
      .unwrap()
      .with_sink(sink.clone());

    let outcome = client.generate("hello", "llama2", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::TimeoutError));
    assert_eq!(sink.attempts(), 0);
}

// ===== Generation =====

#[tokio::test]
async fn test_success_on_first_attempt()
{   let mut server = mockito::Server::new_async().await;
    let _tags = mock_tags(&mut server).await;
    let generate = server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_body(r#"{"response": "hello"}"#)
      .expect(1)
      .create_async()
      .await;

    let (client, sink) = test_client(&server.url(), None);
    let outcome = client.generate("Say hello", "llama2", 0.7).await;

    assert_eq!(outcome, Outcome::success("hello"));
    assert_eq!(sink.attempts(), 1);
    assert_eq!(final_attempts(&sink), Some(1));
    generate.assert_async().await;
}

#[tokio::test]
async fn test_missing_model_is_not_retried()
{   let mut server = mockito::Server::new_async().await;
    let _tags = mock_tags(&mut server).await;
    let generate = server
      .mock("POST", "/api/generate")
      .with_status(404)
      .expect(1)
      .create_async()
      .await;

    let (client, sink) = test_client(&server.url(), None);
    let outcome = client.generate("hi", "no-such-model", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ModelError));
    assert_eq!(sink.attempts(), 1);
    assert!(sink.delays().is_empty());
    generate.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_back_off_exponentially()
{   let mut server = mockito::Server::new_async().await;
    let _tags = mock_tags(&mut server).await;
    let generate = server
      .mock("POST", "/api/generate")
      .with_status(500)
      .expect(3)
      .create_async()
      .await;

    let (client, sink) = test_client(&server.url(), None);
    let outcome = client.generate("hi", "llama2", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ServerError));
    assert_eq!(sink.attempts(), 3);
    let unit = Duration::from_millis(UNIT_MS);
    assert_eq!(sink.delays(), vec![unit, unit * 2, unit * 4]);
    assert_eq!(final_attempts(&sink), Some(3));
    generate.assert_async().await;
}

/// How the stub server mistreats a generate request
#[derive(Debug, Clone, Copy)]
enum PostFault
{   /// Never answer
    Hang
  , /// Close the socket without answering
    Close
  , /// Answer with bytes that are not HTTP
    Garbage
}

/// Minimal HTTP/1.1 server: tags always answer, the first `faulty`
/// generate requests hit `fault`, later ones get `{"response": "ok"}`
async fn spawn_stub_server(fault: PostFault, faulty: usize)
  -> (String, Arc<AtomicUsize>)
{   let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let posts = Arc::new(AtomicUsize::new(0));
    let counter = posts.clone();
    tokio::spawn(async move {
      while let Ok((socket, _)) = listener.accept().await
      {   tokio::spawn(
            serve_connection(socket, counter.clone(), fault, faulty)
          );
      }
    });
    (format!("http://{}", addr), posts)
}

async fn serve_connection(
  mut socket: TcpStream
, posts: Arc<AtomicUsize>
, fault: PostFault
, faulty: usize
)
{   let mut buf: Vec<u8> = Vec::new();
    loop
    {   let head_end = loop
        {   if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n")
            {   break pos + 4;
            }
            let mut chunk = [0u8; 4096];
            match socket.read(&mut chunk).await
            {   Ok(0) | Err(_) => return
              , Ok(n) => buf.extend_from_slice(&chunk[..n])
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let content_length = head
          .lines()
          .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length")
            {   value.trim().parse::<usize>().ok()
            } else
            {   None
            }
          })
          .unwrap_or(0);
        while buf.len() < head_end + content_length
        {   let mut chunk = [0u8; 4096];
            match socket.read(&mut chunk).await
            {   Ok(0) | Err(_) => return
              , Ok(n) => buf.extend_from_slice(&chunk[..n])
            }
        }
        buf.drain(..head_end + content_length);

        let body = if head.starts_with("GET /api/tags")
        {   r#"{"models": []}"#
        } else if head.starts_with("POST /api/generate")
        {   let seen = posts.fetch_add(1, Ordering::SeqCst) + 1;
            if seen <= faulty
            {   match fault
                {   PostFault::Hang => {
                      tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                  , PostFault::Close => {}
                  , PostFault::Garbage => {
                      let _ = socket.write_all(b"garbage\r\n\r\n").await;
                      tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                return;
            }
            r#"{"response": "ok"}"#
        } else
        {   return;
        };

        let response = format!(
          "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
           content-length: {}\r\n\r\n{}"
        , body.len(), body
        );
        if socket.write_all(response.as_bytes()).await.is_err()
        {   return;
        }
    }
}

#[tokio::test]
async fn test_timeouts_then_success()
{   let (url, posts) = spawn_stub_server(PostFault::Hang, 2).await;
    let (client, sink) = test_client(&url, Some(200));

    let outcome = client.generate("hi", "llama2", 0.7).await;

    assert_eq!(outcome, Outcome::success("ok"));
    assert_eq!(posts.load(Ordering::SeqCst), 3);
    assert_eq!(sink.attempts(), 3);
    assert_eq!(final_attempts(&sink), Some(3));
    // timeouts retry immediately
    assert!(sink.delays().is_empty());
}

#[tokio::test]
async fn test_timeouts_exhaust_attempts()
{   let (url, posts) = spawn_stub_server(PostFault::Hang, usize::MAX).await;
    let (client, sink) = test_client(&url, Some(100));

    let outcome = client.generate("hi", "llama2", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::TimeoutError));
    assert_eq!(posts.load(Ordering::SeqCst), 3);
    assert_eq!(sink.attempts(), 3);
}

#[tokio::test]
async fn test_dropped_connections_retry_after_fixed_delay()
{   let (url, posts) = spawn_stub_server(PostFault::Close, usize::MAX).await;
    let (client, sink) = test_client(&url, None);

    let outcome = client.generate("hi", "llama2", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ConnectionError));
    assert_eq!(posts.load(Ordering::SeqCst), 3);
    assert_eq!(sink.attempts(), 3);
    let unit = Duration::from_millis(UNIT_MS);
    assert_eq!(sink.delays(), vec![unit, unit, unit]);
    assert_eq!(final_attempts(&sink), Some(3));
}

#[tokio::test]
async fn test_dropped_connection_then_success()
{   let (url, posts) = spawn_stub_server(PostFault::Close, 1).await;
    let (client, sink) = test_client(&url, None);

    let outcome = client.generate("hi", "llama2", 0.7).await;

    assert_eq!(outcome, Outcome::success("ok"));
    assert_eq!(posts.load(Ordering::SeqCst), 2);
    assert_eq!(sink.delays(), vec![Duration::from_millis(UNIT_MS)]);
}

#[tokio::test]
async fn test_unreadable_reply_is_unexpected_error_with_cause()
{   let (url, posts) = spawn_stub_server(PostFault::Garbage, usize::MAX).await;
    let (client, sink) = test_client(&url, None);

    let outcome = client.generate("hi", "llama2", 0.7).await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::UnexpectedError));
    assert_eq!(posts.load(Ordering::SeqCst), 3);
    assert_eq!(sink.attempts(), 3);
    assert!(sink.delays().is_empty());
    match outcome
    {   Outcome::Failure { error_message, .. } => {
          assert!(error_message.starts_with("Unexpected error: "));
          assert!(error_message.contains("error sending request"));
          assert!(error_message.contains("/api/generate"));
        }
      , other => panic!("expected failure, got {:?}", other)
    }
}

// ===== Conversation =====

#[tokio::test]
async fn test_conversation_records_reply()
{   let mut server = mockito::Server::new_async().await;
    let _tags = mock_tags(&mut server).await;
    let _generate = server
      .mock("POST", "/api/generate")
      .with_status(200)
      .with_body(r#"{"response": "Three sets of ten."}"#)
      .create_async()
      .await;

    let (client, _sink) = test_client(&server.url(), None);
    let mut conversation = Conversation::new();
    let outcome = conversation
      .exchange(&client, &ChatSettings::default(), "  How many squats?  ")
      .await;

    assert!(outcome.is_success());
    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "How many squats?");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Three sets of ten.");
}

#[tokio::test]
async fn test_conversation_records_apology_on_failure()
{   let mut server = mockito::Server::new_async().await;
    let _tags = mock_tags(&mut server).await;
    let _generate = server
      .mock("POST", "/api/generate")
      .with_status(404)
      .create_async()
      .await;

    let (client, _sink) = test_client(&server.url(), None);
    let mut conversation = Conversation::new();
    let settings = ChatSettings::new("codellama", 0.2);
    let outcome = conversation.exchange(&client, &settings, "hi").await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::ModelError));
    assert_eq!(conversation.user_message_count(), 1);
    let reply = &conversation.messages()[1].content;
    assert!(reply.starts_with("Sorry, I encountered an error: "));
    assert!(reply.contains("codellama"));
}

#[test]
fn test_validation_failure_without_runtime_setup()
{   let client = InferenceClient::new(ClientConfig::default()).unwrap();
    let outcome = tokio_test::block_on(client.generate("", "llama2", 0.7));
    assert_eq!(outcome.error_kind(), Some(ErrorKind::ValidationError));
}
