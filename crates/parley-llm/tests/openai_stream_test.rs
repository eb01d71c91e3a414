use futures::StreamExt;
use parley_llm::{collect_text, ChatMessage, ContentDelta, OpenAIClient, ProviderClient, ProviderError};

fn sse_body(chunks: &[&str]) -> String {
    chunks.iter().map(|c| format!("data: {}\n\n", c)).collect()
}

#[tokio::test]
async fn test_streams_deltas_until_done() {
    let mut server = mockito::Server::new_async().await;
    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = OpenAIClient::new("sk-test").unwrap().with_base_url(server.url());
    let stream = client
        .stream_chat_completion("gpt-4o", &[ChatMessage::user("Hi")])
        .await
        .unwrap();
    let deltas: Vec<ContentDelta> = stream.collect().await;

    assert_eq!(
        deltas,
        vec![ContentDelta::text("Hel"), ContentDelta::text("lo"), ContentDelta::finished()]
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_status_before_stream() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
        .create_async()
        .await;

    let client = OpenAIClient::new("sk-bad").unwrap().with_base_url(server.url());
    let result = client.stream_chat_completion("gpt-4o", &[ChatMessage::user("Hi")]).await;

    match result {
        Err(ProviderError::Status { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("Incorrect API key"));
        }
        Err(other) => panic!("Expected Status error, got {:?}", other),
        Ok(_) => panic!("Expected Status error, got a stream"),
    }
}

#[tokio::test]
async fn test_truncated_stream_ends_with_error_event() {
    let mut server = mockito::Server::new_async().await;
    let body = sse_body(&[r#"{"choices":[{"index":0,"delta":{"content":"partial"},"finish_reason":null}]}"#]);
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = OpenAIClient::new("sk-test").unwrap().with_base_url(server.url());
    let deltas: Vec<ContentDelta> = client
        .stream_chat_completion("gpt-4o", &[ChatMessage::user("Hi")])
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[0], ContentDelta::text("partial"));
    assert!(deltas[1].is_last);
    assert!(deltas[1].is_error());
}

#[tokio::test]
async fn test_collect_text_for_titles() {
    let mut server = mockito::Server::new_async().await;
    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"content":"\"Rust Ownership\""},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = OpenAIClient::new("sk-test").unwrap().with_base_url(server.url());
    let stream = client
        .stream_chat_completion("gpt-4o-mini", &[ChatMessage::user("title please")])
        .await
        .unwrap();

    assert_eq!(collect_text(stream).await.unwrap(), "\"Rust Ownership\"");
}
