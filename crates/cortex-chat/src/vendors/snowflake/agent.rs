use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::backend::AgentBackend;
use crate::errors::CortexError;
use crate::model::AgentRequest;
use crate::transport::{SseDecoder, is_event_stream, parse_agent_body};

use super::{SnowflakeClient, content_type, http_error, transport_error};

pub const AGENT_RUN_PATH: &str = "/api/v2/cortex/agent:run";

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Decoded agent events as they arrive.
pub type AgentEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<serde_json::Value, CortexError>> + Send + 'static>>;

impl SnowflakeClient {
    async fn start_agent(&self, request: &AgentRequest) -> Result<reqwest::Response, CortexError> {
        request.validate()?;
        debug!(model = %request.model, tools = request.tools.len(), "starting agent run");

        let response = self
            .post(AGENT_RUN_PATH, "application/json, text/event-stream")
            .timeout(self.config.agent_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(AGENT_RUN_PATH, e))?;
        if !response.status().is_success() {
            return Err(http_error(AGENT_RUN_PATH, response).await);
        }
        Ok(response)
    }

    /// Runs the agent and returns the whole parsed payload.
    pub async fn run_agent(
        &self,
        request: &AgentRequest,
    ) -> Result<serde_json::Value, CortexError> {
        let response = self.start_agent(request).await?;
        read_agent_body(response).await
    }

    /// Runs the agent and yields events while the SSE body is still arriving.
    ///
    /// A malformed frame ends the stream with `MalformedResponse`. Replies
    /// that are not `text/event-stream` are read whole first, so a body that
    /// does not parse fails here before any event is yielded.
    pub async fn stream_agent(
        &self,
        request: &AgentRequest,
    ) -> Result<AgentEventStream, CortexError> {
        let response = self.start_agent(request).await?;
        if is_event_stream(content_type(&response).as_deref()) {
            let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
            return Ok(Box::pin(agent_event_stream(bytes_stream)));
        }

        // Same outcome as `reduce` on the whole payload: only arrays carry events.
        let events = match read_agent_body(response).await? {
            serde_json::Value::Array(events) => events,
            _ => Vec::new(),
        };
        debug!(events = events.len(), "agent reply was not streamed");
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok::<_, CortexError>))))
    }
}

async fn read_agent_body(response: reqwest::Response) -> Result<serde_json::Value, CortexError> {
    let content_type = content_type(&response);
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(AGENT_RUN_PATH, e))?;
    parse_agent_body(&body, content_type.as_deref())
}

#[async_trait::async_trait]
impl AgentBackend for SnowflakeClient {
    async fn run_agent(&self, request: &AgentRequest) -> Result<serde_json::Value, CortexError> {
        SnowflakeClient::run_agent(self, request).await
    }
}

fn agent_event_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<serde_json::Value, CortexError>> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<serde_json::Value>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            if let Some(event) = frame.into_event()? {
                                state.pending.push_back(event);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(CortexError::Transport(format!(
                            "agent stream read failed: {e}"
                        )));
                    }
                    None => {
                        if let Some(frame) = state.decoder.finish()
                            && let Some(event) = frame.into_event()?
                        {
                            state.pending.push_back(event);
                        }
                        state.done = true;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::{StreamReducer, reduce};
    use crate::vendors::snowflake::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SSE_BODY: &str = concat!(
        "event: message.delta\n",
        "data: {\"delta\":{\"content\":[{\"type\":\"text\",\"text\":\"Hello \"}]}}\n\n",
        "event: message.delta\n",
        "data: {\"delta\":{\"content\":[{\"type\":\"tool_results\",\"tool_results\":{\"content\":[",
        "{\"type\":\"json\",\"json\":{\"text\":\"world\",\"sql\":\"SELECT 1\",",
        "\"searchResults\":[{\"source_id\":\"s1\",\"doc_id\":\"d1\"}]}}]}}]}}\n\n",
        "event: done\ndata: [DONE]\n\n",
    );

    fn text_event(text: &str) -> serde_json::Value {
        json!({"event": "message.delta", "data": {"delta": {"content": [
            {"type": "text", "text": text}
        ]}}})
    }

    fn request() -> AgentRequest {
        AgentRequest::new("llama3.1-70b")
            .user_text("hello?")
            .search_tool("search1", "db.s.svc", 1, "conversation_id")
    }

    #[tokio::test]
    async fn run_agent_parses_event_stream_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .and(header("authorization", "Bearer test-token"))
            .and(header("x-snowflake-authorization-token-type", "OAUTH"))
            .and(body_partial_json(json!({"model": "llama3.1-70b"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(SSE_BODY),
            )
            .mount(&server)
            .await;

        let payload = client_for(&server).run_agent(&request()).await.expect("run");
        let out = reduce(&payload);
        assert_eq!(out.text, "Hello world");
        assert_eq!(out.sql, "SELECT 1");
        assert_eq!(out.citations.len(), 1);
    }

    #[tokio::test]
    async fn run_agent_accepts_json_array_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([text_event("ok")])))
            .mount(&server)
            .await;

        let payload = client_for(&server).run_agent(&request()).await.expect("run");
        assert_eq!(reduce(&payload).text, "ok");
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("<html>gateway</html>"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .run_agent(&request())
            .await
            .expect_err("malformed");
        assert!(matches!(err, CortexError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn http_failure_carries_status_and_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("X-Snowflake-Request-Id", "req-9")
                    .set_body_string("invalid token"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .run_agent(&request())
            .await
            .expect_err("unauthorized");
        assert!(matches!(
            err,
            CortexError::Http { status: 401, ref request_id, .. }
                if request_id.as_deref() == Some("req-9")
        ));
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_sending() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .run_agent(&AgentRequest::new("m"))
            .await
            .expect_err("no messages");
        assert!(matches!(err, CortexError::Validation(_)));
    }

    #[tokio::test]
    async fn stream_agent_yields_events_incrementally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(SSE_BODY),
            )
            .mount(&server)
            .await;

        let mut events = client_for(&server)
            .stream_agent(&request())
            .await
            .expect("stream");
        let mut reducer = StreamReducer::new();
        while let Some(event) = events.next().await {
            reducer.push_event(&event.expect("event"));
        }
        assert_eq!(reducer.events_seen(), 2);
        assert_eq!(reducer.finish().text, "Hello world");
    }

    #[tokio::test]
    async fn stream_agent_fails_on_malformed_frame() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("event: message.delta\ndata: {broken\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let mut events = client_for(&server)
            .stream_agent(&request())
            .await
            .expect("stream");
        let first = events.next().await.expect("one item");
        assert!(matches!(first, Err(CortexError::MalformedResponse { .. })));
    }

    #[tokio::test]
    async fn stream_agent_reads_json_array_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([text_event("o"), text_event("k")])),
            )
            .mount(&server)
            .await;

        let mut events = client_for(&server)
            .stream_agent(&request())
            .await
            .expect("stream");
        let mut reducer = StreamReducer::new();
        while let Some(event) = events.next().await {
            reducer.push_event(&event.expect("event"));
        }
        assert_eq!(reducer.events_seen(), 2);
        assert_eq!(reducer.finish().text, "ok");
    }

    #[tokio::test]
    async fn stream_agent_rejects_non_event_stream_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AGENT_RUN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("<html>gateway</html>"),
            )
            .mount(&server)
            .await;

        let err = match client_for(&server).stream_agent(&request()).await {
            Ok(_) => panic!("gateway page should not stream"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            CortexError::MalformedResponse { ref snippet, .. } if snippet.contains("gateway")
        ));
    }
}
