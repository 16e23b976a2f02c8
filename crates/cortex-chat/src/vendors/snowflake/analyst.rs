use tracing::debug;

use crate::backend::AnalystBackend;
use crate::errors::CortexError;
use crate::model::{AnalystRequest, AnalystResponse};

use super::{SnowflakeClient, http_error, request_id, transport_error};

pub const ANALYST_MESSAGE_PATH: &str = "/api/v2/cortex/analyst/message";

impl SnowflakeClient {
    /// Sends one question to the analyst endpoint.
    pub async fn send_analyst(
        &self,
        request: &AnalystRequest,
    ) -> Result<AnalystResponse, CortexError> {
        request.validate()?;
        debug!(semantic_model = %request.semantic_model_file, "sending analyst message");

        let response = self
            .post(ANALYST_MESSAGE_PATH, "application/json")
            .timeout(self.config.analyst_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(ANALYST_MESSAGE_PATH, e))?;
        if !response.status().is_success() {
            return Err(http_error(ANALYST_MESSAGE_PATH, response).await);
        }

        let header_id = request_id(&response);
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(ANALYST_MESSAGE_PATH, e))?;
        let mut parsed: AnalystResponse = serde_json::from_str(&body)
            .map_err(|e| CortexError::malformed(format!("invalid analyst response: {e}"), &body))?;
        if parsed.request_id.is_none() {
            parsed.request_id = header_id;
        }
        for warning in &parsed.warnings {
            debug!(message = %warning.message, "analyst warning");
        }
        Ok(parsed)
    }
}

#[async_trait::async_trait]
impl AnalystBackend for SnowflakeClient {
    async fn send_analyst(
        &self,
        request: &AnalystRequest,
    ) -> Result<AnalystResponse, CortexError> {
        SnowflakeClient::send_analyst(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnalystContent;
    use crate::vendors::snowflake::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AnalystRequest {
        AnalystRequest::new("@db.s.stage/sales.yml", "revenue by region?")
    }

    #[tokio::test]
    async fn falls_back_to_header_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ANALYST_MESSAGE_PATH))
            .and(body_json(json!({
                "messages": [{"role": "user", "content": [
                    {"type": "text", "text": "revenue by region?"}
                ]}],
                "semantic_model_file": "@db.s.stage/sales.yml"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Snowflake-Request-Id", "hdr-1")
                    .set_body_json(json!({
                        "message": {"role": "analyst", "content": [
                            {"type": "text", "text": "This is our interpretation"},
                            {"type": "sql", "statement": "SELECT region FROM sales"}
                        ]}
                    })),
            )
            .mount(&server)
            .await;

        let response = client_for(&server)
            .send_analyst(&request())
            .await
            .expect("analyst");
        assert_eq!(response.request_id.as_deref(), Some("hdr-1"));
        assert_eq!(
            response.message.content[1],
            AnalystContent::Sql {
                statement: "SELECT region FROM sales".into()
            }
        );
    }

    #[tokio::test]
    async fn body_request_id_wins_over_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ANALYST_MESSAGE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Snowflake-Request-Id", "hdr-1")
                    .set_body_json(json!({
                        "message": {"role": "analyst", "content": []},
                        "request_id": "body-1",
                        "warnings": [{"message": "ambiguous column"}]
                    })),
            )
            .mount(&server)
            .await;

        let response = client_for(&server)
            .send_analyst(&request())
            .await
            .expect("analyst");
        assert_eq!(response.request_id.as_deref(), Some("body-1"));
        assert_eq!(response.warnings.len(), 1);
    }

    #[tokio::test]
    async fn failure_message_names_request_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ANALYST_MESSAGE_PATH))
            .respond_with(
                ResponseTemplate::new(400)
                    .insert_header("X-Snowflake-Request-Id", "r-400")
                    .set_body_string("semantic model not found"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_analyst(&request())
            .await
            .expect_err("bad request");
        assert_eq!(
            err.to_string(),
            concat!(
                "failed request (id: r-400) to /api/v2/cortex/analyst/message ",
                "with status 400: semantic model not found",
            )
        );
    }

    #[tokio::test]
    async fn blank_semantic_model_is_a_config_error() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .send_analyst(&AnalystRequest::new(" ", "q"))
            .await
            .expect_err("config");
        assert!(matches!(err, CortexError::Config(_)));
    }
}
