//! Error-classification stage: turns error statuses into `Err` values.

use async_trait::async_trait;

use super::{Next, Plugin};
use crate::error::{Result, TransportError};
use crate::transport::request::{OutgoingRequest, Reply};

/**
 * Converts error replies into `TransportError`s so the retry stage in front
 * of it sees them as failures.
 *
 * With `only_server_errors` (the transport's setting) 4xx replies pass
 * through untouched; this keeps 429 replies visible to the rate limiter.
 */
pub struct ErrorPlugin {
    only_server_errors: bool,
}

impl ErrorPlugin {
    pub fn only_server_errors() -> Self {
        Self {
            only_server_errors: true,
        }
    }

    #[cfg(test)]
    pub fn all_errors() -> Self {
        Self {
            only_server_errors: false,
        }
    }
}

#[async_trait]
impl Plugin for ErrorPlugin {
    fn name(&self) -> &'static str {
        "error"
    }

    async fn handle(&self, request: OutgoingRequest, next: Next<'_>) -> Result<Reply> {
        let reply = next.run(request).await?;

        if reply.status.is_server_error() {
            return Err(TransportError::ServerError {
                status: reply.status.as_u16(),
                body: reply.body_text(),
            });
        }
        if !self.only_server_errors && reply.status.is_client_error() {
            return Err(TransportError::ClientError {
                status: reply.status.as_u16(),
                body: reply.body_text(),
            });
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::plugin::testing::ScriptedClient;
    use crate::transport::plugin::{PluginChain, RetryPlugin};
    use reqwest::StatusCode;

    fn request() -> OutgoingRequest {
        OutgoingRequest::post("https://host/").unwrap()
    }

    #[tokio::test]
    async fn test_server_error_becomes_err() {
        let chain = PluginChain::new(vec![Box::new(ErrorPlugin::only_server_errors())]);
        let client = ScriptedClient::new(vec![Ok(Reply::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "down",
        ))]);

        let err = chain.execute(&client, request()).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ServerError { status: 503, ref body } if body == "down"
        ));
    }

    #[tokio::test]
    async fn test_client_error_passes_through() {
        let chain = PluginChain::new(vec![Box::new(ErrorPlugin::only_server_errors())]);
        let client = ScriptedClient::new(vec![Ok(Reply::new(StatusCode::TOO_MANY_REQUESTS, ""))]);

        let reply = chain.execute(&client, request()).await.unwrap();
        assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_all_errors_mode_rejects_4xx() {
        let chain = PluginChain::new(vec![Box::new(ErrorPlugin::all_errors())]);
        let client = ScriptedClient::new(vec![Ok(Reply::new(StatusCode::BAD_REQUEST, "bad"))]);

        let err = chain.execute(&client, request()).await.unwrap_err();
        assert!(matches!(err, TransportError::ClientError { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_5xx_is_retried_but_4xx_is_not() {
        let chain = PluginChain::new(vec![
            Box::new(RetryPlugin::new(3)),
            Box::new(ErrorPlugin::only_server_errors()),
        ]);

        let flaky = ScriptedClient::new(vec![Ok(Reply::new(StatusCode::BAD_GATEWAY, ""))]);
        let reply = chain.execute(&flaky, request()).await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(flaky.attempts(), 2);

        let rejecting = ScriptedClient::new(vec![Ok(Reply::new(StatusCode::BAD_REQUEST, ""))]);
        let reply = chain.execute(&rejecting, request()).await.unwrap();
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(rejecting.attempts(), 1);
    }
}
