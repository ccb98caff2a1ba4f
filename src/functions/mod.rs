//! Clients for the backend's serverless functions.

mod speech;
mod subscription;

pub use speech::{SpeechAudio, SpeechModel, SpeechRequest, UsageRecord, Voice};
pub use subscription::SubscriptionStatus;

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, error};

use crate::backend::Credentials;
use crate::config::{BackendConfig, RequestConfig};
use crate::error::{FunctionError, FunctionResult};

/// Invokes functions under `{functions_url}/{name}`.
#[derive(Clone)]
pub struct FunctionsClient {
    client: Client,
    functions_url: String,
    credentials: Credentials,
}

impl FunctionsClient {
    pub fn new(
        config: &BackendConfig,
        credentials: Credentials,
        request_config: &RequestConfig,
    ) -> FunctionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(FunctionError::Http)?;

        Ok(Self {
            client,
            functions_url: config.functions_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn functions_url(&self) -> &str {
        &self.functions_url
    }

    /// POST a JSON body to a function and return the successful response
    async fn invoke<B: Serialize + ?Sized>(
        &self,
        name: &str,
        body: &B,
    ) -> FunctionResult<Response> {
        let url = format!("{}/{}", self.functions_url, name);
        debug!(function = name, "Invoking function");

        let request = self.credentials.apply(self.client.post(&url).json(body)).await;
        let response = request.send().await.map_err(FunctionError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);

            error!(function = name, status = status.as_u16(), error = %message, "Function failed");
            return Err(FunctionError::Failed {
                name: name.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}
