use serde::{Deserialize, Serialize};
use tracing::info;

use super::FunctionsClient;
use crate::error::{FunctionError, FunctionResult};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest<'a> {
    user_id: &'a str,
}

/// Entitlement reported by the subscription function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub is_premium: bool,
}

impl FunctionsClient {
    /// Read the premium flag from the user's profile
    pub async fn subscription_status(&self, user_id: &str) -> FunctionResult<SubscriptionStatus> {
        let response = self
            .invoke("check-subscription", &StatusRequest { user_id })
            .await?;

        let status: SubscriptionStatus =
            response
                .json()
                .await
                .map_err(|e| FunctionError::InvalidResponse {
                    message: format!("Failed to parse subscription status: {}", e),
                })?;

        info!(user = user_id, premium = status.is_premium, "Subscription status checked");
        Ok(status)
    }
}
