//! Disposable SMS verification via the TextVerified HTTP API.
//!
//! Signup uses a one-time phone verification, then releases the number;
//! ongoing 2FA is TOTP, never SMS.

use std::time::Duration;

use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::storage::Platform;

use super::VerifyError;

const TEXTVERIFIED_BASE: &str = "https://www.textverified.com/api";

const CODE_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// An in-progress SMS verification.
#[derive(Debug, Clone)]
pub struct SmsVerification {
    pub verification_id: String,
    pub phone_number: String,
    pub service: &'static str,
}

pub struct SmsClient {
    http: reqwest::Client,
    api_key: String,
}

impl SmsClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, VerifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }

    /// Provider service name for a platform's verification flow.
    fn service_for(platform: Platform) -> Option<&'static str> {
        match platform {
            Platform::Tiktok => Some("TikTok"),
            Platform::Instagram => Some("Instagram"),
            _ => None,
        }
    }

    /// Request a disposable number for a platform signup.
    pub async fn request_number(
        &self,
        platform: Platform,
    ) -> Result<SmsVerification, VerifyError> {
        let service = Self::service_for(platform).ok_or_else(|| {
            VerifyError::Provider(format!("no SMS service configured for {platform}"))
        })?;

        let resp = self
            .http
            .post(format!("{TEXTVERIFIED_BASE}/Verifications"))
            .bearer_auth(&self.api_key)
            .json(&json!({"id": service}))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VerifyError::Provider(format!(
                "verification request returned {status}"
            )));
        }
        let body: Value = resp.json().await?;

        let verification = SmsVerification {
            verification_id: body["id"]
                .as_str()
                .map(str::to_string)
                .or_else(|| body["id"].as_i64().map(|v| v.to_string()))
                .ok_or_else(|| VerifyError::Provider("response had no verification id".into()))?,
            phone_number: body["number"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            service,
        };
        info!(
            number = %verification.phone_number,
            service,
            "Disposable SMS number acquired"
        );
        Ok(verification)
    }

    /// Poll for the verification code, up to the 120-second budget.
    pub async fn wait_for_code(
        &self,
        verification: &SmsVerification,
    ) -> Result<Option<String>, VerifyError> {
        let code_pattern = Regex::new(r"\b(\d{4,6})\b").map_err(|e| {
            VerifyError::Provider(format!("code pattern failed to compile: {e}"))
        })?;
        let deadline = tokio::time::Instant::now() + CODE_TIMEOUT;

        while tokio::time::Instant::now() < deadline {
            let result = self
                .http
                .get(format!(
                    "{TEXTVERIFIED_BASE}/Verifications/{}",
                    verification.verification_id
                ))
                .bearer_auth(&self.api_key)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp.json().await.unwrap_or(Value::Null);
                    if let Some(code) = body["code"].as_str() {
                        info!(service = verification.service, "SMS code received");
                        return Ok(Some(code.to_string()));
                    }
                    if let Some(sms) = body["sms"].as_str() {
                        if let Some(m) = code_pattern.captures(sms) {
                            let code = m[1].to_string();
                            info!(service = verification.service, "SMS code extracted");
                            return Ok(Some(code));
                        }
                    }
                }
                Ok(resp) => warn!(status = %resp.status(), "SMS poll returned error status"),
                Err(e) => warn!(error = %e, "Error polling SMS verification"),
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        warn!(
            verification_id = %verification.verification_id,
            "Timed out waiting for SMS code"
        );
        Ok(None)
    }

    /// Release the number back to the provider.
    pub async fn cancel(&self, verification: &SmsVerification) -> bool {
        let result = self
            .http
            .put(format!(
                "{TEXTVERIFIED_BASE}/Verifications/{}/Cancel",
                verification.verification_id
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}
