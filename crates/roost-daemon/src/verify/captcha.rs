//! CAPTCHA solving via the CapSolver HTTP API.
//!
//! Signup flows hand a screenshot to the solver and get back slide
//! coordinates or recognized text; the task/result pair is polled because
//! solving takes seconds.

use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::VerifyError;

const CAPSOLVER_BASE: &str = "https://api.capsolver.com";

/// How long to poll for a solution before giving up.
const RESULT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct CaptchaClient {
    http: reqwest::Client,
    api_key: String,
}

impl CaptchaClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, VerifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }

    /// Solve a slide/puzzle CAPTCHA from a raw PNG screenshot. Returns the
    /// solution object (slide coordinates) or None when the solver fails.
    pub async fn solve_slide(&self, screenshot_png: &[u8]) -> Result<Option<Value>, VerifyError> {
        let image = base64::engine::general_purpose::STANDARD.encode(screenshot_png);
        let task_id = self
            .create_task("AntiSliderTaskByImage", json!({"image": image}))
            .await?;
        self.poll_result(&task_id, RESULT_TIMEOUT).await
    }

    /// Solve an image recognition CAPTCHA ("select all buses").
    pub async fn solve_image(
        &self,
        screenshot_png: &[u8],
        question: &str,
    ) -> Result<Option<Value>, VerifyError> {
        let image = base64::engine::general_purpose::STANDARD.encode(screenshot_png);
        let task_id = self
            .create_task(
                "ImageToTextTask",
                json!({"body": image, "question": question}),
            )
            .await?;
        self.poll_result(&task_id, RESULT_TIMEOUT).await
    }

    async fn create_task(&self, task_type: &str, mut params: Value) -> Result<String, VerifyError> {
        params["type"] = Value::String(task_type.to_string());
        let resp = self
            .http
            .post(format!("{CAPSOLVER_BASE}/createTask"))
            .json(&json!({"clientKey": self.api_key, "task": params}))
            .send()
            .await?;
        let body: Value = resp.json().await?;

        if body["errorId"].as_i64().unwrap_or(0) != 0 {
            return Err(VerifyError::Provider(format!(
                "createTask failed: {}",
                body["errorDescription"].as_str().unwrap_or("unknown")
            )));
        }
        body["taskId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VerifyError::Provider("createTask returned no taskId".into()))
    }

    async fn poll_result(
        &self,
        task_id: &str,
        timeout: Duration,
    ) -> Result<Option<Value>, VerifyError> {
        let deadline = tokio::time::Instant::now() + timeout;

        while tokio::time::Instant::now() < deadline {
            let result = self
                .http
                .post(format!("{CAPSOLVER_BASE}/getTaskResult"))
                .json(&json!({"clientKey": self.api_key, "taskId": task_id}))
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let body: Value = resp.json().await.unwrap_or(Value::Null);
                    match body["status"].as_str() {
                        Some("ready") => {
                            info!(task_id, "CAPTCHA solved");
                            return Ok(Some(body["solution"].clone()));
                        }
                        Some("failed") => {
                            warn!(
                                task_id,
                                error = body["errorDescription"].as_str().unwrap_or(""),
                                "CAPTCHA task failed"
                            );
                            return Ok(None);
                        }
                        _ => {}
                    }
                }
                Err(e) => warn!(error = %e, "Error polling CAPTCHA result"),
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        warn!(task_id, "CAPTCHA task timed out");
        Ok(None)
    }
}
