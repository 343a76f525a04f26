//! Reqwest transport for the automation agent.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::driver::{ScreenSize, Strategy, UiDriver};
use super::AgentError;

/// App state values reported by the agent.
pub const APP_STATE_NOT_RUNNING: i64 = 1;
pub const APP_STATE_FOREGROUND: i64 = 4;

/// Timeout for gesture endpoints. Gestures execute fast on-device; the agent
/// is just slow to answer when the app UI is heavy.
const GESTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for heavy endpoints (page source, screenshots, installs).
const HEAVY_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-device agent endpoint, pre-session.
#[derive(Clone)]
pub struct AgentClient {
    base_url: String,
    heavy: reqwest::Client,
    gesture: reqwest::Client,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentError> {
        let heavy = reqwest::Client::builder().timeout(HEAVY_TIMEOUT).build()?;
        let gesture = reqwest::Client::builder().timeout(GESTURE_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            heavy,
            gesture,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Health probe: 200 from `/status` with a ready flag.
    pub async fn is_ready(&self) -> bool {
        let url = format!("{}/status", self.base_url);
        match self.gesture.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v["value"]["ready"].as_bool())
                .unwrap_or(true),
            _ => false,
        }
    }

    /// Begin an automation session and cache screen geometry.
    pub async fn create_session(&self) -> Result<AgentSession, AgentError> {
        let url = format!("{}/session", self.base_url);
        let resp = self
            .heavy
            .post(&url)
            .json(&json!({"capabilities": {"alwaysMatch": {}}}))
            .send()
            .await?;
        let body = check_status(resp).await?;

        let session_id = body["sessionId"]
            .as_str()
            .or_else(|| body["value"]["sessionId"].as_str())
            .ok_or_else(|| AgentError::Protocol(format!("no sessionId in {body}")))?
            .to_string();

        let mut session = AgentSession {
            client: self.clone(),
            session_id,
            screen: ScreenSize::DEFAULT,
        };
        session.screen = session.fetch_screen_size().await;
        info!(
            session = %&session.session_id[..session.session_id.len().min(8)],
            agent = %self.base_url,
            "Agent session created"
        );
        Ok(session)
    }
}

/// One automation session on one device.
pub struct AgentSession {
    client: AgentClient,
    session_id: String,
    screen: ScreenSize,
}

impl AgentSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.client.base_url, self.session_id, path)
    }

    /// End the session. Best effort; the agent reaps stale sessions anyway.
    pub async fn close(self) {
        let url = format!("{}/session/{}", self.client.base_url, self.session_id);
        if let Err(e) = self.client.gesture.delete(&url).send().await {
            debug!(error = %e, "Failed to delete agent session");
        }
    }

    async fn fetch_screen_size(&self) -> ScreenSize {
        let url = self.url("/window/size");
        let result = async {
            let resp = self.client.heavy.get(&url).send().await?;
            let body = check_status(resp).await?;
            let value = &body["value"];
            match (value["width"].as_i64(), value["height"].as_i64()) {
                (Some(width), Some(height)) => Ok(ScreenSize { width, height }),
                _ => Err(AgentError::Protocol(format!("bad window size: {value}"))),
            }
        }
        .await;

        match result {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "Could not read screen size, using default");
                ScreenSize::DEFAULT
            }
        }
    }

    /// Heavy page-source read. Outside tight loops only.
    pub async fn page_source(&self) -> Result<String, AgentError> {
        let resp = self.client.heavy.get(self.url("/source")).send().await?;
        let body = check_status(resp).await?;
        body["value"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AgentError::Protocol("source response had no value".into()))
    }

    async fn post_gesture(&self, path: &str, payload: Value) -> Result<(), AgentError> {
        let result = self
            .client
            .gesture
            .post(self.url(path))
            .json(&payload)
            .send()
            .await;
        match result {
            Ok(resp) => {
                check_status(resp).await?;
                Ok(())
            }
            // The gesture usually executed even when the response timed out.
            Err(e) if e.is_timeout() => {
                warn!(path, "Gesture timed out (likely executed)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn post_heavy(&self, path: &str, payload: Value) -> Result<Value, AgentError> {
        let resp = self
            .client
            .heavy
            .post(self.url(path))
            .json(&payload)
            .send()
            .await?;
        check_status(resp).await
    }
}

/// Map non-2xx responses to a typed error, otherwise parse the JSON body.
async fn check_status(resp: reqwest::Response) -> Result<Value, AgentError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AgentError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }
    Ok(resp.json::<Value>().await.unwrap_or(Value::Null))
}

fn pointer_actions(moves: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": {"pointerType": "touch"},
            "actions": moves,
        }]
    })
}

#[async_trait]
impl UiDriver for AgentSession {
    async fn activate_app(&self, bundle_id: &str) -> Result<(), AgentError> {
        self.post_gesture("/wda/apps/activate", json!({"bundleId": bundle_id}))
            .await
    }

    async fn terminate_app(&self, bundle_id: &str) -> Result<(), AgentError> {
        self.post_gesture("/wda/apps/terminate", json!({"bundleId": bundle_id}))
            .await
    }

    async fn uninstall_app(&self, bundle_id: &str) -> Result<bool, AgentError> {
        let result = self
            .post_heavy("/wda/apps/uninstall", json!({"bundleId": bundle_id}))
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(AgentError::Status { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn app_state(&self, bundle_id: &str) -> Result<i64, AgentError> {
        let body = self
            .post_heavy("/wda/apps/state", json!({"bundleId": bundle_id}))
            .await?;
        body["value"]
            .as_i64()
            .ok_or_else(|| AgentError::Protocol(format!("bad app state: {body}")))
    }

    async fn find_element(
        &self,
        strategy: Strategy,
        value: &str,
    ) -> Result<Option<String>, AgentError> {
        let result = self
            .post_heavy(
                "/element",
                json!({"using": strategy.as_str(), "value": value}),
            )
            .await;
        let body = match result {
            Ok(body) => body,
            // Element-not-found surfaces as a WebDriver error status
            Err(AgentError::Status { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let element = &body["value"];
        let id = element["ELEMENT"]
            .as_str()
            .or_else(|| element["element-6066-11e4-a52e-4f735466cecf"].as_str());
        Ok(id.map(str::to_string))
    }

    async fn click_element(&self, element_id: &str) -> Result<(), AgentError> {
        self.post_gesture(&format!("/element/{element_id}/click"), json!({}))
            .await
    }

    async fn set_element_value(&self, element_id: &str, text: &str) -> Result<(), AgentError> {
        let chars: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        self.post_heavy(
            &format!("/element/{element_id}/value"),
            json!({"value": chars}),
        )
        .await?;
        Ok(())
    }

    async fn touch_and_hold(
        &self,
        element_id: &str,
        duration_secs: f64,
    ) -> Result<(), AgentError> {
        self.post_heavy(
            &format!("/wda/element/{element_id}/touchAndHold"),
            json!({"duration": duration_secs}),
        )
        .await?;
        Ok(())
    }

    async fn tap(&self, x: i64, y: i64) -> Result<(), AgentError> {
        self.post_gesture(
            "/actions",
            pointer_actions(vec![
                json!({"type": "pointerMove", "duration": 0, "x": x, "y": y}),
                json!({"type": "pointerDown", "button": 0}),
                json!({"type": "pause", "duration": 50}),
                json!({"type": "pointerUp", "button": 0}),
            ]),
        )
        .await
    }

    async fn double_tap(&self, x: i64, y: i64) -> Result<(), AgentError> {
        self.post_gesture(
            "/actions",
            pointer_actions(vec![
                json!({"type": "pointerMove", "duration": 0, "x": x, "y": y}),
                json!({"type": "pointerDown", "button": 0}),
                json!({"type": "pointerUp", "button": 0}),
                json!({"type": "pause", "duration": 40}),
                json!({"type": "pointerDown", "button": 0}),
                json!({"type": "pointerUp", "button": 0}),
            ]),
        )
        .await
    }

    async fn swipe(
        &self,
        from: (i64, i64),
        to: (i64, i64),
        duration_secs: f64,
    ) -> Result<(), AgentError> {
        self.post_gesture(
            "/wda/dragfromtoforduration",
            json!({
                "fromX": from.0, "fromY": from.1,
                "toX": to.0, "toY": to.1,
                "duration": duration_secs,
            }),
        )
        .await
    }

    fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    async fn alert_text(&self) -> Result<Option<String>, AgentError> {
        let result = self.client.gesture.get(self.url("/alert/text")).send().await;
        let resp = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !resp.status().is_success() {
            // No alert present
            return Ok(None);
        }
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        match &body["value"] {
            Value::String(text) => Ok(Some(text.clone())),
            _ => Ok(None),
        }
    }

    async fn accept_alert(&self) -> Result<bool, AgentError> {
        match self.post_gesture("/alert/accept", json!({})).await {
            Ok(()) => Ok(true),
            Err(AgentError::Status { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn dismiss_alert(&self) -> Result<bool, AgentError> {
        match self.post_gesture("/alert/dismiss", json!({})).await {
            Ok(()) => Ok(true),
            Err(AgentError::Status { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn press_button(&self, name: &str) -> Result<(), AgentError> {
        self.post_gesture("/wda/pressButton", json!({"name": name}))
            .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        let resp = self
            .client
            .heavy
            .get(self.url("/screenshot"))
            .send()
            .await?;
        let body = check_status(resp).await?;
        let b64 = body["value"]
            .as_str()
            .ok_or_else(|| AgentError::Protocol("screenshot response had no value".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| AgentError::Protocol(format!("screenshot is not valid base64: {e}")))
    }
}
