//! Fire-and-forget notifications to n8n workflows.

use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct N8nClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl N8nClient {
    /// `base_url` of `None` disables notifications.
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    fn workflow_url(&self, workflow: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{base}/{}", workflow.trim_start_matches('/')))
    }

    /// POST `data` to `{base}/{workflow}`. Failures are logged and yield `None`.
    pub async fn trigger(&self, workflow: &str, data: &Value) -> Option<Value> {
        let url = self.workflow_url(workflow)?;
        let result = async {
            let resp = self.client.post(&url).json(data).send().await?;
            let resp = resp.error_for_status()?;
            let status = resp.status().as_u16();
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;

        match result {
            Ok((status, body)) => {
                info!(workflow, status, "n8n webhook triggered");
                Some(body)
            }
            Err(e) => {
                error!(workflow, error = %e, "n8n webhook error");
                None
            }
        }
    }

    pub async fn notify_message_received(&self, message_id: &str) -> Option<Value> {
        self.trigger(
            "crm/message-received",
            &serde_json::json!({ "message_id": message_id }),
        )
        .await
    }
}
