//! Minimal Algolia REST client
//!
//! Covers what job indexing needs: index settings, batch writes, index
//! operations (copy/move) and waiting on asynchronous tasks.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use taxonomy_common::config::AlgoliaConfig;
use thiserror::Error;

/// Objects sent per batch request
pub const BATCH_SIZE: usize = 1000;

const TASK_POLL_INTERVAL: Duration = Duration::from_millis(200);
const TASK_POLL_ATTEMPTS: u32 = 300;

#[derive(Debug, Error)]
pub enum AlgoliaError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Algolia API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Algolia task {0} did not publish in time")]
    TaskTimeout(i64),
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(rename = "taskID")]
    task_id: i64,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
}

pub struct AlgoliaClient {
    http: reqwest::Client,
    base_url: String,
    application_id: String,
    api_key: String,
    index_name: String,
}

impl AlgoliaClient {
    pub fn new(config: &AlgoliaConfig) -> Result<Self, AlgoliaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AlgoliaError::Network(e.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.algolia.net", config.application_id));

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            application_id: config.application_id.clone(),
            api_key: config.api_key.clone(),
            index_name: config.index_name.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn index_url(&self, index: &str, path: &str) -> String {
        format!("{}/1/indexes/{}{}", self.base_url, index, path)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, AlgoliaError> {
        let mut request = self
            .http
            .request(method, url)
            .header("X-Algolia-Application-Id", &self.application_id)
            .header("X-Algolia-API-Key", &self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AlgoliaError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlgoliaError::Api(status.as_u16(), body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AlgoliaError::Parse(e.to_string()))
    }

    async fn send_task(
        &self,
        method: reqwest::Method,
        index: &str,
        url: &str,
        body: &Value,
    ) -> Result<(), AlgoliaError> {
        let response = self.send(method, url, Some(body)).await?;
        let task: TaskResponse =
            serde_json::from_value(response).map_err(|e| AlgoliaError::Parse(e.to_string()))?;
        self.wait_task(index, task.task_id).await
    }

    async fn wait_task(&self, index: &str, task_id: i64) -> Result<(), AlgoliaError> {
        let url = self.index_url(index, &format!("/task/{}", task_id));
        for _ in 0..TASK_POLL_ATTEMPTS {
            let response = self.send(reqwest::Method::GET, &url, None).await?;
            let status: TaskStatus =
                serde_json::from_value(response).map_err(|e| AlgoliaError::Parse(e.to_string()))?;
            if status.status == "published" {
                return Ok(());
            }
            tokio::time::sleep(TASK_POLL_INTERVAL).await;
        }
        Err(AlgoliaError::TaskTimeout(task_id))
    }

    /// Overwrite the live index settings
    pub async fn set_index_settings(&self, settings: &Value) -> Result<(), AlgoliaError> {
        let url = self.index_url(&self.index_name, "/settings");
        self.send_task(reqwest::Method::PUT, &self.index_name, &url, settings)
            .await
    }

    /// Replace every object of the live index without downtime
    ///
    /// Objects are written to a temporary index carrying the live settings,
    /// which is then moved over the live index.
    pub async fn replace_all_objects(&self, objects: &[Value]) -> Result<(), AlgoliaError> {
        let tmp_index = format!("{}_tmp", self.index_name);

        let copy_url = self.index_url(&self.index_name, "/operation");
        let copy = json!({
            "operation": "copy",
            "destination": tmp_index,
            "scope": ["settings", "synonyms", "rules"],
        });
        self.send_task(reqwest::Method::POST, &self.index_name, &copy_url, &copy)
            .await?;

        let batch_url = self.index_url(&tmp_index, "/batch");
        for chunk in objects.chunks(BATCH_SIZE) {
            let requests: Vec<Value> = chunk
                .iter()
                .map(|body| json!({ "action": "addObject", "body": body }))
                .collect();
            self.send_task(
                reqwest::Method::POST,
                &tmp_index,
                &batch_url,
                &json!({ "requests": requests }),
            )
            .await?;
        }

        let move_url = self.index_url(&tmp_index, "/operation");
        let move_op = json!({ "operation": "move", "destination": self.index_name });
        self.send_task(reqwest::Method::POST, &tmp_index, &move_url, &move_op)
            .await?;

        tracing::info!(
            index = %self.index_name,
            objects = objects.len(),
            "Algolia index replaced"
        );
        Ok(())
    }
}
