//! Shared fixtures for taxonomy-connector integration tests
//!
//! - in-memory SQLite with the full schema
//! - an axum stub of the vendor token, skills and job postings APIs
//! - a catalog provider that counts `get_products` calls

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taxonomy_common::db::ProductType;
use taxonomy_connector::providers::{
    ContentProvider, CourseRunContent, IndustryContent, JsonCatalogProvider, ProductContent,
};
use taxonomy_connector::utils::retry::RetryPolicy;
use taxonomy_connector::vendor::{VendorClient, VendorCredentials, VendorSettings};

pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    taxonomy_common::db::init_schema(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Behavior switches and call counters of the stub vendor
#[derive(Default)]
pub struct StubVendorState {
    pub token_calls: AtomicUsize,
    pub extract_calls: AtomicUsize,
    pub ranking_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    /// Token endpoint answers 401
    pub reject_credentials: AtomicBool,
    /// Extract endpoint answers 429
    pub rate_limit_extract: AtomicBool,
    /// Extract endpoint answers 500 for texts containing "boom"
    pub fail_on_boom: AtomicBool,
    /// 1-based ranking call that answers 500; 0 for none
    pub fail_ranking_call: AtomicUsize,
    /// Skill details carry the placeholder category "NONE"
    pub invalid_category: AtomicBool,
    /// Number of the issued token the data endpoints reject with 401; 0 for none
    pub revoked_token: AtomicUsize,
    pub details_calls: AtomicUsize,
}

pub struct StubVendor {
    pub base_url: String,
    pub state: Arc<StubVendorState>,
}

impl StubVendor {
    pub fn settings(&self) -> VendorSettings {
        VendorSettings {
            access_token_url: format!("{}/oauth/token", self.base_url),
            api_base_url: self.base_url.clone(),
            token_expiry_threshold_secs: 60,
            rate_limit_per_sec: 1000,
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn client(&self) -> Arc<VendorClient> {
        Arc::new(
            VendorClient::new(
                self.settings(),
                VendorCredentials {
                    client_id: "test-client".to_string(),
                    client_secret: "test-secret".to_string(),
                },
            )
            .expect("vendor client"),
        )
    }

    pub fn extract_calls(&self) -> usize {
        self.state.extract_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn ranking_calls(&self) -> usize {
        self.state.ranking_calls.load(Ordering::SeqCst)
    }
}

/// Skill id the stub assigns to a word of extracted text
pub fn skill_id_for(word: &str) -> String {
    format!("KS-{}", word.to_ascii_lowercase())
}

async fn token(State(state): State<Arc<StubVendorState>>) -> Response {
    let n = state.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if state.reject_credentials.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "invalid_client").into_response();
    }
    Json(json!({"access_token": format!("token-{}", n), "expires_in": 3600})).into_response()
}

/// One skill per distinct word of the text, confidence by word length
async fn extract(State(state): State<Arc<StubVendorState>>, Json(body): Json<Value>) -> Response {
    state.extract_calls.fetch_add(1, Ordering::SeqCst);
    if state.rate_limit_extract.load(Ordering::SeqCst) {
        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
    }

    let text = body["text"].as_str().unwrap_or_default();
    if state.fail_on_boom.load(Ordering::SeqCst) && text.contains("boom") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }

    let mut words: Vec<&str> = text.split_whitespace().collect();
    words.sort_unstable();
    words.dedup();
    let data: Vec<Value> = words
        .into_iter()
        .map(|word| {
            json!({
                "confidence": (word.len() as f64 / 10.0).min(1.0),
                "skill": {
                    "id": skill_id_for(word),
                    "name": word,
                    "infoUrl": format!("https://skills.example/{}", word),
                    "type": {"id": "ST1", "name": "Specialized Skill"},
                    "tags": [{"key": "wikipediaExtract", "value": format!("About {}", word)}]
                }
            })
        })
        .collect();
    Json(json!({ "data": data })).into_response()
}

async fn skill_details(
    State(state): State<Arc<StubVendorState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.details_calls.fetch_add(1, Ordering::SeqCst);
    let revoked = state.revoked_token.load(Ordering::SeqCst);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if revoked != 0 && bearer == format!("Bearer token-{}", revoked) {
        return (StatusCode::UNAUTHORIZED, "token revoked").into_response();
    }

    if state.invalid_category.load(Ordering::SeqCst) {
        return Json(json!({"data": {"id": id, "category": {"name": "NONE"}}})).into_response();
    }
    Json(json!({
        "data": {
            "id": id,
            "category": {"id": 1, "name": "Information Technology"},
            "subcategory": {"id": 2, "name": "Software Development"}
        }
    }))
    .into_response()
}

/// Two jobs, each ranking every requested skill
async fn job_rankings(State(state): State<Arc<StubVendorState>>, Json(body): Json<Value>) -> Response {
    let call = state.ranking_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if state.fail_ranking_call.load(Ordering::SeqCst) == call {
        return (StatusCode::INTERNAL_SERVER_ERROR, "ranking failed").into_response();
    }
    let skills: Vec<Value> = body["filter"]["skills"]["include"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let nested: Vec<Value> = skills
        .iter()
        .enumerate()
        .map(|(i, id)| json!({"name": id, "significance": 10.0 - i as f64, "unique_postings": 100 + i}))
        .collect();

    Json(json!({
        "data": {
            "ranking": {
                "buckets": [
                    {"name": "ET1", "unique_postings": 500, "ranking": {"buckets": nested}},
                    {"name": "ET2", "unique_postings": 300, "ranking": {"buckets": nested}}
                ]
            }
        }
    }))
    .into_response()
}

async fn posting_rankings(State(state): State<Arc<StubVendorState>>, Json(body): Json<Value>) -> Response {
    let call = state.ranking_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if state.fail_ranking_call.load(Ordering::SeqCst) == call {
        return (StatusCode::INTERNAL_SERVER_ERROR, "ranking failed").into_response();
    }
    let ids: Vec<Value> = body["filter"]["title"]["include"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let buckets: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "name": id,
                "median_salary": "$45000.34",
                "median_posting_duration": 30,
                "unique_postings": "120",
                "unique_companies": 12
            })
        })
        .collect();
    Json(json!({"data": {"ranking": {"buckets": buckets}}})).into_response()
}

/// ET1 and ET2 resolve to distinct titles; every other id reuses ET1's title
async fn lookup(State(state): State<Arc<StubVendorState>>, Json(body): Json<Value>) -> Json<Value> {
    state.lookup_calls.fetch_add(1, Ordering::SeqCst);
    let ids: Vec<String> = body["ids"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let data: Vec<Value> = ids
        .iter()
        .map(|id| {
            let name = match id.as_str() {
                "ET2" => "Data Analyst",
                _ => "Software Engineer",
            };
            json!({"id": id, "name": name, "properties": {"singular_name": name}})
        })
        .collect();
    Json(json!({ "data": data }))
}

/// Start the stub vendor on an ephemeral port
pub async fn start_stub_vendor() -> StubVendor {
    let state = Arc::new(StubVendorState::default());
    let app = Router::new()
        .route("/oauth/token", post(token))
        .route("/skills/versions/8.9/extract", post(extract))
        .route("/skills/versions/8.9/skills/:id", get(skill_details))
        .route("/jpa/rankings/title/rankings/skills", post(job_rankings))
        .route("/jpa/rankings/title", post(posting_rankings))
        .route("/jpa/taxonomies/title/lookup", post(lookup))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub vendor");
    let addr = listener.local_addr().expect("stub vendor address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    StubVendor {
        base_url: format!("http://{}", addr),
        state,
    }
}

/// Catalog provider wrapper counting `get_products` calls
pub struct CountingProvider {
    inner: JsonCatalogProvider,
    pub get_products_calls: AtomicUsize,
}

impl CountingProvider {
    pub fn from_json(catalog: Value) -> Arc<Self> {
        let catalog = serde_json::from_value(catalog).expect("catalog json");
        Arc::new(Self {
            inner: JsonCatalogProvider::new(catalog),
            get_products_calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.get_products_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for CountingProvider {
    async fn product_keys(&self, product_type: ProductType) -> taxonomy_common::Result<Vec<String>> {
        self.inner.product_keys(product_type).await
    }

    async fn get_products(
        &self,
        product_type: ProductType,
        keys: &[String],
    ) -> taxonomy_common::Result<Vec<ProductContent>> {
        self.get_products_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_products(product_type, keys).await
    }

    async fn get_all_xblocks_in_course(
        &self,
        course_run_key: &str,
    ) -> taxonomy_common::Result<Vec<ProductContent>> {
        self.inner.get_all_xblocks_in_course(course_run_key).await
    }

    async fn get_all_published_course_runs(&self) -> taxonomy_common::Result<Vec<CourseRunContent>> {
        self.inner.get_all_published_course_runs().await
    }

    async fn industries(&self) -> taxonomy_common::Result<Vec<IndustryContent>> {
        self.inner.industries().await
    }
}

/// Catalog with `n` courses whose descriptions name two skills each
pub fn course_catalog(n: usize) -> Value {
    let courses: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "key": format!("course-v1:edX+C{}+2024", i),
                "short_description": format!("rust topic{}", i),
                "full_description": ""
            })
        })
        .collect();
    json!({ "courses": courses })
}
