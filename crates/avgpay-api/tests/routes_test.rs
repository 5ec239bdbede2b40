//! Route tests against a live server on an ephemeral port, backed by the
//! in-memory store and scripted model backends.

use std::sync::Arc;

use serde_json::{json, Value};

use avgpay_api::{router, AppConfig, AppState};
use avgpay_core::{EnrichmentQueue, EntityType};
use avgpay_db::MemoryStore;
use avgpay_inference::mock::ScriptedBackend;
use avgpay_inference::{FallbackClient, GenerationBackend};

fn city_analysis() -> String {
    json!({
        "summary": "Denver pairs a strong outdoor lifestyle with a maturing tech scene.",
        "costOfLiving": "Housing is the largest expense and rents have climbed steadily.",
        "jobMarket": "Aerospace, fintech and SaaS employers drive most engineering demand.",
        "compensationTrends": "Salaries trail the coasts but have grown faster than inflation."
    })
    .to_string()
}

async fn spawn_app(config: AppConfig, backend: ScriptedBackend) -> (String, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let chain: Vec<Arc<dyn GenerationBackend>> = vec![Arc::new(backend)];
    let state = AppState::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FallbackClient::new(chain)),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    (format!("http://{}", addr), store)
}

fn idle_backend() -> ScriptedBackend {
    ScriptedBackend::new("anthropic", "haiku")
}

#[tokio::test]
async fn test_health_is_public() {
    let config = AppConfig::default().with_secret("top-secret");
    let (base, _store) = spawn_app(config, idle_backend()).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_require_matching_bearer() {
    let config = AppConfig::default().with_secret("top-secret");
    let (base, _store) = spawn_app(config, idle_backend()).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/enrichment/process", base);

    let resp = client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");

    let resp = client
        .post(&url)
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(&url)
        .bearer_auth("top-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "processed": false }));
}

#[tokio::test]
async fn test_open_access_without_secrets_outside_production() {
    let (base, _store) = spawn_app(AppConfig::default(), idle_backend()).await;
    let resp = reqwest::Client::new()
        .get(format!("{}/api/cron/enrichment", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let config = AppConfig::default().with_app_env("production");
    let (base, _store) = spawn_app(config, idle_backend()).await;
    let resp = reqwest::Client::new()
        .get(format!("{}/api/cron/enrichment", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_queue_then_process_then_status() {
    let backend = ScriptedBackend::new("openai", "gpt-4o-mini").reply(city_analysis());
    let (base, store) = spawn_app(AppConfig::default(), backend).await;
    let client = reqwest::Client::new();
    let id = store.add_entity(EntityType::City, "Denver, CO");

    let resp = client
        .post(format!("{}/api/enrichment/queue", base))
        .json(&json!({ "entityType": "city", "entityId": id, "entityName": "Denver, CO" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["queued"], true);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    // Second enqueue while pending is de-duplicated.
    let body: Value = client
        .post(format!("{}/api/enrichment/queue", base))
        .json(&json!({ "entityType": "city", "entityId": id, "entityName": "Denver, CO" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "jobId": null, "queued": false }));

    let body: Value = client
        .post(format!("{}/api/enrichment/process", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["processed"], true);
    assert_eq!(body["jobId"], job_id.as_str());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["entityType"], "city");

    let body: Value = client
        .get(format!("{}/api/enrichment/status/city/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["entityKey"], format!("city:{}", id));
    assert_eq!(body["attempts"], 1);

    let body: Value = client
        .get(format!("{}/api/enrichment/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["queue"]["completed"], 1);
    assert_eq!(body["coverage"][1]["entityType"], "city");
    assert_eq!(body["coverage"][1]["withAnalysis"], 1);
}

#[tokio::test]
async fn test_status_for_unknown_entity_is_null() {
    let (base, _store) = spawn_app(AppConfig::default(), idle_backend()).await;
    let resp = reqwest::get(format!(
        "{}/api/enrichment/status/company/{}",
        base,
        uuid::Uuid::now_v7()
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body.is_null());
}

#[tokio::test]
async fn test_invalid_input_returns_400() {
    let (base, _store) = spawn_app(AppConfig::default(), idle_backend()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/enrichment/status/planet/{}", base, uuid::Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/enrichment/queue", base))
        .json(&json!({ "entityType": "company", "entityId": "not-a-uuid", "entityName": "X" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/enrichment/recover?limit=0", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_failed_job_returns_200_with_error() {
    let backend = ScriptedBackend::new("anthropic", "haiku").fail_api("HTTP 529 overloaded");
    let (base, store) = spawn_app(AppConfig::default(), backend).await;
    let id = store.add_entity(EntityType::Company, "Initech");
    store
        .queue_enrichment(EntityType::Company, id, "Initech", None)
        .await
        .unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/api/enrichment/process", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "failed");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("All 1 models failed"));

    let jobs: Value = reqwest::get(format!("{}/api/enrichment/jobs?limit=5", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["status"], "failed");
    assert!(jobs[0]["lastError"].as_str().unwrap().contains("api_error"));
}

#[tokio::test]
async fn test_store_outage_returns_500() {
    let (base, store) = spawn_app(AppConfig::default(), idle_backend()).await;
    store.set_unavailable(true);

    let resp = reqwest::Client::new()
        .post(format!("{}/api/enrichment/process-all", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Database error"));
}

#[tokio::test]
async fn test_backfill_honors_limit() {
    let (base, store) = spawn_app(AppConfig::default(), idle_backend()).await;
    for name in ["Alpha", "Beta", "Gamma"] {
        store.add_entity(EntityType::Company, name);
    }

    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/enrichment/backfill?limit=2", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["queued"]["company"], 2);
    assert_eq!(body["skipped"], 0);
    assert_eq!(store.jobs().len(), 2);
}

#[tokio::test]
async fn test_trigger_is_accepted_and_queues_in_background() {
    let (base, store) = spawn_app(AppConfig::default(), idle_backend()).await;
    let id = store.add_entity(EntityType::Job, "Data Engineer");

    let resp = reqwest::Client::new()
        .post(format!("{}/api/enrichment/trigger", base))
        .json(&json!({ "entityType": "job", "entityId": id, "source": "job_page" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    // The evaluation runs detached from the request.
    for _ in 0..50 {
        if !store.jobs().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let jobs = store.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].context.as_ref().unwrap()["source"], "job_page");
}
