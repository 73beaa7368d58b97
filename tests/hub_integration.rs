//! Model acquisition tests against an in-process mock hub

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path as UrlPath, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use gguf_manager::models::{
    Downloader, HttpHubClient, HubClient, ModelManager, PullOutcome, RemoteSort,
};
use gguf_manager::store::Store;
use gguf_manager::{GgufError, GgufResult};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// =============================================================================
// Mock Hub
// =============================================================================

#[derive(Clone, Default)]
struct MockHub {
    queries: Arc<Mutex<Vec<String>>>,
}

async fn model_info(
    State(hub): State<MockHub>,
    UrlPath((namespace, name)): UrlPath<(String, String)>,
    RawQuery(query): RawQuery,
) -> Response {
    hub.queries.lock().unwrap().push(query.unwrap_or_default());

    let siblings = match name.as_str() {
        "Phi-2-GGUF" => json!([
            { "rfilename": "README.md" },
            { "rfilename": "phi-2.Q2_K.gguf" },
            { "rfilename": "phi-2.Q4_K_M.gguf" },
            { "rfilename": "phi-2.Q8_0.gguf" },
        ]),
        "NoQuant-GGUF" => json!([{ "rfilename": "model.Q8_0.gguf" }]),
        _ => return (StatusCode::NOT_FOUND, "{\"error\":\"Repository not found\"}").into_response(),
    };

    Json(json!({
        "modelId": format!("{}/{}", namespace, name),
        "tags": ["gguf"],
        "siblings": siblings,
        "downloads": 10,
        "likes": 2,
    }))
    .into_response()
}

async fn list_models(State(hub): State<MockHub>, RawQuery(query): RawQuery) -> Json<Value> {
    hub.queries.lock().unwrap().push(query.unwrap_or_default());

    let mut models: Vec<Value> = (0..25)
        .map(|i| {
            json!({
                "modelId": format!("org/model-{i}-GGUF"),
                "lastModified": "2024-03-01T12:00:00.000Z",
                "tags": ["gguf", "text-generation"],
                "downloads": 1000 - i,
                "likes": i,
            })
        })
        .collect();
    models.insert(
        0,
        json!({ "modelId": "org/not-tagged", "tags": ["pytorch"], "downloads": 5, "likes": 0 }),
    );
    Json(Value::Array(models))
}

async fn spawn_hub(hub: MockHub) -> String {
    let app = Router::new()
        .route("/api/models", get(list_models))
        .route("/api/models/{namespace}/{name}", get(model_info))
        .with_state(hub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// =============================================================================
// Test Downloader
// =============================================================================

/// Writes a fixed-size file instead of fetching anything
struct FileDownloader {
    size: usize,
}

#[async_trait]
impl Downloader for FileDownloader {
    async fn download(
        &self,
        _source_id: &str,
        file_name: &str,
        dest_dir: &Path,
    ) -> GgufResult<PathBuf> {
        let path = dest_dir.join(file_name);
        tokio::fs::write(&path, vec![0u8; self.size]).await?;
        Ok(path)
    }
}

fn manager(models_dir: PathBuf, hub_url: &str) -> ModelManager {
    ModelManager::new(
        models_dir,
        Arc::new(HttpHubClient::new(hub_url)),
        Arc::new(FileDownloader {
            size: 3 * 1024 * 1024,
        }),
    )
}

// =============================================================================
// Hub Client Tests
// =============================================================================

#[tokio::test]
async fn test_model_info_parses_manifest() {
    let hub = MockHub::default();
    let url = spawn_hub(hub.clone()).await;
    let client = HttpHubClient::new(format!("{}/", url));

    let model = client.model_info("TheBloke/Phi-2-GGUF").await.unwrap();

    assert_eq!(model.model_id, "TheBloke/Phi-2-GGUF");
    assert_eq!(model.siblings.len(), 4);
    assert!(model.has_tag("gguf"));
    assert_eq!(
        hub.queries.lock().unwrap().as_slice(),
        ["filter=gguf&sort=lastModified"]
    );
}

#[tokio::test]
async fn test_missing_repository_is_upstream_error() {
    let url = spawn_hub(MockHub::default()).await;
    let client = HttpHubClient::new(url);

    let err = client.model_info("nobody/nothing").await.unwrap_err();

    match err {
        GgufError::Upstream { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("Repository not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_list_remote_filters_and_limits() {
    let hub = MockHub::default();
    let url = spawn_hub(hub.clone()).await;
    let dir = TempDir::new().unwrap();
    let manager = manager(dir.path().to_path_buf(), &url);

    let recent = manager.list_remote(RemoteSort::LastModified).await.unwrap();
    let trending = manager.list_remote(RemoteSort::Downloads).await.unwrap();

    assert_eq!(recent.len(), 20);
    assert!(recent.iter().all(|m| m.has_tag("gguf")));
    assert_eq!(recent[0].model_id, "org/model-0-GGUF");
    assert_eq!(trending.len(), 20);
    assert_eq!(
        hub.queries.lock().unwrap().as_slice(),
        ["filter=gguf&sort=lastModified", "filter=gguf&sort=downloads"]
    );
}

// =============================================================================
// Pull Tests
// =============================================================================

#[tokio::test]
async fn test_pull_records_selected_file() {
    let url = spawn_hub(MockHub::default()).await;
    let dir = TempDir::new().unwrap();
    let models_dir = dir.path().join("models");
    let manager = manager(models_dir.clone(), &url);
    let store = Store::open(&dir.path().join("llm-cli.db")).unwrap();

    let outcome = manager.pull(&store, "TheBloke/Phi-2-GGUF").await.unwrap();

    let PullOutcome::Downloaded(record) = outcome else {
        panic!("expected a download");
    };
    assert_eq!(record.slug, "thebloke-phi-2-gguf");
    assert_eq!(record.file_name, "phi-2.Q4_K_M.gguf");
    assert_eq!(record.file_size, "3M");
    assert_eq!(
        record.file_path,
        models_dir.join("TheBloke/Phi-2-GGUF/phi-2.Q4_K_M.gguf")
    );
    assert!(record.file_path.exists());
    assert_eq!(store.list().unwrap(), vec![record]);
}

#[tokio::test]
async fn test_pull_twice_skips_download() {
    let url = spawn_hub(MockHub::default()).await;
    let dir = TempDir::new().unwrap();
    let manager = manager(dir.path().join("models"), &url);
    let store = Store::open_in_memory().unwrap();

    manager.pull(&store, "TheBloke/Phi-2-GGUF").await.unwrap();
    let second = manager.pull(&store, "TheBloke/Phi-2-GGUF").await.unwrap();

    assert!(matches!(second, PullOutcome::AlreadyPresent(_)));
    assert_eq!(store.list().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pull_without_quantized_file_creates_nothing() {
    let url = spawn_hub(MockHub::default()).await;
    let dir = TempDir::new().unwrap();
    let models_dir = dir.path().join("models");
    let manager = manager(models_dir.clone(), &url);
    let store = Store::open_in_memory().unwrap();

    let err = manager.pull(&store, "acme/NoQuant-GGUF").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(!models_dir.join("acme/NoQuant-GGUF").exists());
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_pull_then_import_after_reset() {
    let url = spawn_hub(MockHub::default()).await;
    let dir = TempDir::new().unwrap();
    let manager = manager(dir.path().join("models"), &url);
    let store = Store::open(&dir.path().join("llm-cli.db")).unwrap();

    manager.pull(&store, "TheBloke/Phi-2-GGUF").await.unwrap();
    manager.alias(&store, "thebloke-phi-2-gguf", "phi").unwrap();

    let (store, report) = manager.reset(store).unwrap();

    // Custom slugs do not survive a reset
    assert_eq!(report.imported, vec!["thebloke-phi-2-gguf".to_string()]);
    assert!(store.get("phi").unwrap_err().is_not_found());
    assert_eq!(
        store.get("thebloke-phi-2-gguf").unwrap().source_id,
        "TheBloke/Phi-2-GGUF"
    );
}
