use crate::config::Config;
use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use modreg_core::{
    InstalledModule, MetadataStore, ModuleRecord, RegistryError, updated_modules,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub store: Arc<MetadataStore>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateModuleRequest {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SetMetaRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    package: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize)]
struct ModuleResponse {
    id: String,
    name: String,
    description: String,
    package: String,
    version_count: u32,
    active_version: u32,
    versions: BTreeMap<u32, String>,
}

impl ModuleResponse {
    fn from_record(id: &str, record: &ModuleRecord) -> Self {
        Self {
            id: id.to_string(),
            name: record.meta.name.clone(),
            description: record.meta.description.clone(),
            package: record.meta.package.clone(),
            version_count: record.version_count,
            active_version: record.active_version,
            versions: record
                .versions
                .iter()
                .map(|(version, timestamp)| (*version, timestamp.to_rfc3339()))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AddVersionResponse {
    id: String,
    version: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    installed_modules: Vec<InstalledModule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    updated_modules: Vec<InstalledModule>,
}

fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    let resp = ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    };
    (status, Json(resp)).into_response()
}

fn failure(err: &RegistryError) -> Response {
    let status = match err {
        RegistryError::ModuleNotFound(_) | RegistryError::BlobRead { .. } => StatusCode::NOT_FOUND,
        RegistryError::ModuleExists(_) => StatusCode::CONFLICT,
        RegistryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RegistryError::Persistence(_)
        | RegistryError::BlobWrite { .. }
        | RegistryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let resp = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(err.to_string()),
    };
    (status, Json(resp)).into_response()
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(MetadataStore::open(&config.data_dir).await?);
    let state = Arc::new(ServerState { store });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/modules", get(list_modules).post(create_module))
        .route("/modules/:id", get(get_module))
        .route("/modules/:id/versions", post(add_version))
        .route(
            "/modules/:id/versions/:version/activate",
            post(set_active_version),
        )
        .route("/modules/:id/meta", put(set_meta))
        .route("/modules/:id/active", get(active_version_content))
        .route("/sync", post(sync))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let registry = state.store.list_modules().await;

    let response = serde_json::json!({
        "status": "ok",
        "modules_count": registry.modules.len(),
    });

    (StatusCode::OK, Json(response))
}

async fn list_modules(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let registry = state.store.list_modules().await;

    let modules: Vec<ModuleResponse> = registry
        .modules
        .iter()
        .map(|(id, record)| ModuleResponse::from_record(id, record))
        .collect();

    success(StatusCode::OK, modules)
}

async fn create_module(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateModuleRequest>,
) -> impl IntoResponse {
    match state.store.create_module(&request.id).await {
        Ok(()) => success(StatusCode::CREATED, serde_json::json!({ "id": request.id })),
        Err(e) => {
            tracing::warn!("Failed to create module {}: {}", request.id, e);
            failure(&e)
        }
    }
}

async fn get_module(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let registry = state.store.list_modules().await;

    match registry.modules.get(&id) {
        Some(record) => success(StatusCode::OK, ModuleResponse::from_record(&id, record)),
        None => failure(&RegistryError::ModuleNotFound(id)),
    }
}

async fn add_version(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let content = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => match field.bytes().await {
                Ok(bytes) => break bytes,
                Err(e) => {
                    return failure(&RegistryError::InvalidRequest(format!(
                        "failed to read upload: {}",
                        e
                    )));
                }
            },
            Ok(Some(_)) => continue,
            Ok(None) => {
                return failure(&RegistryError::InvalidRequest(
                    "missing multipart field 'file'".to_string(),
                ));
            }
            Err(e) => {
                return failure(&RegistryError::InvalidRequest(format!(
                    "malformed multipart body: {}",
                    e
                )));
            }
        }
    };

    match state.store.add_version(&id, chrono::Utc::now(), content).await {
        Ok(version) => success(StatusCode::CREATED, AddVersionResponse { id, version }),
        Err(e) => {
            tracing::warn!("Failed to add version to module {}: {}", id, e);
            failure(&e)
        }
    }
}

async fn set_active_version(
    State(state): State<Arc<ServerState>>,
    Path((id, version)): Path<(String, u32)>,
) -> impl IntoResponse {
    match state.store.set_active_version(&id, version).await {
        Ok(()) => success(
            StatusCode::OK,
            serde_json::json!({ "id": id, "active_version": version }),
        ),
        Err(e) => {
            tracing::warn!("Failed to set active version of module {}: {}", id, e);
            failure(&e)
        }
    }
}

async fn set_meta(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(request): Json<SetMetaRequest>,
) -> impl IntoResponse {
    match state
        .store
        .set_meta(&id, &request.name, &request.package, &request.description)
        .await
    {
        Ok(()) => success(StatusCode::OK, serde_json::json!({ "id": id })),
        Err(e) => {
            tracing::warn!("Failed to set meta of module {}: {}", id, e);
            failure(&e)
        }
    }
}

async fn active_version_content(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.active_version_content(&id).await {
        Ok((module, content)) => {
            let mut response = (StatusCode::OK, content).into_response();
            let headers = response.headers_mut();
            insert_header(headers, "x-module-id", &id);
            insert_header(headers, "x-module-version", &module.active_version.to_string());
            insert_header(headers, "x-module-name", &module.meta.name);
            insert_header(headers, "x-module-description", &module.meta.description);
            insert_header(headers, "x-module-package", &module.meta.package);
            response
        }
        Err(e) => {
            tracing::warn!("Failed to fetch active content of module {}: {}", id, e);
            failure(&e)
        }
    }
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

async fn sync(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    let registry = state.store.list_modules().await;
    let updated = updated_modules(&registry, &request.installed_modules);

    (
        StatusCode::OK,
        Json(SyncResponse {
            updated_modules: updated,
        }),
    )
}
