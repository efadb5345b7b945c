use std::sync::Arc;
use axum::{Form, Json, Router, middleware};
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tandoor::{BatchError, Batcher, Inputs, TaskKind};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use crate::auth::{Credentials, Token, TokenStore, require_bearer};
use crate::fetch::{FetchError, ImageFetcher};
use crate::preview::Rendered;
use crate::storage::{ObjectStore, object_key};

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: &'static str,
    pub task: TaskKind,
}

#[derive(Clone)]
pub struct AppState {
    pub batcher: Arc<dyn Batcher<Output = Rendered>>,
    pub auth: Arc<TokenStore>,
    pub store: Option<Arc<dyn ObjectStore>>,
    pub fetcher: ImageFetcher,
    pub info: Arc<ServerInfo>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub author: String,
}

/// An error response: a status code plus a JSON `detail`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    missing: Vec<&'static str>,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            missing: vec![],
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, detail)
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match &err {
            BatchError::MissingInputs { missing, .. } => Self {
                status: StatusCode::BAD_REQUEST,
                detail: err.to_string(),
                missing: missing.iter().map(|field| field.as_str()).collect(),
            },
            BatchError::Executor(_) | BatchError::Internal(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            BatchError::Cancelled | BatchError::Stopped => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            detail: String,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            missing: Vec<&'static str>,
        }

        let body = Json(Body {
            detail: self.detail,
            missing: self.missing,
        });
        if self.status == StatusCode::UNAUTHORIZED {
            (self.status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (self.status, body).into_response()
        }
    }
}

pub fn router(state: AppState, api_prefix: &str) -> Router {
    let protected = Router::new()
        .route("/generate", post(generate))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));
    let api = Router::new()
        .route("/auth", post(authenticate))
        .merge(protected);

    let prefix = api_prefix.trim_end_matches('/');
    let app = Router::new().route("/", get(health));
    let app = if prefix.is_empty() {
        app.merge(api)
    } else {
        app.nest(prefix, api)
    };

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(state.info.as_ref().clone())
}

async fn authenticate(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<Json<Token>, ApiError> {
    state
        .auth
        .issue(&credentials)
        .map(Json)
        .ok_or_else(|| ApiError::unauthorized("incorrect username or password"))
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    let prompt = request.prompt.filter(|prompt| !prompt.trim().is_empty());
    if prompt.is_none() && request.image_url.is_none() {
        return Err(ApiError::bad_request("please provide a prompt or an image url"));
    }

    let mut inputs = Inputs::new();
    if let Some(url) = &request.image_url {
        inputs = inputs.with_image(state.fetcher.fetch(url).await?);
    }
    if let Some(prompt) = &prompt {
        inputs = inputs.with_prompt(prompt.clone());
    }

    let rendered = state.batcher.generate(inputs).await.inspect_err(|err| {
        if !matches!(err, BatchError::MissingInputs { .. }) {
            error!(error = %err, "generation failed");
        }
    })?;

    if let Some(store) = state.store.clone() {
        let key = object_key(&request.author, prompt.as_deref(), rendered.extension());
        let bytes = rendered.bytes.clone();
        // the caller's response never depends on this
        tokio::spawn(async move {
            if let Err(err) = store.put(&key, bytes).await {
                warn!(key, error = %err, "failed to store result");
            }
        });
    }

    Ok(([(CONTENT_TYPE, rendered.media_type)], rendered.bytes).into_response())
}
