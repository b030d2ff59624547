use std::{fmt, sync::Arc};

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pcdb_store::{EntityKind, Id, Store, StoreError, Violations};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

pub mod middleware;
pub mod mock_router;
pub mod router;

#[derive(Clone)]
pub struct AppState(pub Arc<Store>);

impl AppState {
    pub fn new(store: Store) -> Self {
        Self(Arc::new(store))
    }

    /// Runs `f` against the store on the blocking pool. Waiting on the store lock
    /// or on a busy database never stalls a runtime worker, and the caller's
    /// future stays cancellable by the timeout layer.
    pub async fn with_store<T, F>(&self, action: Action, kind: EntityKind, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> std::result::Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|err| {
                StoreError::Storage(anyhow::Error::new(err).context("store task failed"))
            })
            .and_then(|result| result)
            .map_err(ApiError::store(action, kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    Error,
}

/// Envelope every route answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<T = ()> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            error: None,
            id: None,
            data: None,
        }
    }

    pub fn saved(id: Id) -> Self {
        Self {
            id: Some(id),
            ..Self::ok()
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(msg.into()),
            id: None,
            data: None,
        }
    }
}

impl<T> Response<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: Status::Ok,
            error: None,
            id: None,
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Save,
    Get,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Save => "save",
            Action::Get => "get",
            Action::Delete => "delete",
        })
    }
}

/// Everything a handler can fail with, rendered as an error envelope.
#[derive(Debug)]
pub enum ApiError {
    Decode {
        what: &'static str,
        reason: String,
    },
    Invalid(Violations),
    Store {
        action: Action,
        kind: EntityKind,
        source: StoreError,
    },
    Timeout,
}

impl ApiError {
    pub fn store(action: Action, kind: EntityKind) -> impl FnOnce(StoreError) -> Self {
        move |source| ApiError::Store {
            action,
            kind,
            source,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Decode {
            what: "request body",
            reason: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Decode {
            what: "path",
            reason: rejection.body_text(),
        }
    }
}

impl From<Violations> for ApiError {
    fn from(violations: Violations) -> Self {
        ApiError::Invalid(violations)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = match self {
            ApiError::Decode { what, reason } => {
                info!(%reason, "failed to decode {what}");
                (StatusCode::BAD_REQUEST, format!("failed to decode {what}"))
            }
            ApiError::Invalid(violations) => {
                info!(%violations, "invalid request");
                (StatusCode::BAD_REQUEST, violations.to_string())
            }
            ApiError::Timeout => {
                error!("request timed out");
                (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
            }
            ApiError::Store {
                action,
                kind,
                source,
            } => match source {
                StoreError::NotFound(_) | StoreError::AlreadyExists(_) => {
                    info!(%kind, "{source}");
                    let code = if source.is_already_exists() {
                        StatusCode::CONFLICT
                    } else {
                        StatusCode::NOT_FOUND
                    };
                    (code, source.to_string())
                }
                StoreError::InUse { .. } => {
                    info!(%kind, "{source}");
                    (StatusCode::CONFLICT, source.to_string())
                }
                StoreError::MissingReference(_) => {
                    info!(%kind, "{source}");
                    (StatusCode::UNPROCESSABLE_ENTITY, source.to_string())
                }
                StoreError::Storage(err) => {
                    error!(%kind, error = ?err, "failed to {action} {kind}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("failed to {action} {kind}"),
                    )
                }
            },
        };
        (code, Json(Response::error(msg))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let wait_for = |kind: SignalKind| async move {
        match signal(kind) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = wait_for(SignalKind::interrupt()) => {},
        _ = wait_for(SignalKind::terminate()) => {},
    }
    info!("shutdown signal received");
}

#[test]
fn test_response_envelope() {
    let ok = serde_json::to_value(Response::saved(3)).unwrap();
    assert_eq!(ok, serde_json::json!({"status": "OK", "id": 3}));

    let err = serde_json::to_value(Response::error("cpu already exists")).unwrap();
    assert_eq!(
        err,
        serde_json::json!({"status": "Error", "error": "cpu already exists"})
    );
}

#[test]
fn test_store_errors_map_to_status_codes() {
    let cases = [
        (StoreError::AlreadyExists(EntityKind::Gpu), StatusCode::CONFLICT),
        (StoreError::NotFound(EntityKind::Gpu), StatusCode::NOT_FOUND),
        (
            StoreError::MissingReference(EntityKind::Pc),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (
            StoreError::Storage(anyhow::anyhow!("disk full")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];
    for (source, expected) in cases {
        let err = ApiError::store(Action::Save, EntityKind::Gpu)(source);
        assert_eq!(err.into_response().status(), expected);
    }
}
