use std::{fmt::Debug, time::Duration};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use pcdb_store::{
    data::{Cpu, Entity, Gpu, Memory, Pc, Ram},
    validate::{SaveCpuRequest, SaveGpuRequest, SaveMemoryRequest, SavePcRequest, SaveRamRequest},
    EntityKind, Id, Store, StoreError, Validate,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use super::{
    middleware::{request_span, timeout},
    Action, AppState, Response, Result,
};

/// Save request accepted on `/save/<kind>`.
pub trait SaveRoute: Validate + DeserializeOwned + Debug + Send + 'static {
    const KIND: EntityKind;

    fn save(store: &Store, value: Self::Output) -> std::result::Result<Id, StoreError>;
}

/// Stored entity served on `/<kind>/{id}`.
pub trait EntityRoute: Entity + Serialize + Send + 'static {
    fn get(store: &Store, id: Id) -> std::result::Result<Self, StoreError>;

    fn delete(store: &Store, id: Id) -> std::result::Result<(), StoreError>;
}

macro_rules! routes_for {
    ($request: ty, $entity: ty, $save: ident, $get: ident, $delete: ident) => {
        impl SaveRoute for $request {
            const KIND: EntityKind = <$entity as Entity>::KIND;

            fn save(store: &Store, value: Self::Output) -> std::result::Result<Id, StoreError> {
                store.$save(value)
            }
        }

        impl EntityRoute for $entity {
            fn get(store: &Store, id: Id) -> std::result::Result<Self, StoreError> {
                store.$get(id)
            }

            fn delete(store: &Store, id: Id) -> std::result::Result<(), StoreError> {
                store.$delete(id)
            }
        }
    };
}

routes_for!(SaveRamRequest, Ram, save_ram, get_ram, delete_ram);
routes_for!(SaveCpuRequest, Cpu, save_cpu, get_cpu, delete_cpu);
routes_for!(SaveGpuRequest, Gpu, save_gpu, get_gpu, delete_gpu);
routes_for!(SaveMemoryRequest, Memory, save_memory, get_memory, delete_memory);
routes_for!(SavePcRequest, Pc, save_pc, get_pc, delete_pc);

async fn save_api<R>(
    State(state): State<AppState>,
    payload: std::result::Result<Json<R>, JsonRejection>,
) -> Result<Json<Response>>
where
    R: SaveRoute,
    R::Output: Send + 'static,
{
    let Json(request) = payload?;
    info!(?request, "request body decoded");

    let value = request.validate()?;
    let id = state
        .with_store(Action::Save, R::KIND, move |store| R::save(store, value))
        .await?;

    info!(id, "{} saved", R::KIND);
    Ok(Json(Response::saved(id)))
}

async fn get_api<E: EntityRoute>(
    State(state): State<AppState>,
    id: std::result::Result<Path<Id>, PathRejection>,
) -> Result<Json<Response<E>>> {
    let Path(id) = id?;
    let entity = state
        .with_store(Action::Get, E::KIND, move |store| E::get(store, id))
        .await?;
    Ok(Json(Response::data(entity)))
}

async fn delete_api<E: EntityRoute>(
    State(state): State<AppState>,
    id: std::result::Result<Path<Id>, PathRejection>,
) -> Result<Json<Response>> {
    let Path(id) = id?;
    state
        .with_store(Action::Delete, E::KIND, move |store| E::delete(store, id))
        .await?;
    info!(id, "{} deleted", E::KIND);
    Ok(Json(Response::ok()))
}

pub fn make_router(app_state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/save/ram", post(save_api::<SaveRamRequest>))
        .route("/save/cpu", post(save_api::<SaveCpuRequest>))
        .route("/save/gpu", post(save_api::<SaveGpuRequest>))
        .route("/save/memory", post(save_api::<SaveMemoryRequest>))
        .route("/save/pc", post(save_api::<SavePcRequest>))
        .route("/ram/{id}", get(get_api::<Ram>).delete(delete_api::<Ram>))
        .route("/cpu/{id}", get(get_api::<Cpu>).delete(delete_api::<Cpu>))
        .route("/gpu/{id}", get(get_api::<Gpu>).delete(delete_api::<Gpu>))
        .route(
            "/memory/{id}",
            get(get_api::<Memory>).delete(delete_api::<Memory>),
        )
        .route("/pc/{id}", get(get_api::<Pc>).delete(delete_api::<Pc>))
        .layer(from_fn_with_state(request_timeout, timeout))
        .layer(from_fn(request_span))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use pcdb_store::{DeletePolicy, InMemBackend};
    use serde_json::{json, Value};

    use super::*;

    async fn start_server(store: Store) -> String {
        let router = make_router(AppState::new(store), Duration::from_secs(4));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn post_json(base: &str, path: &str, body: Value) -> (u16, Value) {
        let resp = reqwest::Client::new()
            .post(format!("{base}{path}"))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn get_json(base: &str, path: &str) -> (u16, Value) {
        let resp = reqwest::get(format!("{base}{path}")).await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn delete_json(base: &str, path: &str) -> (u16, Value) {
        let resp = reqwest::Client::new()
            .delete(format!("{base}{path}"))
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    fn i7() -> Value {
        json!({"name": "Intel Core i7-9700K", "cores": 8, "threads": 8, "frequency": 3600})
    }

    #[tokio::test]
    async fn test_cpu_round_trip() {
        let base = start_server(Store::in_memory(DeletePolicy::Restrict).unwrap()).await;

        let (status, body) = post_json(&base, "/save/cpu", i7()).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"status": "OK", "id": 1}));

        let (status, body) = post_json(&base, "/save/cpu", i7()).await;
        assert_eq!(status, 409);
        assert_eq!(body, json!({"status": "Error", "error": "cpu already exists"}));

        let (status, body) = get_json(&base, "/cpu/1").await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["name"], "Intel Core i7-9700K");
        assert_eq!(body["data"]["frequency"], 3600);

        let (status, _) = delete_json(&base, "/cpu/1").await;
        assert_eq!(status, 200);
        let (status, body) = delete_json(&base, "/cpu/1").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"status": "OK"}));

        let (status, body) = get_json(&base, "/cpu/1").await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "cpu not found");
    }

    #[tokio::test]
    async fn test_validation_errors_are_joined() {
        let base = start_server(Store::new(
            Box::new(InMemBackend::new()),
            DeletePolicy::Restrict,
        ))
        .await;

        let (status, body) = post_json(&base, "/save/ram", json!({"name": "Kingston"})).await;
        assert_eq!(status, 400);
        assert_eq!(
            body["error"],
            "field memory_type is a required field, field capacity is a required field"
        );

        let (status, body) = post_json(&base, "/save/ram", json!({"capacity": "lots"})).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "failed to decode request body");
    }

    #[tokio::test]
    async fn test_pc_links_components() {
        let base = start_server(Store::in_memory(DeletePolicy::Restrict).unwrap()).await;

        let components = [
            ("/save/ram", json!({"name": "Kingston FURY Beast", "memory_type": "DDR4", "capacity": 16})),
            ("/save/cpu", i7()),
            ("/save/gpu", json!({"name": "GeForce RTX 3070", "manufacturer": "NVIDIA", "memory": 8, "frequency": 1500})),
            ("/save/memory", json!({"name": "Samsung 970 EVO", "capacity": 500, "storage_type": "SSD"})),
        ];
        for (path, body) in components {
            let (status, body) = post_json(&base, path, body).await;
            assert_eq!(status, 200, "{path}: {body}");
            assert_eq!(body["id"], 1);
        }

        let (status, body) = post_json(
            &base,
            "/save/pc",
            json!({"name": "Some PC", "ram_id": 1, "cpu_id": 1, "gpu_id": 1, "memory_id": 1}),
        )
        .await;
        assert_eq!(status, 200);
        let pc_id = body["id"].as_i64().unwrap();

        let (_, body) = get_json(&base, &format!("/pc/{pc_id}")).await;
        assert_eq!(
            body["data"],
            json!({"id": pc_id, "name": "Some PC", "ram_id": 1, "cpu_id": 1, "gpu_id": 1, "memory_id": 1})
        );

        let (status, body) = post_json(
            &base,
            "/save/pc",
            json!({"ram_id": 1, "cpu_id": 1, "gpu_id": 7, "memory_id": 1}),
        )
        .await;
        assert_eq!(status, 422);
        assert_eq!(body["error"], "pc references a missing component");

        let (status, _) = delete_json(&base, "/gpu/1").await;
        assert_eq!(status, 409);
    }

    #[tokio::test]
    async fn test_locked_database_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.db");
        let store = Store::open(&path, DeletePolicy::Restrict).unwrap();

        let router = make_router(AppState::new(store), Duration::from_millis(200));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let holder = rusqlite::Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let started = std::time::Instant::now();
        let (status, body) = post_json(&base, "/save/cpu", i7()).await;
        assert_eq!(status, 408);
        assert_eq!(body["error"], "request timed out");
        assert!(started.elapsed() < Duration::from_secs(2));

        // let the stranded insert finish before the runtime shuts down
        holder.execute_batch("COMMIT").unwrap();
        drop(holder);
    }

    #[tokio::test]
    async fn test_bad_id_in_path() {
        let base = start_server(Store::in_memory(DeletePolicy::Restrict).unwrap()).await;
        let (status, body) = get_json(&base, "/gpu/abc").await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "failed to decode path");
    }
}
