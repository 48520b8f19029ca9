use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{debug, info, warn};

use fan_common::{
    api::{self, ApiReply},
    blink_channel, fire_expired_timer, lock_shared, run_blink_worker, AccessoryMirror,
    AccessoryWrite, FanController, FanLevel, LedHandle, LevelStore, OutputError, PinConfig,
    RuntimeConfig, SpeedOutputs, StatusLed, StoreError, LEVEL_KEY, LEVEL_NAMESPACE,
};

type HostController = FanController<SimulatedRelays, FileLevelStore>;

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<HostController>>,
    mirror: Arc<AccessoryMirror>,
}

/// Relay bank that only logs line transitions.
struct SimulatedRelays {
    pins: PinConfig,
}

impl SpeedOutputs for SimulatedRelays {
    fn write_line(&mut self, level: FanLevel, asserted: bool) -> Result<(), OutputError> {
        debug!(
            "GPIO{} ({}) -> {}",
            self.pins.relay_pin(level),
            level.as_str(),
            if asserted { "HIGH" } else { "LOW" }
        );
        Ok(())
    }
}

struct SimulatedLed {
    pin: i32,
}

impl StatusLed for SimulatedLed {
    fn set_lit(&mut self, lit: bool) -> Result<(), OutputError> {
        debug!("GPIO{} (LED) -> {}", self.pin, if lit { "HIGH" } else { "LOW" });
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LevelRecord {
    fan_level: i32,
}

/// Level record kept as `<data dir>/fan_cfg.json`.
struct FileLevelStore {
    path: PathBuf,
}

impl FileLevelStore {
    fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(format!("{LEVEL_NAMESPACE}.json")),
        }
    }
}

impl LevelStore for FileLevelStore {
    fn load_level(&self) -> Result<Option<i32>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(raw) => serde_json::from_slice::<LevelRecord>(&raw)
                .map(|record| Some(record.fan_level))
                .map_err(|err| StoreError::Corrupt(format!("{LEVEL_KEY}: {err}"))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    fn save_level(&mut self, level: i32) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::Backend(err.to_string()))?;
        }
        let payload = serde_json::to_vec_pretty(&LevelRecord { fan_level: level })
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        std::fs::write(&self.path, payload).map_err(|err| StoreError::Backend(err.to_string()))
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("FAN_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.fan"));

    let mut runtime = load_runtime_config(&data_dir).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let led = LedHandle::new(SimulatedLed {
        pin: runtime.pins.led,
    });
    let (blink, blinks) = blink_channel(runtime.fan.blink_queue_capacity);
    let blink_interval = Duration::from_millis(runtime.fan.blink_interval_ms);
    let worker_led = led.clone();
    thread::Builder::new()
        .name("blink".to_string())
        .spawn(move || run_blink_worker(worker_led, blinks, blink_interval))
        .context("failed to spawn blink worker")?;

    let controller = FanController::new(
        runtime.fan.clone(),
        SimulatedRelays {
            pins: runtime.pins.clone(),
        },
        FileLevelStore::new(&data_dir),
        led,
        blink,
    );
    let mirror = AccessoryMirror::new(runtime.accessory.clone(), controller.state());

    let app_state = AppState {
        controller: Arc::new(Mutex::new(controller)),
        mirror: Arc::new(mirror),
    };

    spawn_timer_loop(
        app_state.clone(),
        Duration::from_millis(runtime.fan.timer_poll_interval_ms),
    );

    let api = Router::new()
        .route("/api/on", get(handle_on))
        .route("/api/off", get(handle_off))
        .route("/api/level", get(handle_level))
        .route("/api/timer_off", get(handle_timer_off))
        .route("/api/cancel_timer", get(handle_cancel_timer))
        .route("/api/status", get(handle_status))
        .route(
            "/api/accessory",
            get(handle_get_accessory).post(handle_post_accessory),
        )
        .layer(cors_layer());

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .merge(api)
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let port = std::env::var("FAN_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind fan controller server at {addr}"))?;

    info!("fan controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn load_runtime_config(data_dir: &Path) -> anyhow::Result<RuntimeConfig> {
    let path = data_dir.join("runtime.json");
    match tokio::fs::read(&path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("invalid runtime config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn spawn_timer_loop(app_state: AppState, poll: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll);
        loop {
            interval.tick().await;
            fire_expired_timer(&*app_state.controller, &*app_state.mirror, monotonic_ms());
        }
    });
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn handle_on(State(state): State<AppState>) -> Response {
    let reply = {
        let mut controller = lock_shared(&state.controller);
        let reply = api::turn_on(&mut controller);
        state.mirror.sync(controller.state().into());
        reply
    };
    reply_response(reply)
}

async fn handle_off(State(state): State<AppState>) -> Response {
    let reply = {
        let mut controller = lock_shared(&state.controller);
        let reply = api::turn_off(&mut controller);
        state.mirror.sync(controller.state().into());
        reply
    };
    reply_response(reply)
}

async fn handle_level(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let reply = {
        let mut controller = lock_shared(&state.controller);
        let reply = api::set_level(&mut controller, params.get("value").map(String::as_str));
        if reply.status == 200 {
            state.mirror.sync(controller.state().into());
        }
        reply
    };
    reply_response(reply)
}

async fn handle_timer_off(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let reply = api::arm_timer(
        &mut lock_shared(&state.controller),
        params.get("seconds").map(String::as_str),
        monotonic_ms(),
    );
    reply_response(reply)
}

async fn handle_cancel_timer(State(state): State<AppState>) -> Response {
    let reply = api::cancel_timer(&mut lock_shared(&state.controller));
    reply_response(reply)
}

async fn handle_status(State(state): State<AppState>) -> Response {
    let reply = api::status(&lock_shared(&state.controller), monotonic_ms());
    reply_response(reply)
}

async fn handle_get_accessory(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.mirror.snapshot())
}

async fn handle_post_accessory(
    State(state): State<AppState>,
    Json(write): Json<AccessoryWrite>,
) -> impl IntoResponse {
    state.mirror.apply_write(&*state.controller, write);
    Json(state.mirror.snapshot())
}

fn reply_response(reply: ApiReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
