use std::{
    collections::{BTreeMap, HashMap},
    f32::consts::TAU,
    fs::OpenOptions,
    io::{ErrorKind, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use embedded_hal::delay::DelayNs;
use serde::Serialize;
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use multizone_common::{
    api::{ApiRequest, ApiResponse, HttpTransport, Method},
    config::SETTINGS_KEY,
    history::{HistoryRecord, TemperatureHistory, MAX_HISTORY_LINES},
    ChannelBank, ChannelMode, ChannelRole, ControlLoop, DeviceIdentity, EventLog, KeyValueStore,
    RelayOutput, RuntimeConfig, SampleValidator, StorageError, SyncClient, TemperatureProbe,
    TransportError, CHANNEL_COUNT,
};

type HostLoop = ControlLoop<
    SampleValidator<SimulatedProbe, StdDelay>,
    LoggingRelays,
    UreqTransport,
    FileStore,
    CsvHistory,
>;

#[derive(Clone)]
struct AppState {
    control: Arc<Mutex<HostLoop>>,
    events: EventLog,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Slow sine around a base temperature so hysteresis can be watched.
struct SimulatedProbe {
    base_c: f32,
    amplitude_c: f32,
    period: Duration,
}

struct StdDelay;

#[derive(Default)]
struct LoggingRelays {
    levels: [Option<bool>; CHANNEL_COUNT],
}

struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
}

/// Key-value entries in one JSON document under the data dir.
#[derive(Clone)]
struct FileStore {
    path: Arc<PathBuf>,
    lock: Arc<StdMutex<()>>,
}

struct CsvHistory {
    path: PathBuf,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("MULTIZONE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.multizone"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let mut runtime = load_runtime_config(&data_dir).unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    if let Ok(url) = std::env::var("API_URL") {
        runtime.api.base_url = url;
    }
    if let Ok(key) = std::env::var("API_KEY") {
        runtime.api.api_key = key;
    }
    runtime.settings.sanitize();

    let store = FileStore::new(data_dir.join("store.json"));
    if store.read(SETTINGS_KEY)?.is_none() {
        runtime
            .settings
            .save(&store)
            .context("failed to seed settings")?;
    }

    let transport = UreqTransport::new(
        &runtime.api.base_url,
        Duration::from_millis(runtime.control.request_timeout_ms),
    );
    let sync = SyncClient::new(transport, store.clone(), runtime.api.api_key.clone())
        .context("failed to load device session")?;

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| runtime.network.hostname.clone());
    let identity = DeviceIdentity {
        hostname,
        mac_address: "02:00:00:00:00:01".to_string(),
        ip_address: "127.0.0.1".to_string(),
        firmware_version: runtime.api.firmware_version.clone(),
    };

    let validator = SampleValidator::new(SimulatedProbe::from_env(), StdDelay);
    let control = ControlLoop::new(
        runtime.control.clone(),
        identity,
        validator,
        ChannelBank::new(LoggingRelays::default()),
        sync,
        store,
        CsvHistory {
            path: data_dir.join("history.csv"),
        },
    );

    let events = control.events().clone();
    let app_state = AppState {
        control: Arc::new(Mutex::new(control)),
        events: events.clone(),
    };
    spawn_control_loop(app_state.clone())?;

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/role", post(handle_set_role))
        .route("/api/thresholds", post(handle_set_thresholds))
        .route("/api/frequency", post(handle_set_frequency))
        .route("/api/unit", post(handle_set_unit))
        .route("/api/history", get(handle_get_history))
        .route("/api/history/clear", post(handle_clear_history))
        .route("/api/logs", get(handle_get_logs))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    events.record(monotonic_ms(), "Web server started");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Ticks run on a plain thread: the sync client blocks on HTTP.
fn spawn_control_loop(app_state: AppState) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || loop {
            let (report, period) = {
                let mut control = app_state.control.blocking_lock();
                let report = control.tick(monotonic_ms(), Utc::now().timestamp());
                (report, control.period())
            };

            if report.restart_requested {
                info!("restart requested; exiting for the supervisor to restart us");
                std::process::exit(0);
            }
            thread::sleep(period);
        })
        .context("failed to spawn control loop thread")?;
    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.control.lock().await.status();
    Json(status)
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let index = match relay_param(&params) {
        Ok(index) => index,
        Err(response) => return response,
    };
    let Some(value) = params.get("mode") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'mode' parameter");
    };
    let Ok(mode) = value.parse::<ChannelMode>() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use 'AUTO', 'ON' or 'OFF'",
        );
    };

    state.control.lock().await.set_mode(index, mode);
    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_role(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let index = match relay_param(&params) {
        Ok(index) => index,
        Err(response) => return response,
    };
    let Some(role) = params.get("role").and_then(|value| value.parse::<ChannelRole>().ok()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid role. Use 'HEATING', 'COOLING', 'GENERIC' or 'MANUAL_ONLY'",
        );
    };

    state.control.lock().await.set_role(index, role);
    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_thresholds(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let index = match relay_param(&params) {
        Ok(index) => index,
        Err(response) => return response,
    };
    let on = params.get("on").and_then(|value| value.parse::<f32>().ok());
    let off = params.get("off").and_then(|value| value.parse::<f32>().ok());
    let (Some(on), Some(off)) = (on, off) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'on'/'off' parameters");
    };

    if !state.control.lock().await.set_thresholds(index, on, off) {
        return error_response(StatusCode::BAD_REQUEST, "Thresholds must be finite numbers");
    }
    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_frequency(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(seconds) = params.get("sec").and_then(|value| value.parse::<u32>().ok()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'sec' parameter");
    };

    state.control.lock().await.set_update_frequency(seconds);
    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_unit(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let fahrenheit = match params.get("fahrenheit").map(|value| value.to_ascii_lowercase()) {
        Some(value) if value == "1" || value == "true" => true,
        Some(value) if value == "0" || value == "false" => false,
        _ => return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'fahrenheit' parameter"),
    };

    state.control.lock().await.set_use_fahrenheit(fahrenheit);
    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_history(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let limit = params
        .get("lines")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(MAX_HISTORY_LINES)
        .min(MAX_HISTORY_LINES);

    let mut body = state.control.lock().await.recent_history(limit).join("\n");
    body.push('\n');
    ([(header::CONTENT_TYPE, "text/csv")], body).into_response()
}

async fn handle_clear_history(State(state): State<AppState>) -> impl IntoResponse {
    let cleared = state.control.lock().await.clear_history();
    match cleared {
        Ok(true) => Json(json!({ "message": "Data cleared successfully" })).into_response(),
        Ok(false) => Json(json!({ "message": "No data to clear" })).into_response(),
        Err(err) => {
            warn!("failed to clear history: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear data")
        }
    }
}

async fn handle_get_logs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.events.entries())
}

/// 0-based relay index from the `relay` query parameter.
fn relay_param(params: &HashMap<String, String>) -> Result<usize, axum::response::Response> {
    let Some(value) = params.get("relay") else {
        return Err(error_response(StatusCode::BAD_REQUEST, "Missing 'relay' parameter"));
    };
    match value.parse::<usize>() {
        Ok(index) if index < CHANNEL_COUNT => Ok(index),
        _ => Err(error_response(StatusCode::BAD_REQUEST, "Invalid relay number")),
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn load_runtime_config(data_dir: &std::path::Path) -> anyhow::Result<RuntimeConfig> {
    match std::fs::read(data_dir.join("runtime.json")) {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
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

impl SimulatedProbe {
    fn from_env() -> Self {
        let base_c = std::env::var("SIMULATED_TEMP_C")
            .ok()
            .and_then(|value| value.parse::<f32>().ok())
            .unwrap_or(23.0);
        Self {
            base_c,
            amplitude_c: 3.0,
            period: Duration::from_secs(600),
        }
    }
}

impl TemperatureProbe for SimulatedProbe {
    fn read_celsius(&mut self) -> f32 {
        let elapsed = Duration::from_millis(monotonic_ms()).as_secs_f32();
        let phase = (elapsed / self.period.as_secs_f32()) * TAU;
        self.base_c + self.amplitude_c * phase.sin()
    }
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

impl RelayOutput for LoggingRelays {
    fn drive(&mut self, index: usize, energized: bool) {
        let Some(level) = self.levels.get_mut(index) else {
            return;
        };
        if *level != Some(energized) {
            debug!("relay output {} driven {}", index + 1, if energized { "HIGH" } else { "LOW" });
        }
        *level = Some(energized);
    }
}

impl UreqTransport {
    fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("multizone-controller/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut call = self.agent.request(request.method.as_str(), &url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let result = match (&request.method, &request.body) {
            (Method::Get, _) | (_, None) => call.call(),
            (_, Some(body)) => call.send_string(body),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(map_transport_error(&err)),
        };

        let status = response.status();
        let body = response
            .into_string()
            .map_err(|err| TransportError::Io(err.to_string()))?;
        debug!("{} {} -> {status}", request.method.as_str(), request.path);
        Ok(ApiResponse::new(status, body))
    }
}

fn map_transport_error(err: &ureq::Transport) -> TransportError {
    use std::error::Error as _;

    let timed_out = err
        .source()
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock));
    if timed_out {
        return TransportError::Timeout;
    }

    match err.kind() {
        ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => TransportError::Offline,
        _ => TransportError::Io(err.to_string()),
    }
}

impl FileStore {
    fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Arc::new(StdMutex::new(())),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read(self.path.as_ref()) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|err| StorageError(err.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StorageError(err.to_string())),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let payload =
            serde_json::to_vec_pretty(entries).map_err(|err| StorageError(err.to_string()))?;
        std::fs::write(self.path.as_ref(), payload).map_err(|err| StorageError(err.to_string()))
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StorageError("store lock poisoned".to_string()))?;
        let mut entries = self.load()?;
        apply(&mut entries);
        self.save(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StorageError("store lock poisoned".to_string()))?;
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

impl TemperatureHistory for CsvHistory {
    fn append(&mut self, record: HistoryRecord) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| StorageError(err.to_string()))?;
        writeln!(file, "{record}").map_err(|err| StorageError(err.to_string()))
    }

    fn recent(&self, limit: usize) -> Vec<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!("failed to read history: {err}");
                }
                return Vec::new();
            }
        };
        let lines: Vec<&str> = raw.lines().filter(|line| !line.is_empty()).collect();
        let skip = lines.len().saturating_sub(limit);
        lines[skip..].iter().map(|line| line.to_string()).collect()
    }

    fn clear(&mut self) -> Result<bool, StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_history_reads_back_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = CsvHistory {
            path: dir.path().join("history.csv"),
        };
        assert!(!history.clear().unwrap());

        for i in 0..3_u64 {
            history
                .append(HistoryRecord::new(0, i * 1_000, 20.0 + i as f32, 0))
                .unwrap();
        }

        assert_eq!(history.recent(2), vec!["1,21.00,0".to_string(), "2,22.00,0".to_string()]);
        assert!(history.clear().unwrap());
        assert!(history.recent(10).is_empty());
    }

    #[test]
    fn file_store_shares_entries_between_clones() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        let other = store.clone();

        store.write("api_token", "abc").unwrap();
        store.write("device_id", "4").unwrap();
        other.remove("api_token").unwrap();

        assert_eq!(store.read("api_token").unwrap(), None);
        assert_eq!(other.read("device_id").unwrap().as_deref(), Some("4"));
    }
}
