use std::{
    sync::{Arc, Mutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::Utc;
use ds18b20::{Ds18b20, Resolution};
use embedded_svc::{
    http::{client::Client as HttpClient, Method as HttpMethod},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::{Ets, FreeRtos},
    gpio::{AnyIOPin, AnyOutputPin, IOPin, InputOutput, Output, OutputPin, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::EspSntp,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use one_wire_bus::{Address, OneWire};
use serde::Serialize;

use multizone_common::{
    api::{read_body, ApiRequest, ApiResponse, HttpTransport, Method},
    config::{ApiConfig, NetworkConfig, SETTINGS_KEY},
    history::MAX_HISTORY_LINES,
    sampling::FAULT_SENTINEL_C,
    ChannelBank, ChannelMode, ChannelRole, ControlLoop, DeviceIdentity, EventLog, KeyValueStore,
    MemoryHistory, RelayOutput, RuntimeConfig, SampleValidator, StorageError, SyncClient,
    TemperatureProbe, TransportError, CHANNEL_COUNT,
};

const NVS_NAMESPACE: &str = "multizone";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const NVS_VALUE_CAPACITY: usize = 2048;
const ONE_WIRE_PIN: i32 = 4;
const WATCHDOG_TIMEOUT_SEC: u32 = 120;
const WIFI_RESTART_GRACE_MS: u64 = 300_000;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

type EspLoop = ControlLoop<
    SampleValidator<Ds18b20Probe, FreeRtos>,
    GpioRelays,
    EspTransport,
    NvsStore,
    MemoryHistory,
>;

type SharedLoop = Arc<Mutex<EspLoop>>;

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
    lock: Arc<Mutex<()>>,
}

struct Ds18b20Probe {
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    address: Option<Address>,
    delay: Ets,
}

/// Relay boards on this controller switch on a LOW input.
struct GpioRelays {
    pins: [PinDriver<'static, AnyOutputPin, Output>; CHANNEL_COUNT],
}

struct EspTransport {
    base_url: String,
    timeout: Duration,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
        lock: Arc::new(Mutex::new(())),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.settings.sanitize();
    ensure_build_defaults(&mut runtime);

    info!(
        "NVS config loaded: ssid=`{}`, api=`{}`",
        runtime.network.wifi_ssid, runtime.api.base_url
    );

    if nvs_store.read(SETTINGS_KEY)?.is_none() {
        runtime.settings.save(&nvs_store)?;
    }

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    // Outputs first so every relay is released before Wi-Fi setup can block.
    let relays = GpioRelays::new([
        pins.gpio16.downgrade_output(),
        pins.gpio17.downgrade_output(),
        pins.gpio18.downgrade_output(),
        pins.gpio19.downgrade_output(),
    ])?;
    let probe = Ds18b20Probe::new(pins.gpio4.downgrade())?;

    let wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    let identity = device_identity(&wifi, &runtime);
    info!(
        "device {} ({}) at {}",
        identity.hostname, identity.mac_address, identity.ip_address
    );

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;

    let transport = EspTransport {
        base_url: runtime.api.base_url.trim_end_matches('/').to_string(),
        timeout: Duration::from_millis(runtime.control.request_timeout_ms),
    };
    let sync = SyncClient::new(transport, nvs_store.clone(), runtime.api.api_key.clone())
        .context("failed to load device session")?;

    let control = ControlLoop::new(
        runtime.control.clone(),
        identity,
        SampleValidator::new(probe, FreeRtos),
        ChannelBank::new(relays),
        sync,
        nvs_store,
        MemoryHistory::default(),
    );
    let events = control.events().clone();
    let control: SharedLoop = Arc::new(Mutex::new(control));

    spawn_control_loop(control.clone())?;
    let server = create_http_server(control, events.clone(), runtime.network.http_port)?;
    events.record(monotonic_ms(), "Web server started");

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_build_defaults(runtime: &mut RuntimeConfig) {
    let defaults = [
        (&mut runtime.network.wifi_ssid, option_env!("WIFI_SSID")),
        (&mut runtime.network.wifi_pass, option_env!("WIFI_PASS")),
        (&mut runtime.api.api_key, option_env!("API_KEY")),
    ];
    for (field, value) in defaults {
        if let Some(value) = value.filter(|_| field.is_empty()) {
            *field = value.to_string();
        }
    }

    // A base URL stored in NVS wins over the build-time one.
    if let Some(url) = option_env!("API_URL") {
        if runtime.api.base_url == ApiConfig::default().base_url {
            runtime.api.base_url = url.to_string();
        }
    }
}

fn device_identity(wifi: &EspWifi<'static>, runtime: &RuntimeConfig) -> DeviceIdentity {
    let netif = wifi.sta_netif();
    let mac_address = match netif.get_mac() {
        Ok(mac) => mac
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(":"),
        Err(err) => {
            warn!("failed to read station MAC: {err}");
            String::new()
        }
    };
    let ip_address = match netif.get_ip_info() {
        Ok(info) => info.ip.to_string(),
        Err(err) => {
            warn!("failed to read station IP: {err}");
            "0.0.0.0".to_string()
        }
    };

    DeviceIdentity {
        hostname: runtime.network.hostname.clone(),
        mac_address,
        ip_address,
        firmware_version: runtime.api.firmware_version.clone(),
    }
}

fn create_http_server(
    control: SharedLoop,
    events: EventLog,
    port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: 12 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    {
        let control = control.clone();
        server.fn_handler("/api/status", HttpMethod::Get, move |req| {
            let status = lock(&control)?.status();
            write_json(req, &status)
        })?;
    }

    {
        let control = control.clone();
        server.fn_handler("/api/mode", HttpMethod::Post, move |req| {
            let uri = req.uri().to_string();
            let Some(index) = relay_param(&uri) else {
                return write_error(req, 400, "Missing or invalid 'relay' parameter");
            };
            let Some(mode) = query_param(&uri, "mode").and_then(|value| value.parse::<ChannelMode>().ok())
            else {
                return write_error(req, 400, "Invalid mode. Use 'AUTO', 'ON' or 'OFF'");
            };

            let status = {
                let mut control = lock(&control)?;
                control.set_mode(index, mode);
                control.status()
            };
            write_json(req, &status)
        })?;
    }

    {
        let control = control.clone();
        server.fn_handler("/api/role", HttpMethod::Post, move |req| {
            let uri = req.uri().to_string();
            let Some(index) = relay_param(&uri) else {
                return write_error(req, 400, "Missing or invalid 'relay' parameter");
            };
            let Some(role) = query_param(&uri, "role").and_then(|value| value.parse::<ChannelRole>().ok())
            else {
                return write_error(
                    req,
                    400,
                    "Invalid role. Use 'HEATING', 'COOLING', 'GENERIC' or 'MANUAL_ONLY'",
                );
            };

            let status = {
                let mut control = lock(&control)?;
                control.set_role(index, role);
                control.status()
            };
            write_json(req, &status)
        })?;
    }

    {
        let control = control.clone();
        server.fn_handler("/api/thresholds", HttpMethod::Post, move |req| {
            let uri = req.uri().to_string();
            let Some(index) = relay_param(&uri) else {
                return write_error(req, 400, "Missing or invalid 'relay' parameter");
            };
            let on = query_param(&uri, "on").and_then(|value| value.parse::<f32>().ok());
            let off = query_param(&uri, "off").and_then(|value| value.parse::<f32>().ok());
            let (Some(on), Some(off)) = (on, off) else {
                return write_error(req, 400, "Missing or invalid 'on'/'off' parameters");
            };

            let status = {
                let mut control = lock(&control)?;
                if !control.set_thresholds(index, on, off) {
                    drop(control);
                    return write_error(req, 400, "Thresholds must be finite numbers");
                }
                control.status()
            };
            write_json(req, &status)
        })?;
    }

    {
        let control = control.clone();
        server.fn_handler("/api/frequency", HttpMethod::Post, move |req| {
            let uri = req.uri().to_string();
            let Some(seconds) = query_param(&uri, "sec").and_then(|value| value.parse::<u32>().ok())
            else {
                return write_error(req, 400, "Missing or invalid 'sec' parameter");
            };

            let status = {
                let mut control = lock(&control)?;
                control.set_update_frequency(seconds);
                control.status()
            };
            write_json(req, &status)
        })?;
    }

    {
        let control = control.clone();
        server.fn_handler("/api/unit", HttpMethod::Post, move |req| {
            let uri = req.uri().to_string();
            let fahrenheit = match query_param(&uri, "fahrenheit").as_deref() {
                Some("1") | Some("true") => true,
                Some("0") | Some("false") => false,
                _ => return write_error(req, 400, "Missing or invalid 'fahrenheit' parameter"),
            };

            let status = {
                let mut control = lock(&control)?;
                control.set_use_fahrenheit(fahrenheit);
                control.status()
            };
            write_json(req, &status)
        })?;
    }

    server.fn_handler("/api/logs", HttpMethod::Get, move |req| {
        write_json(req, &events.entries())
    })?;

    {
        let control = control.clone();
        server.fn_handler("/api/history/clear", HttpMethod::Post, move |req| {
            let cleared = lock(&control)?.clear_history();
            match cleared {
                Ok(true) => write_json(req, &serde_json::json!({ "message": "Data cleared successfully" })),
                Ok(false) => write_json(req, &serde_json::json!({ "message": "No data to clear" })),
                Err(err) => {
                    warn!("failed to clear history: {err}");
                    write_error(req, 500, "Failed to clear data")
                }
            }
        })?;
    }

    server.fn_handler("/api/history", HttpMethod::Get, move |req| {
        let uri = req.uri().to_string();
        let limit = query_param(&uri, "lines")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(MAX_HISTORY_LINES)
            .min(MAX_HISTORY_LINES);

        let mut body = lock(&control)?.recent_history(limit).join("\n");
        body.push('\n');
        req.into_response(200, Some("OK"), &[("Content-Type", "text/csv")])?
            .write_all(body.as_bytes())?;
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(server)
}

fn lock(control: &SharedLoop) -> anyhow::Result<std::sync::MutexGuard<'_, EspLoop>> {
    control
        .lock()
        .map_err(|_| anyhow!("control loop lock poisoned"))
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        200,
        Some("OK"),
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn write_error(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    status_code: u16,
    message: &str,
) -> anyhow::Result<()> {
    let payload = serde_json::json!({ "error": message });
    let body = serde_json::to_vec(&payload)?;
    req.into_response(
        status_code,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn query_param(uri: &str, key: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name == key).then(|| value.replace('+', " "))
    })
}

/// 0-based relay index from the `relay` query parameter.
fn relay_param(uri: &str) -> Option<usize> {
    query_param(uri, "relay")
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|index| *index < CHANNEL_COUNT)
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    if network.wifi_ssid.trim().is_empty() {
        warn!("wifi credentials missing; running offline");
        return Ok(esp_wifi);
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                return Ok(esp_wifi);
            }
            Err(err) => warn!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:#}"),
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    // Relays still run from local readings; the control loop restarts the
    // device if the link stays down.
    warn!("all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; continuing offline");
    Ok(esp_wifi)
}

fn spawn_control_loop(control: SharedLoop) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("control-loop".into())
        .stack_size(16 * 1024)
        .spawn(move || {
            if let Err(err) = add_current_task_to_watchdog() {
                warn!("failed to register control loop with watchdog: {err:#}");
            }

            let mut wifi_disconnected_since_ms: Option<u64> = None;

            loop {
                feed_watchdog();
                let now_ms = monotonic_ms();

                if is_wifi_station_connected() {
                    wifi_disconnected_since_ms = None;
                } else if let Some(since_ms) = wifi_disconnected_since_ms {
                    if now_ms.saturating_sub(since_ms) >= WIFI_RESTART_GRACE_MS {
                        warn!(
                            "wifi disconnected for {}s; restarting device for recovery",
                            WIFI_RESTART_GRACE_MS / 1000
                        );
                        restart();
                    }
                } else {
                    wifi_disconnected_since_ms = Some(now_ms);
                }

                let (report, period) = match control.lock() {
                    Ok(mut control) => {
                        let report = control.tick(now_ms, Utc::now().timestamp());
                        (report, control.period())
                    }
                    Err(_) => {
                        warn!("control loop lock poisoned; restarting");
                        restart();
                    }
                };

                if report.restart_requested {
                    info!("restart requested by remote command");
                    restart();
                }

                sleep_feeding_watchdog(period);
            }
        })
        .context("failed to spawn control loop thread")?;
    Ok(())
}

fn sleep_feeding_watchdog(period: Duration) {
    let deadline = Instant::now() + period;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        if remaining.is_zero() {
            break;
        }
        feed_watchdog();
        thread::sleep(remaining.min(Duration::from_secs(1)));
    }
}

fn restart() -> ! {
    thread::sleep(Duration::from_millis(100));
    unsafe { esp_idf_svc::sys::esp_restart() };
    // esp_restart does not return.
    #[allow(clippy::empty_loop)]
    loop {}
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match self.read(NVS_RUNTIME_KEY)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(&value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }

    fn open(&self) -> Result<(std::sync::MutexGuard<'_, ()>, EspNvs<esp_idf_svc::nvs::NvsDefault>), StorageError> {
        let guard = self
            .lock
            .lock()
            .map_err(|_| StorageError("nvs lock poisoned".to_string()))?;
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)
            .map_err(|err| StorageError(err.to_string()))?;
        Ok((guard, nvs))
    }
}

impl KeyValueStore for NvsStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let (_guard, nvs) = self.open()?;
        let mut buffer = vec![0_u8; NVS_VALUE_CAPACITY];
        nvs.get_str(key, &mut buffer)
            .map(|value| value.map(str::to_string))
            .map_err(|err| StorageError(err.to_string()))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let (_guard, mut nvs) = self.open()?;
        nvs.set_str(key, value)
            .map_err(|err| StorageError(err.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let (_guard, mut nvs) = self.open()?;
        nvs.remove(key)
            .map(|_| ())
            .map_err(|err| StorageError(err.to_string()))
    }
}

impl Ds18b20Probe {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut one_wire_pin = PinDriver::input_output_od(pin)?;
        one_wire_pin.set_pull(Pull::Up)?;
        one_wire_pin.set_high()?;

        let one_wire = OneWire::new(one_wire_pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;

        let mut probe = Self {
            one_wire,
            address: None,
            delay: Ets,
        };
        probe.refresh_address();
        Ok(probe)
    }

    fn refresh_address(&mut self) {
        let mut found = None;
        for address in self.one_wire.devices(false, &mut self.delay) {
            match address {
                Ok(address) if address.family_code() == ds18b20::FAMILY_CODE => {
                    found = Some(address);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("one-wire device scan failed: {err:?}");
                    break;
                }
            }
        }

        self.address = found;
        match found {
            Some(address) => info!("DS18B20 ready on GPIO{ONE_WIRE_PIN} ({address:?})"),
            None => warn!("no DS18B20 found on GPIO{ONE_WIRE_PIN}"),
        }
    }
}

impl TemperatureProbe for Ds18b20Probe {
    fn read_celsius(&mut self) -> f32 {
        if self.address.is_none() {
            self.refresh_address();
        }
        let Some(address) = self.address else {
            return FAULT_SENTINEL_C;
        };

        let sensor = match Ds18b20::new::<core::convert::Infallible>(address) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("invalid DS18B20 address {address:?}: {err:?}");
                self.address = None;
                return FAULT_SENTINEL_C;
            }
        };

        if let Err(err) =
            ds18b20::start_simultaneous_temp_measurement(&mut self.one_wire, &mut self.delay)
        {
            warn!("failed to start DS18B20 conversion: {err:?}");
            self.address = None;
            return FAULT_SENTINEL_C;
        }
        Resolution::Bits12.delay_for_measurement_time(&mut self.delay);

        match sensor.read_data(&mut self.one_wire, &mut self.delay) {
            Ok(data) => data.temperature,
            Err(err) => {
                warn!("failed to read DS18B20 data: {err:?}");
                self.address = None;
                FAULT_SENTINEL_C
            }
        }
    }
}

impl GpioRelays {
    fn new(pins: [AnyOutputPin; CHANNEL_COUNT]) -> anyhow::Result<Self> {
        let [a, b, c, d] = pins;
        let mut pins = [
            PinDriver::output(a)?,
            PinDriver::output(b)?,
            PinDriver::output(c)?,
            PinDriver::output(d)?,
        ];
        // Reset level is LOW, which energizes an active-low relay.
        for pin in pins.iter_mut() {
            pin.set_high()?;
        }
        Ok(Self { pins })
    }
}

impl RelayOutput for GpioRelays {
    fn drive(&mut self, index: usize, energized: bool) {
        let Some(pin) = self.pins.get_mut(index) else {
            return;
        };
        let result = if energized { pin.set_low() } else { pin.set_high() };
        if let Err(err) = result {
            warn!("failed to drive relay {}: {err}", index + 1);
        }
    }
}

impl HttpTransport for EspTransport {
    fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        if !is_wifi_station_connected() {
            return Err(TransportError::Offline);
        }

        let http_conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&http_conf).map_err(io_error)?;
        let mut client = HttpClient::wrap(connection);

        let url = format!("{}{}", self.base_url, request.path);
        let content_length = request.body.as_ref().map(|body| body.len().to_string());
        let mut headers: Vec<(&str, &str)> = request
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        if let Some(length) = content_length.as_deref() {
            headers.push(("Content-Length", length));
        }

        let method = match request.method {
            Method::Get => HttpMethod::Get,
            Method::Post => HttpMethod::Post,
            Method::Put => HttpMethod::Put,
        };

        let mut outgoing = client.request(method, &url, &headers).map_err(io_error)?;
        if let Some(body) = &request.body {
            outgoing.write_all(body.as_bytes()).map_err(io_error)?;
            outgoing.flush().map_err(io_error)?;
        }
        let mut response = outgoing.submit().map_err(io_error)?;

        let status = response.status();
        let body = read_body(|chunk| response.read(chunk))?;
        Ok(ApiResponse::new(status, body))
    }
}

fn io_error<E: core::fmt::Debug>(err: E) -> TransportError {
    TransportError::Io(format!("{err:?}"))
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
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
