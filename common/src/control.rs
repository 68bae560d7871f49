use core::time::Duration;

use log::{info, warn};

use crate::{
    api::{CommandStatus, HttpTransport, RelayStateReport},
    channel::{ChannelBank, RelayOutput, CHANNEL_COUNT},
    command::DeviceCommand,
    config::{clamp_update_frequency, ControlConfig, Settings},
    error::{CommandError, StorageError, SyncError},
    events::EventLog,
    history::{HistoryRecord, TemperatureHistory},
    sampling::{TemperatureSource, ValidatedTemperature},
    session::KeyValueStore,
    sync::{SyncClient, SyncState},
    types::{ChannelMode, ChannelRole, DeviceStatus},
    units::{display_temperature, unit_symbol},
};

/// What the device reports about itself at registration and heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub hostname: String,
    pub mac_address: String,
    pub ip_address: String,
    pub firmware_version: String,
}

#[derive(Debug, Clone, Copy)]
struct IntervalGate {
    period_ms: u64,
    last_ms: Option<u64>,
}

impl IntervalGate {
    fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_ms: None,
        }
    }

    fn is_due(&self, now_ms: u64) -> bool {
        match self.last_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.period_ms,
        }
    }

    fn mark(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub temperature: Option<f32>,
    pub read_ok: bool,
    /// Indices of channels whose output flipped this tick.
    pub changed: Vec<usize>,
    pub restart_requested: bool,
}

pub struct ControlLoop<S, O, T, K, H> {
    config: ControlConfig,
    identity: DeviceIdentity,
    source: S,
    bank: ChannelBank<O>,
    sync: SyncClient<T, K>,
    store: K,
    history: H,
    events: EventLog,
    /// Monotonic time of the latest tick, used to stamp events.
    now_ms: u64,
    temperature: Option<ValidatedTemperature>,
    last_read_ok: bool,
    update_frequency_seconds: u32,
    use_fahrenheit: bool,
    /// Channels that need a relay-state push.
    dirty: [bool; CHANNEL_COUNT],
    registration_gate: IntervalGate,
    heartbeat_gate: IntervalGate,
    telemetry_gate: IntervalGate,
    command_gate: IntervalGate,
}

impl<S, O, T, K, H> ControlLoop<S, O, T, K, H>
where
    S: TemperatureSource,
    O: RelayOutput,
    T: HttpTransport,
    K: KeyValueStore,
    H: TemperatureHistory,
{
    /// Restores persisted settings into `bank` before the first tick.
    pub fn new(
        config: ControlConfig,
        identity: DeviceIdentity,
        source: S,
        mut bank: ChannelBank<O>,
        sync: SyncClient<T, K>,
        store: K,
        history: H,
    ) -> Self {
        let settings = Settings::load(&store).unwrap_or_else(|err| {
            warn!("failed to load settings: {err}; using defaults");
            Settings::default()
        });
        settings.apply_to(&mut bank);
        info!(
            "settings loaded: update every {}s, unit {}",
            settings.update_frequency_seconds,
            unit_symbol(settings.use_fahrenheit)
        );

        Self {
            registration_gate: IntervalGate::new(config.registration_retry_ms),
            heartbeat_gate: IntervalGate::new(config.heartbeat_interval_ms),
            telemetry_gate: IntervalGate::new(config.telemetry_interval_ms),
            command_gate: IntervalGate::new(config.command_poll_interval_ms),
            config,
            identity,
            source,
            bank,
            sync,
            store,
            history,
            events: EventLog::default(),
            now_ms: 0,
            temperature: None,
            last_read_ok: false,
            update_frequency_seconds: settings.update_frequency_seconds,
            use_fahrenheit: settings.use_fahrenheit,
            dirty: [true; CHANNEL_COUNT],
        }
    }

    /// One control period. `now_ms` is monotonic; `unix_seconds` is the wall
    /// clock, which may not be synced yet.
    pub fn tick(&mut self, now_ms: u64, unix_seconds: i64) -> TickReport {
        let mut report = TickReport::default();
        self.now_ms = now_ms;

        match self.source.acquire() {
            Ok(celsius) => {
                self.temperature = Some(ValidatedTemperature {
                    celsius,
                    tick: now_ms,
                });
                self.last_read_ok = true;
                report.read_ok = true;

                let record = HistoryRecord::new(unix_seconds, now_ms, celsius, self.config.sensor_id);
                if let Err(err) = self.history.append(record) {
                    warn!("failed to append temperature history: {err}");
                }
            }
            Err(failure) => {
                self.last_read_ok = false;
                self.note(format!("Sensor read failed: {failure}"));
                match self.temperature {
                    Some(last) => warn!("{failure}; keeping last reading {:.2}C", last.celsius),
                    None => warn!("{failure}; no reading yet, relays not evaluated"),
                }
            }
        }

        if let Some(reading) = self.temperature {
            report.temperature = Some(reading.celsius);
            for change in self.bank.apply_control(reading.celsius) {
                self.dirty[change.index] = true;
                report.changed.push(change.index);
                self.note(format!(
                    "Relay {} -> {} @ {:.1}C",
                    change.index + 1,
                    if change.new_state { "ON" } else { "OFF" },
                    change.temp
                ));
            }
        }

        report.restart_requested = self.sync_remote(now_ms);
        report
    }

    /// Returns whether a remote restart was requested.
    fn sync_remote(&mut self, now_ms: u64) -> bool {
        if self.sync.state() == SyncState::Unregistered {
            if !self.registration_gate.is_due(now_ms) {
                return false;
            }
            self.registration_gate.mark(now_ms);

            let identity = &self.identity;
            match self.sync.register(
                &identity.hostname,
                &identity.mac_address,
                &identity.ip_address,
                &identity.firmware_version,
            ) {
                Ok(device_id) => {
                    self.note(format!("Device registered with ID: {device_id}"));
                    self.dirty = [true; CHANNEL_COUNT];
                }
                Err(err) => {
                    self.report_failure("registration", Err(err));
                    return false;
                }
            }
        }

        if self.heartbeat_gate.is_due(now_ms) {
            self.heartbeat_gate.mark(now_ms);
            let result = self.sync.heartbeat(&self.identity.ip_address);
            self.report_failure("heartbeat", result);
        }

        if let Some(reading) = self.temperature {
            if self.telemetry_gate.is_due(now_ms) {
                self.telemetry_gate.mark(now_ms);
                let result = self.sync.push_telemetry(reading.celsius, self.config.sensor_id);
                self.report_failure("telemetry push", result);
            }
        }

        self.push_dirty_relays();

        if self.command_gate.is_due(now_ms) {
            self.command_gate.mark(now_ms);
            match self.sync.poll_commands() {
                Ok(_) => return self.process_pending_commands(),
                Err(err) => self.report_failure("command poll", Err(err)),
            }
        }

        false
    }

    fn push_dirty_relays(&mut self) {
        for index in 0..CHANNEL_COUNT {
            if !self.dirty[index] || self.sync.state() != SyncState::Registered {
                continue;
            }
            let Some(channel) = self.bank.channel(index) else {
                continue;
            };

            let report = RelayStateReport {
                relay_number: index as u8 + 1,
                state: channel.output_state,
                mode: channel.mode.as_str(),
                temp_on: channel.threshold_on,
                temp_off: channel.threshold_off,
                name: Some(format!("Relay {}", index + 1)),
            };

            match self.sync.push_relay_state(&report) {
                Ok(()) => self.dirty[index] = false,
                Err(err) => {
                    // Remaining channels stay dirty for the next tick.
                    self.report_failure(&format!("relay {} state push", index + 1), Err(err));
                    return;
                }
            }
        }
    }

    fn process_pending_commands(&mut self) -> bool {
        let mut restart_requested = false;

        for pending in self.sync.take_pending_commands() {
            let outcome = DeviceCommand::try_from(&pending).and_then(|command| {
                if command == DeviceCommand::Restart {
                    restart_requested = true;
                    Ok(())
                } else {
                    self.apply_command(command)
                }
            });

            let result = match &outcome {
                Ok(()) => {
                    info!("command {} ({}) completed", pending.id, pending.kind);
                    self.note(format!("Command {} ({}) completed", pending.id, pending.kind));
                    self.sync.acknowledge_command(pending.id, CommandStatus::Completed, None)
                }
                Err(err) => {
                    warn!("command {} ({}) failed: {err}", pending.id, pending.kind);
                    let message = err.to_string();
                    self.note(format!("Command {} ({}) failed: {message}", pending.id, pending.kind));
                    self.sync
                        .acknowledge_command(pending.id, CommandStatus::Failed, Some(&message))
                }
            };
            self.report_failure("command acknowledgement", result);
        }

        if restart_requested {
            info!("restart requested by remote command");
        }
        restart_requested
    }

    fn apply_command(&mut self, command: DeviceCommand) -> Result<(), CommandError> {
        let applied = match command {
            DeviceCommand::SetRelayMode { index, mode } => self.set_mode(index, mode),
            DeviceCommand::SetRelayRole { index, role } => self.set_role(index, role),
            DeviceCommand::SetThresholds {
                index,
                threshold_on,
                threshold_off,
            } => self.set_thresholds(index, threshold_on, threshold_off),
            DeviceCommand::SetFrequency { seconds } => {
                self.set_update_frequency(seconds);
                true
            }
            DeviceCommand::SetUnit { fahrenheit } => {
                self.set_use_fahrenheit(fahrenheit);
                true
            }
            DeviceCommand::Restart => true,
        };

        if applied {
            Ok(())
        } else {
            Err(CommandError::InvalidParams("relay index out of range".to_string()))
        }
    }

    pub fn set_mode(&mut self, index: usize, mode: ChannelMode) -> bool {
        let applied = self.bank.set_mode(index, mode);
        if applied {
            info!("Relay {} mode set to {mode}", index + 1);
            self.note(format!("Relay {} mode: {mode}", index + 1));
            self.channel_reconfigured(index);
        }
        applied
    }

    pub fn set_role(&mut self, index: usize, role: ChannelRole) -> bool {
        let applied = self.bank.set_role(index, role);
        if applied {
            self.note(format!("Relay {} type: {role}", index + 1));
            self.channel_reconfigured(index);
        }
        applied
    }

    pub fn set_thresholds(&mut self, index: usize, threshold_on: f32, threshold_off: f32) -> bool {
        if !threshold_on.is_finite() || !threshold_off.is_finite() {
            return false;
        }
        let applied = self.bank.set_thresholds(index, threshold_on, threshold_off);
        if applied {
            info!("Relay {} thresholds set to on {threshold_on:.1}C / off {threshold_off:.1}C", index + 1);
            self.note(format!(
                "Relay {} thresholds: ON={threshold_on:.1} OFF={threshold_off:.1}",
                index + 1
            ));
            self.channel_reconfigured(index);
        }
        applied
    }

    /// Returns the applied value after clamping.
    pub fn set_update_frequency(&mut self, seconds: u32) -> u32 {
        self.update_frequency_seconds = clamp_update_frequency(seconds);
        info!("update frequency set to {}s", self.update_frequency_seconds);
        self.note(format!("Update frequency set to {}s", self.update_frequency_seconds));
        self.save_settings();
        self.update_frequency_seconds
    }

    pub fn set_use_fahrenheit(&mut self, use_fahrenheit: bool) {
        self.use_fahrenheit = use_fahrenheit;
        info!("display unit set to {}", unit_symbol(use_fahrenheit));
        self.note(format!(
            "Unit changed to {}",
            if use_fahrenheit { "Fahrenheit" } else { "Celsius" }
        ));
        self.save_settings();
    }

    /// Returns whether there was anything to clear.
    pub fn clear_history(&mut self) -> Result<bool, StorageError> {
        let cleared = self.history.clear()?;
        if cleared {
            info!("temperature history cleared");
            self.note("Temperature data cleared by user");
        }
        Ok(cleared)
    }

    fn note(&self, message: impl Into<String>) {
        self.events.record(self.now_ms, message);
    }

    fn report_failure(&self, what: &str, result: Result<(), SyncError>) {
        if let Err(err) = result {
            warn!("{what} failed: {err}");
            self.note(format!("{what} failed: {err}"));
        }
    }

    fn channel_reconfigured(&mut self, index: usize) {
        self.dirty[index] = true;
        self.save_settings();
    }

    fn save_settings(&self) {
        let settings = Settings::capture(&self.bank, self.update_frequency_seconds, self.use_fahrenheit);
        if let Err(err) = settings.save(&self.store) {
            warn!("failed to save settings: {err}");
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.update_frequency_seconds))
    }

    pub fn temperature(&self) -> Option<ValidatedTemperature> {
        self.temperature
    }

    pub fn status(&self) -> DeviceStatus {
        let current_temp = self.temperature.map(|reading| reading.celsius);
        DeviceStatus {
            current_temp,
            display_temp: current_temp.map(|celsius| display_temperature(celsius, self.use_fahrenheit)),
            unit: unit_symbol(self.use_fahrenheit),
            sensor_valid: self.last_read_ok,
            update_frequency: self.update_frequency_seconds,
            use_fahrenheit: self.use_fahrenheit,
            registered: self.sync.state() == SyncState::Registered,
            device_id: self.sync.session().device_id(),
            pending_commands: self.sync.pending_commands().len(),
            relays: self.bank.status(),
        }
    }

    pub fn recent_history(&self, limit: usize) -> Vec<String> {
        self.history.recent(limit)
    }

    /// Shared handle; binaries record their own lifecycle events through it.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn bank(&self) -> &ChannelBank<O> {
        &self.bank
    }

    pub fn sync(&self) -> &SyncClient<T, K> {
        &self.sync
    }
}
