use log::{debug, info, warn};

use crate::{
    api::{
        command_path, heartbeat_path, pending_commands_path, relay_state_path, temperature_path,
        ApiRequest, ApiResponse, CommandResult, CommandStatus, CommandStatusUpdate,
        HeartbeatRequest, HttpTransport, PendingCommandsResponse, RegisterRequest,
        RegisterResponse, RelayStateReport, TemperatureReport, API_KEY_HEADER, REGISTER_PATH,
    },
    error::{StorageError, SyncError},
    session::{DeviceSession, KeyValueStore},
};

pub const MAX_PENDING_COMMANDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unregistered,
    Registered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub id: u64,
    pub kind: String,
    /// Params exactly as received, re-encoded as JSON text.
    pub params: String,
    pub valid: bool,
}

pub type PendingCommands = heapless::Vec<PendingCommand, MAX_PENDING_COMMANDS>;

pub struct SyncClient<T, K> {
    transport: T,
    store: K,
    session: DeviceSession,
    api_key: String,
    pending: PendingCommands,
}

impl<T: HttpTransport, K: KeyValueStore> SyncClient<T, K> {
    /// Builds the client around whatever credentials `store` already holds.
    pub fn new(transport: T, store: K, api_key: impl Into<String>) -> Result<Self, StorageError> {
        let session = DeviceSession::load_from_storage(&store)?;
        Ok(Self {
            transport,
            store,
            session,
            api_key: api_key.into(),
            pending: PendingCommands::new(),
        })
    }

    pub fn state(&self) -> SyncState {
        if self.session.is_registered() {
            SyncState::Registered
        } else {
            SyncState::Unregistered
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn register(
        &mut self,
        hostname: &str,
        mac_address: &str,
        ip_address: &str,
        firmware_version: &str,
    ) -> Result<u64, SyncError> {
        let request = ApiRequest::post_json(
            REGISTER_PATH,
            &RegisterRequest {
                hostname,
                mac_address,
                ip_address,
                firmware_version,
            },
        )?
        .with_header(API_KEY_HEADER, self.api_key.as_str());

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(status_error(&response));
        }

        let parsed: RegisterResponse = serde_json::from_str(&response.body)
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))?;

        let device_id = parsed
            .device_id
            .filter(|id| *id > 0)
            .ok_or_else(|| SyncError::MalformedResponse("missing device_id".to_string()))?;
        let token = parsed
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::MalformedResponse("missing token".to_string()))?;

        self.session.persist(&self.store, device_id, &token)?;
        info!("registered as device {device_id}");
        Ok(device_id)
    }

    pub fn heartbeat(&mut self, ip_address: &str) -> Result<(), SyncError> {
        let device_id = self.registered_id()?;
        let request = ApiRequest::post_json(heartbeat_path(device_id), &HeartbeatRequest { ip_address })?;
        self.send_authorized(request)?;
        debug!("heartbeat sent");
        Ok(())
    }

    pub fn push_telemetry(&mut self, temperature: f32, sensor_id: u32) -> Result<(), SyncError> {
        let device_id = self.registered_id()?;
        let request = ApiRequest::post_json(
            temperature_path(device_id),
            &TemperatureReport {
                temperature,
                sensor_id,
            },
        )?;
        self.send_authorized(request)?;
        Ok(())
    }

    pub fn push_relay_state(&mut self, report: &RelayStateReport) -> Result<(), SyncError> {
        let device_id = self.registered_id()?;
        let request = ApiRequest::post_json(relay_state_path(device_id), report)?;
        self.send_authorized(request)?;
        Ok(())
    }

    /// Replaces the pending set on success and returns its new size. On any
    /// failure the previous set is kept.
    pub fn poll_commands(&mut self) -> Result<usize, SyncError> {
        let device_id = self.registered_id()?;
        let response = self.send_authorized(ApiRequest::get(pending_commands_path(device_id)))?;

        let parsed: PendingCommandsResponse = serde_json::from_str(&response.body)
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))?;

        let received = parsed.commands.len();
        let mut pending = PendingCommands::new();
        for raw in parsed.commands.into_iter().take(MAX_PENDING_COMMANDS) {
            let pushed = pending.push(PendingCommand {
                id: raw.id,
                valid: !raw.kind.is_empty(),
                kind: raw.kind,
                params: raw.params.to_string(),
            });
            debug_assert!(pushed.is_ok());
        }

        if received > MAX_PENDING_COMMANDS {
            warn!(
                "received {received} pending commands, dropping {}",
                received - MAX_PENDING_COMMANDS
            );
        }
        if !pending.is_empty() {
            info!("received {} pending commands", pending.len());
        }

        self.pending = pending;
        Ok(self.pending.len())
    }

    /// Safe to resend: the remote keys status by command id.
    pub fn acknowledge_command(
        &mut self,
        command_id: u64,
        status: CommandStatus,
        message: Option<&str>,
    ) -> Result<(), SyncError> {
        let device_id = self.registered_id()?;
        let request = ApiRequest::put_json(
            command_path(device_id, command_id),
            &CommandStatusUpdate {
                status,
                result: message.map(|message| CommandResult {
                    message: message.to_string(),
                }),
            },
        )?;
        self.send_authorized(request)?;
        info!("command {command_id} status updated to {status:?}");
        Ok(())
    }

    pub fn pending_commands(&self) -> &[PendingCommand] {
        &self.pending
    }

    pub fn take_pending_commands(&mut self) -> PendingCommands {
        core::mem::take(&mut self.pending)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn registered_id(&self) -> Result<u64, SyncError> {
        match self.session.device_id() {
            Some(id) if self.session.is_registered() => Ok(id),
            _ => Err(SyncError::NotRegistered),
        }
    }

    fn send_authorized(&mut self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let request = self.session.authorize(request)?;
        let response = self.transport.send(&request)?;

        if response.status == 401 {
            warn!("{} {} rejected credentials; dropping session", request.method.as_str(), request.path);
            if let Err(err) = self.session.invalidate(&self.store) {
                warn!("failed to clear stored credentials: {err}");
            }
            return Err(SyncError::AuthRejected {
                status: response.status,
            });
        }
        if !response.is_success() {
            return Err(status_error(&response));
        }
        Ok(response)
    }
}

fn status_error(response: &ApiResponse) -> SyncError {
    if response.status == 401 {
        SyncError::AuthRejected {
            status: response.status,
        }
    } else {
        SyncError::Rejected {
            status: response.status,
        }
    }
}
