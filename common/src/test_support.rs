//! Fakes shared by the unit tests.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use embedded_hal::delay::DelayNs;

use crate::{
    api::{ApiRequest, ApiResponse, HttpTransport},
    channel::{RelayOutput, CHANNEL_COUNT},
    error::{ReadFailure, SampleFault, StorageError, TransportError},
    sampling::{TemperatureProbe, TemperatureSource, FAULT_SENTINEL_C},
    session::KeyValueStore,
};

/// Replays readings, then reports the fault sentinel.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    readings: VecDeque<f32>,
    pub reads: usize,
}

impl ScriptedProbe {
    pub fn new(readings: &[f32]) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
            reads: 0,
        }
    }
}

impl TemperatureProbe for ScriptedProbe {
    fn read_celsius(&mut self) -> f32 {
        self.reads += 1;
        self.readings.pop_front().unwrap_or(FAULT_SENTINEL_C)
    }
}

#[derive(Debug, Default)]
pub struct RecordedDelay {
    pub delays_ms: Vec<u32>,
}

impl DelayNs for RecordedDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.delays_ms.push(ms);
    }
}

/// Replays acquisition results, then fails.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    results: VecDeque<Result<f32, ReadFailure>>,
}

impl ScriptedSource {
    pub fn new(results: Vec<Result<f32, ReadFailure>>) -> Self {
        Self {
            results: results.into(),
        }
    }
}

impl TemperatureSource for ScriptedSource {
    fn acquire(&mut self) -> Result<f32, ReadFailure> {
        self.results.pop_front().unwrap_or(Err(ReadFailure {
            attempts: 2,
            last: SampleFault::Sentinel,
        }))
    }
}

#[derive(Debug, Default)]
pub struct RecordingRelays {
    pub levels: [Option<bool>; CHANNEL_COUNT],
    pub writes: usize,
}

impl RelayOutput for RecordingRelays {
    fn drive(&mut self, index: usize, energized: bool) {
        self.levels[index] = Some(energized);
        self.writes += 1;
    }
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    entries: BTreeMap<String, String>,
    fail_writes: bool,
}

/// Shared in-memory key-value store; clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().entries.get(key).cloned()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(StorageError(format!("write to `{key}` refused")));
        }
        inner.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.lock().unwrap().entries.remove(key);
        Ok(())
    }
}

/// Answers from a one-shot queue first, then from path routes. Anything
/// unmatched is treated as offline.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    queue: VecDeque<Result<ApiResponse, TransportError>>,
    routes: Vec<(String, ApiResponse)>,
    pub requests: Vec<ApiRequest>,
}

impl ScriptedTransport {
    pub fn route(mut self, pattern: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.push((pattern.to_string(), ApiResponse::new(status, body)));
        self
    }

    pub fn push(&mut self, result: Result<ApiResponse, TransportError>) {
        self.queue.push_back(result);
    }

    pub fn respond(&mut self, status: u16, body: impl Into<String>) {
        self.push(Ok(ApiResponse::new(status, body)));
    }

    pub fn fail(&mut self, err: TransportError) {
        self.push(Err(err));
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.push(request.clone());

        if let Some(result) = self.queue.pop_front() {
            return result;
        }
        self.routes
            .iter()
            .find(|(pattern, _)| request.path.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .ok_or(TransportError::Offline)
    }
}

/// Pending-command listing shaped like the backend's full command model.
pub fn backend_pending_commands(count: u64) -> String {
    let commands: Vec<serde_json::Value> = (1..=count)
        .map(|id| {
            serde_json::json!({
                "id": id,
                "device_id": 5,
                "type": "set_relay_mode",
                "params": {"relay_number": (id % 4) + 1, "mode": "AUTO"},
                "status": "pending",
                "result": null,
                "created_at": "2026-10-19T08:15:30.000000Z",
                "updated_at": "2026-10-19T08:15:30.000000Z",
                "executed_at": null,
            })
        })
        .collect();
    serde_json::json!({ "commands": commands }).to_string()
}

/// Hands out a body in fixed-size chunks, like a socket read loop.
pub struct ChunkedBody<'a> {
    remaining: &'a [u8],
    chunk: usize,
}

impl<'a> ChunkedBody<'a> {
    pub fn new(body: &'a str, chunk: usize) -> Self {
        Self {
            remaining: body.as_bytes(),
            chunk,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let count = self.chunk.min(buf.len()).min(self.remaining.len());
        buf[..count].copy_from_slice(&self.remaining[..count]);
        self.remaining = &self.remaining[count..];
        Ok(count)
    }
}
