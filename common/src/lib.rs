pub mod api;
pub mod channel;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod history;
pub mod hysteresis;
pub mod sampling;
pub mod session;
pub mod sync;
pub mod types;
pub mod units;

#[cfg(test)]
mod test_support;

pub use api::{ApiRequest, ApiResponse, HttpTransport, Method};
pub use channel::{Channel, ChannelBank, RelayChanged, RelayOutput, CHANNEL_COUNT};
pub use command::DeviceCommand;
pub use config::{ApiConfig, ControlConfig, NetworkConfig, RuntimeConfig, Settings};
pub use control::{ControlLoop, DeviceIdentity, TickReport};
pub use error::{
    CommandError, ParseError, ReadFailure, SampleFault, StorageError, SyncError, TransportError,
};
pub use events::{EventLog, LogEntry};
pub use history::{HistoryRecord, MemoryHistory, TemperatureHistory};
pub use hysteresis::next_state;
pub use sampling::{SampleValidator, TemperatureProbe, TemperatureSource, ValidatedTemperature};
pub use session::{DeviceSession, KeyValueStore};
pub use sync::{PendingCommand, SyncClient, SyncState};
pub use types::{ChannelMode, ChannelRole, ChannelStatus, DeviceStatus};
