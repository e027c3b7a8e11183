//! Driver configuration.
//!
//! All groups implement `Default` with the timings the controller firmware
//! expects, and can be loaded from JSON. Durations are written as integer
//! milliseconds:
//!
//! ```json
//! {
//!   "function_call": { "attempts": 3, "network_timeout": 1000, "retry_delay": 1000 },
//!   "command_class": { "report_timeout": 10000 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default attempts per controller function.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default Ack/Response wait per attempt.
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(1);

/// Default wait after a Cancel byte before resending.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Retry policy for a single controller function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionCallConfig {
    /// Send attempts before the call fails.
    pub attempts: u32,
    /// Step timeout while awaiting Ack or Response.
    #[serde(with = "duration_ms")]
    pub network_timeout: Duration,
    /// Delay after the controller answers Cancel.
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
}

impl Default for FunctionCallConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Serial link tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Capacity of the outbound writer queue.
    pub channel_capacity: usize,
    /// Capacity of the frame event broadcast.
    pub event_capacity: usize,
    /// A partial frame is discarded after this much silence.
    #[serde(with = "duration_ms")]
    pub inter_byte_timeout: Duration,
    /// Size of the read buffer handed to the stream.
    pub read_buffer_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            event_capacity: 256,
            inter_byte_timeout: Duration::from_millis(1600),
            read_buffer_size: 256,
        }
    }
}

/// Command-class layer timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandClassConfig {
    /// How long a Get waits for its Report.
    #[serde(with = "duration_ms")]
    pub report_timeout: Duration,
    /// How long SendData waits for the transmit-complete callback.
    #[serde(with = "duration_ms")]
    pub transmit_callback_timeout: Duration,
    /// Capacity of the report and wake-up event feeds.
    pub event_capacity: usize,
}

impl Default for CommandClassConfig {
    fn default() -> Self {
        Self {
            report_timeout: Duration::from_secs(10),
            transmit_callback_timeout: Duration::from_secs(65),
            event_capacity: 256,
        }
    }
}

/// Inclusion/exclusion timings that are not phase deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InclusionConfig {
    /// Pause after stopping a stale session.
    #[serde(with = "duration_ms")]
    pub stale_session_delay: Duration,
    /// Bound on waiting for Done after a Stop.
    #[serde(with = "duration_ms")]
    pub stop_done_timeout: Duration,
}

impl Default for InclusionConfig {
    fn default() -> Self {
        Self {
            stale_session_delay: Duration::from_secs(1),
            stop_done_timeout: Duration::from_secs(2),
        }
    }
}

/// Serial port settings (8 data bits, no parity, one stop bit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Complete driver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub function_call: FunctionCallConfig,
    pub link: LinkConfig,
    pub command_class: CommandClassConfig,
    pub inclusion: InclusionConfig,
    pub serial: SerialSettings,
}

impl ClientConfig {
    /// Parse configuration from a JSON string; missing fields use defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
