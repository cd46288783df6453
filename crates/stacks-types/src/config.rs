//! Configuration types for Stacks.
//!
//! `StacksConfig` represents the top-level `config.toml`: the HTTP server
//! bind address and the tuning knobs of the real-time hub.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.stacks/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacksConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,

    /// Bridge tracing spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            json_logs: false,
            otel: false,
        }
    }
}

/// Real-time hub tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Capacity of the router queue. Sized to absorb bursts; overflow drops.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-connection outbound buffer. A full buffer marks a slow consumer.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Maximum size of one inbound WebSocket message, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Maximum length of a message body, in characters.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Read deadline, refreshed by every inbound frame including pongs.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,

    /// Interval between server pings. Must be shorter than `pong_wait_secs`.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// How long shutdown waits for the router to drain queued messages.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Only accept upgrades whose `Origin` header equals this value.
    /// `None` accepts any origin.
    #[serde(default)]
    pub allowed_origin: Option<String>,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_outbound_buffer() -> usize {
    32
}

/// Longest JSON encoding of one character: a `\uXXXX\uXXXX` surrogate pair.
const MAX_ENCODED_CHAR_BYTES: usize = 12;

/// Room for `{"chat_id":<u64>,"content":""}` plus incidental whitespace.
const FRAME_ENVELOPE_BYTES: usize = 256;

/// Smallest frame size that fits any body of `max_content_chars` characters.
pub fn frame_bytes_floor(max_content_chars: usize) -> usize {
    max_content_chars
        .saturating_mul(MAX_ENCODED_CHAR_BYTES)
        .saturating_add(FRAME_ENVELOPE_BYTES)
}

fn default_max_frame_bytes() -> usize {
    frame_bytes_floor(default_max_content_chars())
}

fn default_max_content_chars() -> usize {
    4000
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    54
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            outbound_buffer: default_outbound_buffer(),
            max_frame_bytes: default_max_frame_bytes(),
            max_content_chars: default_max_content_chars(),
            pong_wait_secs: default_pong_wait_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            allowed_origin: None,
        }
    }
}

impl HubConfig {
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Clamp values that would break the hub: zero-capacity channels, a
    /// frame limit too small for the longest allowed body, or a ping
    /// interval that never beats the read deadline.
    pub fn sanitized(mut self) -> Self {
        self.queue_capacity = self.queue_capacity.max(1);
        self.outbound_buffer = self.outbound_buffer.max(1);
        self.max_content_chars = self.max_content_chars.max(1);
        self.max_frame_bytes = self
            .max_frame_bytes
            .max(frame_bytes_floor(self.max_content_chars));
        self.pong_wait_secs = self.pong_wait_secs.max(2);
        if self.ping_interval_secs == 0 || self.ping_interval_secs >= self.pong_wait_secs {
            self.ping_interval_secs = self.pong_wait_secs * 9 / 10;
        }
        self
    }
}
