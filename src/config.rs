//! Configuration for the relay server.
//!
//! Defaults can be overridden via environment variables:
//!
//! - `RELAY_BIND_ADDR`        (default: "0.0.0.0")
//! - `RELAY_PORT`             (default: "12345")
//! - `RELAY_OUTBOUND_BUFFER`  (default: "64")
//! - `RELAY_MAX_LINE_LENGTH`  (default: "8192")
//! - `RELAY_WRITE_TIMEOUT_MS` (default: "5000")

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default bind interface
const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Default TCP port
const DEFAULT_PORT: u16 = 12345;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on. 0 picks a free port.
    pub port: u16,

    /// Capacity of each member's outbound queue. A member that falls this
    /// far behind is dropped from its channel on the next broadcast.
    pub outbound_buffer: usize,

    /// Maximum length of one inbound frame, in bytes.
    pub max_line_length: usize,

    /// Upper bound on a single socket write to one client.
    pub write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            outbound_buffer: 64,
            max_line_length: 8 * 1024,
            write_timeout: Duration::from_millis(5000),
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to the defaults.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Config::default();
        let bind_addr = env::var("RELAY_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = read_env_or_default("RELAY_PORT", defaults.port)?;
        let outbound_buffer = read_env_or_default("RELAY_OUTBOUND_BUFFER", defaults.outbound_buffer)?;
        let max_line_length = read_env_or_default("RELAY_MAX_LINE_LENGTH", defaults.max_line_length)?;
        let write_timeout_ms = read_env_or_default("RELAY_WRITE_TIMEOUT_MS", 5000u64)?;

        if outbound_buffer == 0 {
            return Err("RELAY_OUTBOUND_BUFFER must be at least 1".into());
        }

        Ok(Config {
            bind_addr,
            port,
            outbound_buffer,
            max_line_length,
            write_timeout: Duration::from_millis(write_timeout_ms),
        })
    }

    /// Override the bind address from a `host:port` string.
    pub fn with_listen_addr(mut self, addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{}'", addr))?;
        self.bind_addr = host.to_string();
        self.port = port.parse()?;
        Ok(self)
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_env_or_default<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::error::Error + 'static,
{
    match env::var(key) {
        Ok(val) => Ok(val.parse::<T>()?),
        Err(_) => Ok(default),
    }
}
