use std::time::Duration;

use bevy::prelude::Resource;
use flightlink_common::error::LinkError;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`LinkSettings::host`].
pub const HOST_ENV: &str = "FLIGHTLINK_HOST";
/// Environment variable overriding [`LinkSettings::port`].
pub const PORT_ENV: &str = "FLIGHTLINK_PORT";

#[derive(Clone, Debug, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
/// Settings to configure a telemetry link
pub struct LinkSettings {
    /// Host the simulator listens on
    ///
    /// ## Default
    /// `127.0.0.1`
    pub host: String,
    /// Port of the simulator's line protocol server
    ///
    /// ## Default
    /// 5402, the port FlightGear's telnet interface is usually started on
    pub port: u16,
    /// Pause between two poll passes (default: 250ms, about 4Hz)
    pub poll_interval: Duration,
    /// How often the stall monitor looks at the outstanding request (default: 2s)
    pub stall_check_period: Duration,
    /// How long a request may stay unanswered before the server is reported busy (default: 8s)
    pub stall_threshold: Duration,
    /// Deadline for a single response. `None` waits forever.
    ///
    /// A missed deadline is a transport fault and forces a reconnect.
    /// Default: 30s
    pub response_timeout: Option<Duration>,
    /// Deadline for establishing the connection (default: 5s)
    pub connect_timeout: Duration,
    /// Number of undelivered advisories kept before the oldest are dropped (default: 64)
    pub advisory_capacity: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5402,
            poll_interval: Duration::from_millis(250),
            stall_check_period: Duration::from_secs(2),
            stall_threshold: Duration::from_secs(8),
            response_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(5),
            advisory_capacity: 64,
        }
    }
}

impl LinkSettings {
    /// Default settings with `FLIGHTLINK_HOST` / `FLIGHTLINK_PORT` applied.
    pub fn from_env() -> Result<Self, LinkError> {
        Self::default().with_overrides(
            std::env::var(HOST_ENV).ok().as_deref(),
            std::env::var(PORT_ENV).ok().as_deref(),
        )
    }

    fn with_overrides(mut self, host: Option<&str>, port: Option<&str>) -> Result<Self, LinkError> {
        if let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) {
            self.host = host.to_string();
        }
        if let Some(port) = port {
            self.port = port.trim().parse().map_err(|_| {
                LinkError::Config(format!("{PORT_ENV}={port} is not a port number"))
            })?;
        }
        Ok(self)
    }
}
