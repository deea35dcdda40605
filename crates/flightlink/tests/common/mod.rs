#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flightlink::error::LinkError;
use flightlink::{LinkSettings, Request, Telemetry, Transport, async_trait};
use parking_lot::Mutex;

/// What crossed the fake wire, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Wire {
    Sent(String),
    Received(String),
}

#[derive(Default)]
struct SimulatorState {
    responses: HashMap<String, String>,
    pending: VecDeque<String>,
    wire: Vec<Wire>,
    connected: bool,
    refuse_connections: bool,
    fail_reads: bool,
    hang_reads: bool,
    delay: Duration,
    interleaved: usize,
}

/// The remote end of a [`FakeTransport`], scripted by the tests.
#[derive(Clone, Default)]
pub struct FakeSimulator {
    state: Arc<Mutex<SimulatorState>>,
}

impl FakeSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulator answering every telemetry variable with a plausible number.
    pub fn flying() -> Self {
        let simulator = Self::new();
        for (variable, value) in [
            (Telemetry::Heading, "271.5"),
            (Telemetry::VerticalSpeed, "-3.2"),
            (Telemetry::GroundSpeed, "118"),
            (Telemetry::Airspeed, "112.4"),
            (Telemetry::Altitude, "3500"),
            (Telemetry::Roll, "1.25"),
            (Telemetry::Pitch, "-0.5"),
            (Telemetry::Altimeter, "3480"),
            (Telemetry::Longitude, "34.78"),
            (Telemetry::Latitude, "32.08"),
        ] {
            simulator.respond(variable.path(), value);
        }
        simulator
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            simulator: self.clone(),
        }
    }

    pub fn respond(&self, path: &str, response: &str) {
        self.state
            .lock()
            .responses
            .insert(path.to_string(), response.to_string());
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn hang_reads(&self, hang: bool) {
        self.state.lock().hang_reads = hang;
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn wire(&self) -> Vec<Wire> {
        self.state.lock().wire.clone()
    }

    /// Every line the engine sent, in order.
    pub fn sent(&self) -> Vec<String> {
        self.wire()
            .into_iter()
            .filter_map(|entry| match entry {
                Wire::Sent(line) => Some(line),
                Wire::Received(_) => None,
            })
            .collect()
    }

    /// Number of requests written while another one was still unanswered.
    pub fn interleaved(&self) -> usize {
        self.state.lock().interleaved
    }
}

/// An in-memory [`Transport`] backed by a [`FakeSimulator`].
#[derive(Default)]
pub struct FakeTransport {
    simulator: FakeSimulator,
}

#[async_trait]
impl Transport for FakeTransport {
    const TRANSPORT_NAME: &'static str = "Fake";

    async fn connect(&mut self, host: &str, port: u16) -> Result<(), LinkError> {
        let mut state = self.simulator.state.lock();
        if state.refuse_connections {
            return Err(LinkError::Connection {
                host: host.to_string(),
                port,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        state.connected = true;
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut state = self.simulator.state.lock();
        if !state.connected {
            return Err(LinkError::NotConnected);
        }
        if !state.pending.is_empty() {
            state.interleaved += 1;
        }
        state.pending.push_back(line.to_string());
        state.wire.push(Wire::Sent(line.to_string()));
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, LinkError> {
        let (delay, hang) = {
            let state = self.simulator.state.lock();
            (state.delay, state.hang_reads)
        };
        if hang {
            futures_lite::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            async_std::task::sleep(delay).await;
        }

        let mut state = self.simulator.state.lock();
        if state.fail_reads {
            state.connected = false;
            return Err(LinkError::Closed);
        }
        let line = state.pending.pop_front().ok_or(LinkError::Closed)?;
        let response = match Request::parse(&line) {
            Ok(Request::Get { path }) => state
                .responses
                .get(&path)
                .cloned()
                .unwrap_or_else(|| "0".to_string()),
            Ok(Request::Set { path, value }) => {
                state.responses.insert(path, value.to_string());
                value.to_string()
            }
            Err(_) => "ERR".to_string(),
        };
        state.wire.push(Wire::Received(response.clone()));
        Ok(response)
    }

    async fn disconnect(&mut self) {
        let mut state = self.simulator.state.lock();
        state.connected = false;
        state.pending.clear();
    }

    fn is_connected(&self) -> bool {
        self.simulator.is_connected()
    }
}

/// Settings scaled down so a test runs in milliseconds.
pub fn fast_settings() -> LinkSettings {
    LinkSettings {
        poll_interval: Duration::from_millis(10),
        stall_check_period: Duration::from_millis(20),
        stall_threshold: Duration::from_millis(60),
        response_timeout: Some(Duration::from_secs(2)),
        connect_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        std::thread::sleep(Duration::from_millis(5));
    }
}
