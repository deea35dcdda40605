//! FlightGear property protocol simulator
//!
//! Answers the line protocol spoken by flightlink:
//! - `get <path>` - replies with the current value of the property
//! - `set <path> <value>` - stores the value and replies with it
//!
//! A crude flight model moves the aircraft according to the control inputs, so
//! a connected client sees telemetry change over time.
//!
//! Usage:
//!   cargo run -p flightgear_simulator
//!   # SIM_ADDR changes the listen address (default 0.0.0.0:5402)
//!   # SIM_DELAY_MS delays every reply, to exercise the busy-server warning

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flightlink_common::{Control, Request, Telemetry};
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(100);

/// Simulator state - every property the protocol can address
#[derive(Debug)]
struct SimulatorState {
    properties: HashMap<&'static str, f64>,
    requests: u64,
}

impl Default for SimulatorState {
    fn default() -> Self {
        let mut properties = HashMap::new();
        for (variable, value) in [
            (Telemetry::Heading, 90.0),
            (Telemetry::VerticalSpeed, 0.0),
            (Telemetry::GroundSpeed, 120.0),
            (Telemetry::Airspeed, 115.0),
            (Telemetry::Altitude, 3500.0),
            (Telemetry::Roll, 0.0),
            (Telemetry::Pitch, 2.0),
            (Telemetry::Altimeter, 3480.0),
            (Telemetry::Longitude, 34.7818),
            (Telemetry::Latitude, 32.0853),
        ] {
            properties.insert(variable.path(), value);
        }
        for control in Control::ALL {
            properties.insert(control.path(), 0.0);
        }
        properties.insert(Control::Throttle.path(), 0.6);

        Self {
            properties,
            requests: 0,
        }
    }
}

impl SimulatorState {
    fn get(&self, property: impl Into<Property>) -> f64 {
        let path = match property.into() {
            Property::Telemetry(variable) => variable.path(),
            Property::Control(control) => control.path(),
        };
        self.properties.get(path).copied().unwrap_or_default()
    }

    fn put(&mut self, variable: Telemetry, value: f64) {
        self.properties.insert(variable.path(), value);
    }

    /// Handles one request line and returns the reply line.
    fn answer(&mut self, line: &str) -> String {
        self.requests += 1;
        match Request::parse(line) {
            Ok(Request::Get { path }) => match self.properties.get(path.as_str()) {
                Some(value) => format!("{value}"),
                None => format!("ERR unknown property {path}"),
            },
            Ok(Request::Set { path, value }) => match Control::from_path(&path) {
                Some(control) => {
                    let (min, max) = control.range();
                    let value = value.clamp(min, max);
                    self.properties.insert(control.path(), value);
                    info!("{} set to {}", path, value);
                    format!("{value}")
                }
                None => {
                    warn!("Refusing to set read-only or unknown property {}", path);
                    format!("ERR cannot set {path}")
                }
            },
            Err(err) => {
                warn!("{}", err);
                "ERR malformed request".to_string()
            }
        }
    }

    /// Advances the flight model by `dt`.
    fn step(&mut self, dt: Duration) {
        let dt = dt.as_secs_f64();
        let throttle = self.get(Control::Throttle);
        let aileron = self.get(Control::Aileron);
        let elevator = self.get(Control::Elevator);
        let rudder = self.get(Control::Rudder);

        let roll = self.get(Telemetry::Roll) + (aileron * 30.0 - self.get(Telemetry::Roll)) * dt;
        let pitch =
            self.get(Telemetry::Pitch) + (2.0 + elevator * 15.0 - self.get(Telemetry::Pitch)) * dt;
        let airspeed = self.get(Telemetry::Airspeed)
            + (60.0 + throttle * 120.0 - pitch * 2.0 - self.get(Telemetry::Airspeed)) * dt * 0.2;
        let heading =
            (self.get(Telemetry::Heading) + (roll * 0.1 + rudder * 3.0) * dt).rem_euclid(360.0);
        // Knots to feet per minute is roughly 101.3
        let vertical_speed = airspeed * 101.3 * pitch.to_radians().sin();
        let altitude = (self.get(Telemetry::Altitude) + vertical_speed * dt / 60.0).max(0.0);

        let distance = airspeed * dt / 3600.0 / 60.0;
        let latitude = self.get(Telemetry::Latitude) + distance * heading.to_radians().cos();
        let longitude = self.get(Telemetry::Longitude)
            + distance * heading.to_radians().sin() / latitude.to_radians().cos().max(0.01);

        self.put(Telemetry::Roll, roll);
        self.put(Telemetry::Pitch, pitch);
        self.put(Telemetry::Airspeed, airspeed);
        self.put(Telemetry::GroundSpeed, airspeed * 1.04);
        self.put(Telemetry::Heading, heading);
        self.put(Telemetry::VerticalSpeed, vertical_speed);
        self.put(Telemetry::Altitude, altitude);
        self.put(Telemetry::Altimeter, altitude - 20.0);
        self.put(Telemetry::Latitude, latitude.clamp(-90.0, 90.0));
        self.put(Telemetry::Longitude, (longitude + 180.0).rem_euclid(360.0) - 180.0);
    }
}

enum Property {
    Telemetry(Telemetry),
    Control(Control),
}

impl From<Telemetry> for Property {
    fn from(value: Telemetry) -> Self {
        Property::Telemetry(value)
    }
}

impl From<Control> for Property {
    fn from(value: Control) -> Self {
        Property::Control(value)
    }
}

type SharedState = Arc<RwLock<SimulatorState>>;

async fn serve_client(stream: TcpStream, state: SharedState, delay: Duration) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let reply = state.write().answer(&line);
        debug!("{} -> {}", line.trim(), reply);
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("SIM_ADDR").unwrap_or_else(|_| "0.0.0.0:5402".to_string());
    let delay = std::env::var("SIM_DELAY_MS")
        .ok()
        .and_then(|delay| delay.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or_default();

    let state = SharedState::default();

    let flight_model = state.clone();
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(TICK);
        loop {
            ticks.tick().await;
            flight_model.write().step(TICK);
        }
    });

    let listener = TcpListener::bind(&addr).await?;
    info!("FlightGear simulator listening on {} (reply delay {:?})", addr, delay);

    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!("Client connected: {}", peer);

        let state = state.clone();
        tokio::spawn(async move {
            match serve_client(stream, state.clone(), delay).await {
                Ok(()) => info!("Client disconnected: {}", peer),
                Err(err) => warn!("Client {} dropped: {}", peer, err),
            }
            debug!("{} requests served so far", state.read().requests);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_gets_and_sets() {
        let mut state = SimulatorState::default();
        assert_eq!(state.answer("get /instrumentation/gps/indicated-altitude-ft"), "3500");
        assert_eq!(state.answer("set /controls/flight/rudder -0.25"), "-0.25");
        assert_eq!(state.answer("get /controls/flight/rudder"), "-0.25");
        assert_eq!(state.answer("set /controls/engines/current-engine/throttle 3"), "1");
        assert_eq!(state.requests, 4);
    }

    #[test]
    fn refuses_what_it_cannot_answer() {
        let mut state = SimulatorState::default();
        assert!(state.answer("get /nowhere").starts_with("ERR"));
        assert!(state.answer("set /position/latitude-deg 0").starts_with("ERR"));
        assert!(state.answer("fly me to the moon").starts_with("ERR"));
    }

    #[test]
    fn flight_model_keeps_position_in_range() {
        let mut state = SimulatorState::default();
        state.answer("set /controls/flight/aileron 1");
        for _ in 0..10_000 {
            state.step(Duration::from_secs(1));
        }
        assert!((-90.0..=90.0).contains(&state.get(Telemetry::Latitude)));
        assert!((-180.0..=180.0).contains(&state.get(Telemetry::Longitude)));
        assert!((0.0..360.0).contains(&state.get(Telemetry::Heading)));
    }
}
