//! The telemetry synchronization engine.
//!
//! A [`SyncEngine`] owns the [`Transport`], the [`VariableTable`] and the
//! [`CommandQueue`]. Once connected and started it runs three tasks against
//! them:
//!
//! - the poll loop, reading every [`Telemetry`](crate::Telemetry) variable in a fixed order and
//!   publishing what changed after each full pass,
//! - the command loop, sending queued `set` requests in submission order,
//! - the [`StallMonitor`], reporting requests that stay unanswered too long.
//!
//! Both loops go through [`SyncEngine::transact`], which holds the transport
//! for one full write/read round trip, so requests and responses can never
//! interleave on the wire.
//!
//! ```text
//! Disconnected --connect()--> Connected --disconnect()--> Disconnected
//!                                 |
//!                          transport fault
//!                                 v
//!                              Faulted ---teardown---> Disconnected
//! ```
//!
//! A fault always ends in `Disconnected` with every flight data field reset;
//! resuming takes an explicit `connect` followed by `start`. `reconnect()`
//! runs the same teardown on demand. While it runs the state is `Faulted` and
//! `connect` is refused.

use std::fmt::{self, Display};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use flightlink_common::error::LinkError;
use flightlink_common::{Control, Request, check_range};
use futures::lock::Mutex as TransportLock;
use futures_lite::future;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::AsyncChannel;
use crate::cancel::StopToken;
use crate::queue::CommandQueue;
use crate::runtime::{JoinHandle, Runtime, run_async};
use crate::settings::LinkSettings;
use crate::stall::{LatencyStopwatch, StallMonitor};
use crate::store::{Field, PropertyStore};
use crate::transport::Transport;
use crate::variables::VariableTable;

mod loops;

/// Shown in [`Field::ConnectionErrorMessage`] after a failed connect.
pub const CONNECTION_ERROR_MESSAGE: &str = "Unable to connect, please try again";

/// Lifecycle of the link to the simulator.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No channel is open.
    #[default]
    Disconnected,
    /// The channel is open.
    Connected,
    /// The channel failed and the session is being torn down.
    Faulted,
}

/// A non-fatal condition worth telling the user about.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Advisory {
    /// A telemetry response was not a number. The previous value is kept.
    InvalidValue {
        /// Property that was requested
        path: String,
        /// What came back instead
        response: String,
    },
    /// A position sample fell outside its geographic range. The previous
    /// value is kept.
    OutOfRange {
        /// Field the sample was meant for
        field: Field,
        /// Rejected sample
        value: f64,
    },
    /// The outstanding request has not been answered for a while.
    ServerBusy {
        /// How long the request has been waiting
        waiting: Duration,
    },
    /// The session ended because of a transport fault.
    ConnectionLost {
        /// The fault that ended it
        reason: String,
    },
}

impl Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::InvalidValue { path, .. } => {
                write!(f, "Invalid value received for {path}")
            }
            Advisory::OutOfRange { field, value } => {
                write!(f, "Invalid value received for {field}: {value} is out of range")
            }
            Advisory::ServerBusy { .. } => f.write_str("Notice: server is busy..."),
            Advisory::ConnectionLost { .. } => f.write_str(
                "Connection lost. Try to reconnect or close the simulator.",
            ),
        }
    }
}

struct ActiveSession {
    id: u64,
    stop: StopToken,
    tasks: Vec<Box<dyn JoinHandle>>,
}

#[derive(Default)]
struct Session {
    state: ConnectionState,
    active: Option<ActiveSession>,
    started: u64,
    connecting: bool,
}

/// Clears `Session::connecting` however the attempt ends.
struct ConnectAttempt<'a>(&'a Mutex<Session>);

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        self.0.lock().connecting = false;
    }
}

struct Shared<T: Transport> {
    settings: LinkSettings,
    transport: TransportLock<T>,
    // Also serializes publishing against resets, see `loops::publish`.
    variables: Mutex<VariableTable>,
    commands: CommandQueue,
    store: Arc<PropertyStore>,
    stopwatch: LatencyStopwatch,
    advisories: AsyncChannel<Advisory>,
    session: Mutex<Session>,
}

/// Keeps a [`PropertyStore`] in sync with a remote flight simulator.
///
/// Cloning is cheap and every clone drives the same session.
pub struct SyncEngine<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncEngine [{} transport, {:?}, {} pending commands]",
            T::TRANSPORT_NAME,
            self.state(),
            self.shared.commands.len()
        )
    }
}

impl<T: Transport> SyncEngine<T> {
    /// Creates a disconnected engine around `transport`.
    pub fn new(transport: T, settings: LinkSettings) -> Self {
        let store = Arc::new(PropertyStore::new());
        store.set(Field::Host, settings.host.clone());
        store.set(Field::Port, settings.port);

        Self {
            shared: Arc::new(Shared {
                advisories: AsyncChannel::bounded(settings.advisory_capacity),
                settings,
                transport: TransportLock::new(transport),
                variables: Mutex::new(VariableTable::new()),
                commands: CommandQueue::new(),
                store,
                stopwatch: LatencyStopwatch::new(),
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// The settings this engine was created with.
    pub fn settings(&self) -> &LinkSettings {
        &self.shared.settings
    }

    /// The published values.
    pub fn store(&self) -> &Arc<PropertyStore> {
        &self.shared.store
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.session.lock().state
    }

    /// Returns true while the poll and command loops are running.
    pub fn is_running(&self) -> bool {
        self.shared.session.lock().active.is_some()
    }

    /// Receiver for advisories.
    ///
    /// All receivers share one queue, so each advisory reaches one of them.
    /// When nobody reads, the oldest advisories are dropped first.
    pub fn advisories(&self) -> Receiver<Advisory> {
        self.shared.advisories.receiver.clone()
    }

    /// A copy of the raw values read during the current pass.
    pub fn variables(&self) -> VariableTable {
        self.shared.variables.lock().clone()
    }

    /// Number of `set` requests waiting to be sent.
    pub fn pending_commands(&self) -> usize {
        self.shared.commands.len()
    }

    /// The round-trip stopwatch watched by the stall monitor.
    pub fn stopwatch(&self) -> &LatencyStopwatch {
        &self.shared.stopwatch
    }

    /// Opens the transport to `host:port`.
    ///
    /// Clears [`Field::ConnectionErrorMessage`] first and sets it again if the
    /// attempt fails; the error is returned either way.
    ///
    /// Fails with [`LinkError::AlreadyConnected`] while connected or while
    /// another attempt is in flight, and with [`LinkError::ShuttingDown`] until
    /// a faulted session has been torn down.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), LinkError> {
        let _attempt = {
            let mut session = self.shared.session.lock();
            match session.state {
                ConnectionState::Connected => return Err(LinkError::AlreadyConnected),
                ConnectionState::Faulted => return Err(LinkError::ShuttingDown),
                ConnectionState::Disconnected if session.connecting => {
                    return Err(LinkError::AlreadyConnected);
                }
                ConnectionState::Disconnected => session.connecting = true,
            }
            ConnectAttempt(&self.shared.session)
        };

        let store = &self.shared.store;
        store.set(Field::ConnectionErrorMessage, "");
        store.set(Field::Host, host);
        store.set(Field::Port, port);

        let timeout = self.shared.settings.connect_timeout;
        let mut transport = self.shared.transport.lock().await;
        let attempt = future::or(transport.connect(host, port), async {
            async_std::task::sleep(timeout).await;
            Err::<(), _>(LinkError::Connection {
                host: host.to_string(),
                port,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            })
        })
        .await;

        match attempt {
            Ok(()) => {
                // A reconnect may have started meanwhile; its teardown wins.
                if !self.transition(&[ConnectionState::Disconnected], ConnectionState::Connected)
                {
                    transport.disconnect().await;
                    return Err(LinkError::ShuttingDown);
                }
                drop(transport);
                info!("Connected to {}:{} over {}", host, port, T::TRANSPORT_NAME);
                store.set(Field::StatusMessage, format!("Connected to {host}:{port}"));
                Ok(())
            }
            Err(err) => {
                drop(transport);
                warn!("Connecting to {}:{} failed: {}", host, port, err);
                store.set(Field::ConnectionErrorMessage, CONNECTION_ERROR_MESSAGE);
                Err(match err {
                    LinkError::Transport(source) => LinkError::Connection {
                        host: host.to_string(),
                        port,
                        source,
                    },
                    other => other,
                })
            }
        }
    }

    /// Connects to the host and port currently published in the store.
    pub async fn connect_configured(&self) -> Result<(), LinkError> {
        let (host, port) = (self.shared.store.host(), self.shared.store.port());
        self.connect(&host, port).await
    }

    /// Updates the published host setting used by [`SyncEngine::connect_configured`].
    pub fn set_host(&self, host: impl Into<String>) {
        self.shared.store.set(Field::Host, host.into());
    }

    /// Updates the published port setting used by [`SyncEngine::connect_configured`].
    pub fn set_port(&self, port: u16) {
        self.shared.store.set(Field::Port, port);
    }

    /// Spawns the poll loop, the command loop and the stall monitor on
    /// `runtime`.
    ///
    /// Fails with [`LinkError::NotConnected`] unless connected. Starting an
    /// already running engine does nothing.
    pub fn start<RT: Runtime>(&self, runtime: &RT) -> Result<(), LinkError> {
        let mut session = self.shared.session.lock();
        if session.state != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }
        if session.active.is_some() {
            debug!("Engine already running");
            return Ok(());
        }

        session.started += 1;
        let id = session.started;
        let stop = StopToken::new();

        let monitor = StallMonitor::new(
            self.shared.stopwatch.clone(),
            self.shared.settings.stall_check_period,
            self.shared.settings.stall_threshold,
        );
        let engine = self.clone();
        let monitor_stop = stop.clone();

        let tasks = vec![
            run_async(self.clone().poll_loop(id, stop.clone()), runtime),
            run_async(self.clone().command_loop(id, stop.clone()), runtime),
            run_async(
                async move {
                    monitor
                        .run(monitor_stop, move |waiting| {
                            engine.advise(Advisory::ServerBusy { waiting })
                        })
                        .await
                },
                runtime,
            ),
        ];

        session.active = Some(ActiveSession { id, stop, tasks });
        info!("Session {} started", id);
        Ok(())
    }

    /// Queues `set <path> <value>` for the command loop.
    ///
    /// Safe to call from any thread, at any time. Commands are sent in the
    /// order they were queued.
    pub fn add_set_command(&self, path: &str, value: f64) {
        self.shared.commands.push(Request::set(path, value));
    }

    /// Publishes a new control position and queues it for the simulator.
    ///
    /// Values outside the control's range are rejected and nothing is sent.
    pub fn set_control(&self, control: Control, value: f64) -> Result<(), LinkError> {
        let field = Field::from(control);
        let value = check_range(field.name(), value, control.range())?;
        self.shared.store.set(field, value);
        self.add_set_command(control.path(), value);
        Ok(())
    }

    /// Sends one request and waits for its response line.
    ///
    /// Holds the transport for the whole round trip. While a session runs, a
    /// shutdown abandons the wait with [`LinkError::Cancelled`].
    pub async fn transact(&self, request: &Request) -> Result<String, LinkError> {
        let stop = self
            .shared
            .session
            .lock()
            .active
            .as_ref()
            .map(|active| active.stop.clone())
            .unwrap_or_default();
        self.exchange(request, &stop).await
    }

    /// Stops the loops and closes the transport.
    ///
    /// Published values stay as they are. A teardown that is already under
    /// way after a fault is left to finish on its own.
    pub async fn disconnect(&self) {
        self.stop_session(true);
        self.shared.transport.lock().await.disconnect().await;
        self.transition(
            &[ConnectionState::Connected, ConnectionState::Disconnected],
            ConnectionState::Disconnected,
        );
        info!("Disconnected from the simulator");
    }

    /// Tears the session down after a fault.
    ///
    /// Stops the loops, closes the transport, resets every flight data field,
    /// drops pending commands and reports the connection as lost. The engine
    /// ends up `Disconnected`; it does not dial again by itself.
    pub async fn reconnect(&self) {
        self.recover("reconnect requested".to_string(), true).await;
    }

    async fn exchange(&self, request: &Request, stop: &StopToken) -> Result<String, LinkError> {
        let Some(mut transport) = stop.run_until_cancelled(self.shared.transport.lock()).await
        else {
            return Err(LinkError::Cancelled);
        };
        if stop.is_cancelled() {
            return Err(LinkError::Cancelled);
        }

        let line = request.to_string();
        let timeout = self.shared.settings.response_timeout;
        let _latency = self.shared.stopwatch.start();

        let round_trip = async {
            transport.write_line(&line).await?;
            transport.read_line().await
        };
        let deadline = async {
            match timeout {
                Some(timeout) => {
                    async_std::task::sleep(timeout).await;
                    Err::<String, _>(LinkError::Timeout(timeout))
                }
                None => future::pending().await,
            }
        };

        let response = stop
            .run_until_cancelled(future::or(round_trip, deadline))
            .await
            .unwrap_or(Err(LinkError::Cancelled))?;
        trace!("`{}` -> {:?}", line, response);
        Ok(response)
    }

    /// Handles a fault raised by a loop of session `id`.
    async fn fail(&self, id: u64, error: LinkError) {
        let current = {
            let mut session = self.shared.session.lock();
            let current = session.state == ConnectionState::Connected
                && session.active.as_ref().is_some_and(|active| active.id == id);
            if current {
                session.state = ConnectionState::Faulted;
            }
            current
        };
        if !current {
            debug!("Ignoring fault of stale session {}: {}", id, error);
            return;
        }

        error!("Session {} faulted: {}", id, error);
        self.shared
            .store
            .set(Field::ConnectionState, ConnectionState::Faulted);
        // Runs on one of the session's own tasks, which must not be aborted.
        self.recover(error.to_string(), false).await;
    }

    /// Tears the session down. `connect` is refused until the state leaves
    /// `Faulted`, which only happens once everything below is done.
    async fn recover(&self, reason: String, abort: bool) {
        self.set_state(ConnectionState::Faulted);
        self.stop_session(abort);
        self.shared.transport.lock().await.disconnect().await;

        // Cancelled loops skip their writes from here on.
        self.shared.variables.lock().reset();
        let store = &self.shared.store;
        store.reset(Field::FLIGHT_DATA);
        store.set(Field::Host, self.shared.settings.host.clone());
        store.set(Field::Port, self.shared.settings.port);
        let dropped = self.shared.commands.clear();
        if dropped > 0 {
            debug!("Dropped {} pending commands", dropped);
        }

        self.transition(&[ConnectionState::Faulted], ConnectionState::Disconnected);
        // Observers of this advisory may already connect again.
        self.advise(Advisory::ConnectionLost { reason });
    }

    fn stop_session(&self, abort: bool) {
        let active = self.shared.session.lock().active.take();
        if let Some(mut active) = active {
            active.stop.cancel();
            if abort {
                for task in active.tasks.iter_mut() {
                    task.abort();
                }
            }
            debug!("Session {} stopped", active.id);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.session.lock().state = state;
        // Outside the session lock: observers may query the engine.
        self.shared.store.set(Field::ConnectionState, state);
    }

    /// Moves to `to` if the current state is one of `from`.
    fn transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        {
            let mut session = self.shared.session.lock();
            if !from.contains(&session.state) {
                debug!("Staying {:?} instead of moving to {:?}", session.state, to);
                return false;
            }
            session.state = to;
        }
        self.shared.store.set(Field::ConnectionState, to);
        true
    }

    fn advise(&self, advisory: Advisory) {
        self.shared
            .store
            .set(Field::StatusMessage, advisory.to_string());
        match self.shared.advisories.sender.force_send(advisory) {
            Ok(Some(dropped)) => trace!("Advisory feed full, dropped {:?}", dropped),
            Ok(None) => (),
            Err(err) => warn!("Could not deliver advisory: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisories_read_as_status_lines() {
        assert_eq!(
            Advisory::InvalidValue {
                path: "/position/latitude-deg".to_string(),
                response: "ERR".to_string(),
            }
            .to_string(),
            "Invalid value received for /position/latitude-deg"
        );
        assert_eq!(
            Advisory::ServerBusy {
                waiting: Duration::from_secs(9)
            }
            .to_string(),
            "Notice: server is busy..."
        );
        assert_eq!(
            Advisory::OutOfRange {
                field: Field::Latitude,
                value: 91.0
            }
            .to_string(),
            "Invalid value received for Latitude: 91 is out of range"
        );
    }

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
