#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::unwrap_used
)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::type_complexity)]

/*!
Live telemetry for flight simulator front ends.

A [`SyncEngine`] keeps a [`PropertyStore`] in sync with a FlightGear style
simulator that answers `get <path>` and `set <path> <value>` over a line based
channel. Once connected and started it polls ten flight variables four times a
second, forwards control inputs in the order they were given, and warns when
the simulator stops answering. A transport fault tears the session down and
resets everything it published.

The engine runs on any [`Runtime`]. Bevy apps add the [`FlightLinkPlugin`],
which mirrors every change into bevy [`Message`]s.

## Example
```rust,no_run
use bevy::prelude::*;
use bevy::tasks::TaskPoolBuilder;
use flightlink::{
    FlightLinkPlugin, FlightLinkRuntime, LinkCommand, LinkSettings, PropertyChanged,
    transport::TcpTransport,
};

fn main() {
    let mut app = App::new();
    app.insert_resource(LinkSettings::default());
    app.add_plugins(FlightLinkPlugin::<TcpTransport, bevy::tasks::TaskPool>::default());
    app.insert_resource(FlightLinkRuntime::new(
        TaskPoolBuilder::new().num_threads(2).build(),
    ));
    app.add_systems(Startup, |mut commands: MessageWriter<LinkCommand>| {
        commands.write(LinkCommand::Connect);
    });
    app.add_systems(Update, show_changes);
}

fn show_changes(mut changes: MessageReader<PropertyChanged>) {
    for change in changes.read() {
        info!("{} is now {:?}", change.field, change.value);
    }
}
```

Without bevy's scheduler the engine is driven directly:

```rust,no_run
use bevy::tasks::TaskPoolBuilder;
use flightlink::{LinkSettings, SyncEngine, transport::TcpTransport};
use futures_lite::future::block_on;

let pool = TaskPoolBuilder::new().num_threads(2).build();
let engine = SyncEngine::new(TcpTransport::default(), LinkSettings::default());
let store = engine.store().clone();
engine.store().subscribe(move |field| println!("{field}: {:?}", store.get(field)));

block_on(engine.connect_configured())?;
engine.start(&pool)?;
# Ok::<(), flightlink::error::LinkError>(())
```
*/

mod cancel;
pub mod engine;
mod queue;
mod runtime;
mod settings;
pub mod stall;
pub mod store;
mod systems;
pub mod transport;
mod variables;

pub use cancel::StopToken;
pub use engine::{Advisory, CONNECTION_ERROR_MESSAGE, ConnectionState, SyncEngine};
pub use queue::CommandQueue;
pub use runtime::{FlightLinkRuntime, JoinHandle, Runtime};
pub use settings::{HOST_ENV, LinkSettings, PORT_ENV};
pub use store::{Field, PropertyStore, SubscriptionId, Value};
pub use transport::Transport;
pub use variables::VariableTable;

use std::marker::PhantomData;
use std::ops::Deref;

pub use async_channel;
use async_channel::{Receiver, Sender, bounded, unbounded};
pub use async_trait::async_trait;
use bevy::prelude::*;

pub use flightlink_common::error;
pub use flightlink_common::*;

struct AsyncChannel<T> {
    pub(crate) sender: Sender<T>,
    pub(crate) receiver: Receiver<T>,
}

impl<T> AsyncChannel<T> {
    fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));

        Self { sender, receiver }
    }

    fn unbounded() -> Self {
        let (sender, receiver) = unbounded();

        Self { sender, receiver }
    }
}

#[derive(Debug, Clone, Message)]
/// A published field changed.
///
/// `value` is read when the message is emitted, so a burst of changes to the
/// same field between two frames carries the latest value each time.
pub struct PropertyChanged {
    /// The field that changed
    pub field: Field,
    /// Its value
    pub value: Value,
}

#[derive(Debug, Clone, Message)]
/// An [`Advisory`] raised by the engine.
pub struct LinkAdvisory(pub Advisory);

impl Deref for LinkAdvisory {
    type Target = Advisory;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Message)]
/// Drives the [`FlightLink`] resource from bevy systems.
pub enum LinkCommand {
    /// Connect to the configured host and port, then start syncing
    Connect,
    /// Stop syncing and close the connection
    Disconnect,
    /// Tear the session down and reset every flight value
    Reconnect,
    /// Move a control surface or the throttle
    SetControl {
        /// Which control
        control: Control,
        /// New position
        value: f64,
    },
}

/// The engine as a bevy resource, inserted by [`FlightLinkPlugin`].
///
/// Connect, disconnect and reconnect commands are carried out one after the
/// other, in the order they were written.
#[derive(Resource)]
pub struct FlightLink<T: Transport> {
    engine: SyncEngine<T>,
    changes: Receiver<Field>,
    advisories: Receiver<Advisory>,
    lifecycle: AsyncChannel<LinkCommand>,
}

impl<T: Transport> FlightLink<T> {
    /// Wraps `engine`, subscribing to its changes and advisories.
    pub fn new(engine: SyncEngine<T>) -> Self {
        Self {
            changes: engine.store().feed(),
            advisories: engine.advisories(),
            lifecycle: AsyncChannel::unbounded(),
            engine,
        }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }
}

impl<T: Transport> Deref for FlightLink<T> {
    type Target = SyncEngine<T>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// The plugin to add to your bevy [`App`] to sync with a simulator over `T`.
///
/// Reads [`LinkSettings`] if the resource exists when the plugin is built and
/// falls back to the defaults otherwise. [`LinkCommand::Connect`] needs a
/// [`FlightLinkRuntime<RT>`] resource to spawn the loops on.
pub struct FlightLinkPlugin<T: Transport, RT: Runtime = bevy::tasks::TaskPool>(
    PhantomData<fn() -> (T, RT)>,
);

impl<T: Transport, RT: Runtime> Default for FlightLinkPlugin<T, RT> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Transport + Default, RT: Runtime> Plugin for FlightLinkPlugin<T, RT> {
    fn build(&self, app: &mut App) {
        let settings = app
            .world()
            .get_resource::<LinkSettings>()
            .cloned()
            .unwrap_or_default();
        app.insert_resource(FlightLink::new(SyncEngine::new(T::default(), settings)));
        app.add_message::<PropertyChanged>();
        app.add_message::<LinkAdvisory>();
        app.add_message::<LinkCommand>();
        app.add_systems(
            PreUpdate,
            (
                systems::handle_link_commands::<T, RT>,
                systems::relay_link_events::<T>,
            )
                .chain(),
        );
    }
}
