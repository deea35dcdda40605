//! Published values and change notification.
//!
//! The [`PropertyStore`] holds the latest value of every field the engine
//! exposes. Writing a value that differs from the stored one notifies every
//! observer with the name of the field; writing the same value again does
//! nothing, so a 4Hz poll of a parked aircraft stays silent.

use std::fmt::{self, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_channel::{Receiver, Sender, TrySendError, unbounded};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use flightlink_common::{Control, Location, Telemetry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::engine::ConnectionState;

/// A published field.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// Indicated heading
    Heading,
    /// Vertical speed
    VerticalSpeed,
    /// Ground speed
    GroundSpeed,
    /// Indicated airspeed
    Airspeed,
    /// GPS altitude
    Altitude,
    /// Roll
    Roll,
    /// Pitch
    Pitch,
    /// Barometric altitude
    Altimeter,
    /// Longitude
    Longitude,
    /// Latitude
    Latitude,
    /// Latitude and longitude combined
    Location,
    /// Rudder control
    Rudder,
    /// Elevator control
    Elevator,
    /// Throttle control
    Throttle,
    /// Aileron control
    Aileron,
    /// Simulator host setting
    Host,
    /// Simulator port setting
    Port,
    /// Why the last connection attempt failed, empty after success
    ConnectionErrorMessage,
    /// Latest status or advisory line
    StatusMessage,
    /// Lifecycle of the session
    ConnectionState,
}

impl Field {
    /// Every field.
    pub const ALL: [Field; 20] = [
        Field::Heading,
        Field::VerticalSpeed,
        Field::GroundSpeed,
        Field::Airspeed,
        Field::Altitude,
        Field::Roll,
        Field::Pitch,
        Field::Altimeter,
        Field::Longitude,
        Field::Latitude,
        Field::Location,
        Field::Rudder,
        Field::Elevator,
        Field::Throttle,
        Field::Aileron,
        Field::Host,
        Field::Port,
        Field::ConnectionErrorMessage,
        Field::StatusMessage,
        Field::ConnectionState,
    ];

    /// Flight data fields: telemetry, location and controls. A reconnect
    /// resets exactly these.
    pub const FLIGHT_DATA: [Field; 15] = [
        Field::Heading,
        Field::VerticalSpeed,
        Field::GroundSpeed,
        Field::Airspeed,
        Field::Altitude,
        Field::Roll,
        Field::Pitch,
        Field::Altimeter,
        Field::Longitude,
        Field::Latitude,
        Field::Location,
        Field::Rudder,
        Field::Elevator,
        Field::Throttle,
        Field::Aileron,
    ];

    /// Name handed to observers and used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Field::Heading => "Heading",
            Field::VerticalSpeed => "VerticalSpeed",
            Field::GroundSpeed => "GroundSpeed",
            Field::Airspeed => "Airspeed",
            Field::Altitude => "Altitude",
            Field::Roll => "Roll",
            Field::Pitch => "Pitch",
            Field::Altimeter => "Altimeter",
            Field::Longitude => "Longitude",
            Field::Latitude => "Latitude",
            Field::Location => "Location",
            Field::Rudder => "Rudder",
            Field::Elevator => "Elevator",
            Field::Throttle => "Throttle",
            Field::Aileron => "Aileron",
            Field::Host => "Host",
            Field::Port => "Port",
            Field::ConnectionErrorMessage => "ConnectionErrorMessage",
            Field::StatusMessage => "StatusMessage",
            Field::ConnectionState => "ConnectionState",
        }
    }

    /// The value a field holds before anything was published.
    pub fn default_value(self) -> Value {
        match self {
            Field::Location => Value::Location(Location::default()),
            Field::Host | Field::ConnectionErrorMessage | Field::StatusMessage => {
                Value::Text(String::new())
            }
            Field::Port => Value::Port(0),
            Field::ConnectionState => Value::State(ConnectionState::Disconnected),
            _ => Value::Number(0.0),
        }
    }
}

impl From<Telemetry> for Field {
    fn from(telemetry: Telemetry) -> Self {
        match telemetry {
            Telemetry::Heading => Field::Heading,
            Telemetry::VerticalSpeed => Field::VerticalSpeed,
            Telemetry::GroundSpeed => Field::GroundSpeed,
            Telemetry::Airspeed => Field::Airspeed,
            Telemetry::Altitude => Field::Altitude,
            Telemetry::Roll => Field::Roll,
            Telemetry::Pitch => Field::Pitch,
            Telemetry::Altimeter => Field::Altimeter,
            Telemetry::Longitude => Field::Longitude,
            Telemetry::Latitude => Field::Latitude,
        }
    }
}

impl From<Control> for Field {
    fn from(control: Control) -> Self {
        match control {
            Control::Rudder => Field::Rudder,
            Control::Elevator => Field::Elevator,
            Control::Aileron => Field::Aileron,
            Control::Throttle => Field::Throttle,
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The value of a published field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Value {
    /// Telemetry or control reading
    Number(f64),
    /// Map position
    Location(Location),
    /// Free text (settings and messages)
    Text(String),
    /// Port number
    Port(u16),
    /// Session lifecycle
    State(ConnectionState),
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<Location> for Value {
    fn from(value: Location) -> Self {
        Value::Location(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Port(value)
    }
}

impl From<ConnectionState> for Value {
    fn from(value: ConnectionState) -> Self {
        Value::State(value)
    }
}

/// Handle returned by [`PropertyStore::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(Field) + Send + Sync>;

/// Thread safe holder of every published value.
///
/// Each field is read and written atomically; readers on other threads see
/// either the previous or the new value, never a torn one.
pub struct PropertyStore {
    values: DashMap<Field, Value>,
    observers: DashMap<SubscriptionId, Observer>,
    feeds: Mutex<Vec<Sender<Field>>>,
    next_subscription: AtomicU64,
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PropertyStore [{} observers, {} feeds]",
            self.observers.len(),
            self.feeds.lock().len()
        )
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! number_accessors {
    ($($(#[$doc:meta])* $name:ident => $field:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) -> f64 {
                self.number(Field::$field)
            }
        )*
    };
}

impl PropertyStore {
    /// Creates a store with every field at its default value.
    pub fn new() -> Self {
        let values = DashMap::new();
        for field in Field::ALL {
            values.insert(field, field.default_value());
        }

        Self {
            values,
            observers: DashMap::new(),
            feeds: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Publishes `value` for `field`.
    ///
    /// Returns `true` and notifies every observer if the value changed;
    /// returns `false` without notifying anyone otherwise.
    pub fn set(&self, field: Field, value: impl Into<Value>) -> bool {
        self.set_if(field, value, || true)
    }

    /// Publishes `value` for `field` if `live` still holds.
    ///
    /// `live` is evaluated with the field locked, so a concurrent write of the
    /// same field lands either before the check or after this write.
    pub fn set_if(
        &self,
        field: Field,
        value: impl Into<Value>,
        live: impl FnOnce() -> bool,
    ) -> bool {
        let value = value.into();
        let changed = match self.values.entry(field) {
            Entry::Occupied(mut entry) => {
                if !live() || *entry.get() == value {
                    false
                } else {
                    entry.insert(value);
                    true
                }
            }
            Entry::Vacant(entry) => {
                if live() {
                    entry.insert(value);
                    true
                } else {
                    false
                }
            }
        };

        // The shard lock is released here, so observers may read the store.
        if changed {
            self.notify(field);
        }
        changed
    }

    /// Puts `fields` back to their defaults, notifying for each that changed.
    pub fn reset(&self, fields: impl IntoIterator<Item = Field>) {
        for field in fields {
            self.set(field, field.default_value());
        }
    }

    /// Current value of `field`.
    pub fn get(&self, field: Field) -> Value {
        self.values
            .get(&field)
            .map(|value| value.value().clone())
            .unwrap_or_else(|| field.default_value())
    }

    /// Current value of a numeric field, `0.0` for non-numeric fields.
    pub fn number(&self, field: Field) -> f64 {
        match self.values.get(&field).as_deref() {
            Some(Value::Number(value)) => *value,
            _ => 0.0,
        }
    }

    /// Current value of a text field, empty for non-text fields.
    pub fn text(&self, field: Field) -> String {
        match self.values.get(&field).as_deref() {
            Some(Value::Text(value)) => value.clone(),
            _ => String::new(),
        }
    }

    number_accessors! {
        /// Indicated heading in degrees
        heading => Heading,
        /// Vertical speed
        vertical_speed => VerticalSpeed,
        /// Ground speed in knots
        ground_speed => GroundSpeed,
        /// Indicated airspeed in knots
        airspeed => Airspeed,
        /// GPS altitude in feet
        altitude => Altitude,
        /// Roll in degrees
        roll => Roll,
        /// Pitch in degrees
        pitch => Pitch,
        /// Barometric altitude in feet
        altimeter => Altimeter,
        /// Longitude in degrees
        longitude => Longitude,
        /// Latitude in degrees
        latitude => Latitude,
        /// Rudder deflection
        rudder => Rudder,
        /// Elevator deflection
        elevator => Elevator,
        /// Throttle position
        throttle => Throttle,
        /// Aileron deflection
        aileron => Aileron,
    }

    /// Last published location.
    pub fn location(&self) -> Location {
        match self.values.get(&Field::Location).as_deref() {
            Some(Value::Location(location)) => *location,
            _ => Location::default(),
        }
    }

    /// Configured simulator host.
    pub fn host(&self) -> String {
        self.text(Field::Host)
    }

    /// Configured simulator port.
    pub fn port(&self) -> u16 {
        match self.values.get(&Field::Port).as_deref() {
            Some(Value::Port(port)) => *port,
            _ => 0,
        }
    }

    /// Why the last connection attempt failed.
    pub fn connection_error_message(&self) -> String {
        self.text(Field::ConnectionErrorMessage)
    }

    /// Latest status line.
    pub fn status_message(&self) -> String {
        self.text(Field::StatusMessage)
    }

    /// Current session lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        match self.values.get(&Field::ConnectionState).as_deref() {
            Some(Value::State(state)) => *state,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Registers `observer` for changes of any field.
    pub fn subscribe(&self, observer: impl Fn(Field) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.insert(id, Arc::new(observer));
        trace!("Added observer {:?}", id);
        id
    }

    /// Registers `observer` for changes of `field` only.
    pub fn subscribe_field(
        &self,
        field: Field,
        observer: impl Fn(Field) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(move |changed| {
            if changed == field {
                observer(changed)
            }
        })
    }

    /// Removes an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Returns a channel receiving the name of every changed field.
    ///
    /// The feed is dropped from the store once its receiver is dropped.
    pub fn feed(&self) -> Receiver<Field> {
        let (sender, receiver) = unbounded();
        self.feeds.lock().push(sender);
        receiver
    }

    fn notify(&self, field: Field) {
        trace!("{} changed", field);

        // Snapshot first so observers can (un)subscribe without deadlocking.
        let observers: Vec<Observer> = self
            .observers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for observer in observers {
            observer(field);
        }

        self.feeds
            .lock()
            .retain(|feed| !matches!(feed.try_send(field), Err(TrySendError::Closed(_))));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting(store: &PropertyStore) -> (Arc<Mutex<Vec<Field>>>, SubscriptionId) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = store.subscribe(move |field| sink.lock().push(field));
        (seen, id)
    }

    #[test]
    fn starts_at_defaults() {
        let store = PropertyStore::new();
        assert_eq!(store.heading(), 0.0);
        assert_eq!(store.location(), Location::default());
        assert_eq!(store.status_message(), "");
        assert_eq!(store.connection_state(), ConnectionState::Disconnected);
        for field in Field::ALL {
            assert_eq!(store.get(field), field.default_value());
        }
    }

    #[test]
    fn notifies_once_per_distinct_value() {
        let store = PropertyStore::new();
        let (seen, _) = counting(&store);

        assert!(store.set(Field::Latitude, 32.5));
        assert!(!store.set(Field::Latitude, 32.5));
        assert!(store.set(Field::Latitude, -12.25));

        assert_eq!(*seen.lock(), vec![Field::Latitude, Field::Latitude]);
        assert_eq!(store.latitude(), -12.25);
    }

    #[test]
    fn unchanged_default_is_silent() {
        let store = PropertyStore::new();
        let (seen, _) = counting(&store);

        assert!(!store.set(Field::Heading, 0.0));
        store.reset(Field::FLIGHT_DATA);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn field_subscription_filters_other_fields() {
        let store = PropertyStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        store.subscribe_field(Field::Throttle, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set(Field::Rudder, 0.3);
        store.set(Field::Throttle, 0.8);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_observers_stop_hearing() {
        let store = PropertyStore::new();
        let (seen, id) = counting(&store);

        store.set(Field::Roll, 5.0);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set(Field::Roll, 6.0);

        assert_eq!(*seen.lock(), vec![Field::Roll]);
    }

    #[test]
    fn observers_may_read_the_store() {
        let store = Arc::new(PropertyStore::new());
        let reader = store.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |field| sink.lock().push(reader.get(field)));

        store.set(Field::StatusMessage, "Welcome");
        assert_eq!(*seen.lock(), vec![Value::Text("Welcome".to_string())]);
    }

    #[test]
    fn guarded_writes_are_skipped_once_dead() {
        let store = PropertyStore::new();
        let (seen, _) = counting(&store);

        assert!(store.set_if(Field::Pitch, 3.5, || true));
        assert!(!store.set_if(Field::Pitch, -2.0, || false));
        assert_eq!(store.pitch(), 3.5);
        assert_eq!(*seen.lock(), vec![Field::Pitch]);
    }

    #[test]
    fn feeds_receive_changes_and_are_pruned() {
        let store = PropertyStore::new();
        let feed = store.feed();
        store.set(Field::Airspeed, 110.0);
        store.set(Field::Airspeed, 110.0);
        store.set(Field::Host, "10.0.0.2");

        assert_eq!(feed.try_recv(), Ok(Field::Airspeed));
        assert_eq!(feed.try_recv(), Ok(Field::Host));
        assert!(feed.try_recv().is_err());

        drop(feed);
        store.set(Field::Airspeed, 120.0);
        assert!(store.feeds.lock().is_empty());
    }

    #[test]
    fn concurrent_readers_never_see_torn_values() {
        let store = Arc::new(PropertyStore::new());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let value = if i % 2 == 0 { 45.0 } else { -45.0 };
                    store.set(Field::Location, Location::new(value, value * 2.0));
                }
            })
        };
        for _ in 0..2000 {
            let location = store.location();
            assert_eq!(location.longitude, location.latitude * 2.0);
        }
        writer.join().unwrap();
    }
}
