//! The fixed set of simulator properties the engine reads and writes.

use serde::{Deserialize, Serialize};

/// A telemetry variable polled from the simulator.
///
/// The declaration order is the poll order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Telemetry {
    /// Indicated heading in degrees
    Heading,
    /// GPS vertical speed
    VerticalSpeed,
    /// GPS ground speed in knots
    GroundSpeed,
    /// Indicated airspeed in knots
    Airspeed,
    /// GPS altitude in feet
    Altitude,
    /// Attitude indicator roll in degrees
    Roll,
    /// Attitude indicator pitch in degrees
    Pitch,
    /// Barometric altimeter reading in feet
    Altimeter,
    /// Longitude in degrees
    Longitude,
    /// Latitude in degrees
    Latitude,
}

impl Telemetry {
    /// Number of polled variables.
    pub const COUNT: usize = 10;

    /// Every variable, in poll order.
    pub const ALL: [Telemetry; Self::COUNT] = [
        Telemetry::Heading,
        Telemetry::VerticalSpeed,
        Telemetry::GroundSpeed,
        Telemetry::Airspeed,
        Telemetry::Altitude,
        Telemetry::Roll,
        Telemetry::Pitch,
        Telemetry::Altimeter,
        Telemetry::Longitude,
        Telemetry::Latitude,
    ];

    /// The simulator property path.
    pub const fn path(self) -> &'static str {
        match self {
            Telemetry::Heading => "/instrumentation/heading-indicator/indicated-heading-deg",
            Telemetry::VerticalSpeed => "/instrumentation/gps/indicated-vertical-speed",
            Telemetry::GroundSpeed => "/instrumentation/gps/indicated-ground-speed-kt",
            Telemetry::Airspeed => "/instrumentation/airspeed-indicator/indicated-speed-kt",
            Telemetry::Altitude => "/instrumentation/gps/indicated-altitude-ft",
            Telemetry::Roll => "/instrumentation/attitude-indicator/internal-roll-deg",
            Telemetry::Pitch => "/instrumentation/attitude-indicator/internal-pitch-deg",
            Telemetry::Altimeter => "/instrumentation/altimeter/indicated-altitude-ft",
            Telemetry::Longitude => "/position/longitude-deg",
            Telemetry::Latitude => "/position/latitude-deg",
        }
    }

    /// Position of this variable within [`Telemetry::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Looks a variable up by its property path.
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.path() == path)
    }
}

/// A flight control surface driven by the presentation layer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Control {
    /// Rudder deflection
    Rudder,
    /// Elevator deflection
    Elevator,
    /// Aileron deflection
    Aileron,
    /// Engine throttle
    Throttle,
}

impl Control {
    /// Every control surface.
    pub const ALL: [Control; 4] = [
        Control::Rudder,
        Control::Elevator,
        Control::Aileron,
        Control::Throttle,
    ];

    /// The simulator property path.
    pub const fn path(self) -> &'static str {
        match self {
            Control::Rudder => "/controls/flight/rudder",
            Control::Elevator => "/controls/flight/elevator",
            Control::Aileron => "/controls/flight/aileron",
            Control::Throttle => "/controls/engines/current-engine/throttle",
        }
    }

    /// Inclusive range of accepted values.
    pub const fn range(self) -> (f64, f64) {
        match self {
            Control::Throttle => (0.0, 1.0),
            Control::Rudder | Control::Elevator | Control::Aileron => (-1.0, 1.0),
        }
    }

    /// Looks a control up by its property path.
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.path() == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_order_matches_index() {
        for (i, telemetry) in Telemetry::ALL.iter().enumerate() {
            assert_eq!(telemetry.index(), i);
        }
        assert_eq!(Telemetry::ALL[8], Telemetry::Longitude);
        assert_eq!(Telemetry::ALL[9], Telemetry::Latitude);
    }

    #[test]
    fn paths_are_unique_and_resolvable() {
        for telemetry in Telemetry::ALL {
            assert_eq!(Telemetry::from_path(telemetry.path()), Some(telemetry));
        }
        for control in Control::ALL {
            assert_eq!(Control::from_path(control.path()), Some(control));
            assert_eq!(Telemetry::from_path(control.path()), None);
        }
    }

    #[test]
    fn throttle_is_unipolar() {
        assert_eq!(Control::Throttle.range(), (0.0, 1.0));
        assert_eq!(Control::Rudder.range(), (-1.0, 1.0));
    }
}
