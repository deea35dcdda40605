//! Shared vocabulary for the flightlink line protocol.
//!
//! Both the telemetry engine and the development simulator depend on this
//! crate so that request formatting, response parsing and the fixed property
//! set can never drift apart.

pub mod error;
pub mod protocol;

mod location;
mod properties;

pub use location::{
    LATITUDE_RANGE, LONGITUDE_RANGE, Location, check_range, validate_latitude, validate_longitude,
};
pub use properties::{Control, Telemetry};
pub use protocol::{Request, parse_value};
