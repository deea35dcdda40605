//! The line protocol spoken with the simulator.
//!
//! Every request is a single newline-terminated line and is answered by
//! exactly one line:
//!
//! ```text
//! get /position/latitude-deg          ->  32.0521
//! set /controls/flight/rudder -0.25   ->  (ignored)
//! ```
//!
//! The types here only know how to format and parse lines. Framing (the
//! trailing newline) belongs to the transport.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// A single request line.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Request {
    /// Read the current value of a property.
    Get {
        /// Property path
        path: String,
    },
    /// Write a new value to a property.
    Set {
        /// Property path
        path: String,
        /// Value to write
        value: f64,
    },
}

impl Request {
    /// Builds a `get` request.
    pub fn get(path: impl Into<String>) -> Self {
        Request::Get { path: path.into() }
    }

    /// Builds a `set` request.
    pub fn set(path: impl Into<String>, value: f64) -> Self {
        Request::Set {
            path: path.into(),
            value,
        }
    }

    /// The property path this request addresses.
    pub fn path(&self) -> &str {
        match self {
            Request::Get { path } | Request::Set { path, .. } => path,
        }
    }

    /// Parses a request line as the simulator receives it.
    ///
    /// Leading/trailing whitespace (including the line terminator) is ignored.
    pub fn parse(line: &str) -> Result<Self, LinkError> {
        let malformed = || LinkError::MalformedRequest(line.trim_end().to_string());
        let mut parts = line.split_whitespace();

        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("get"), Some(path), None, None) => Ok(Request::get(path)),
            (Some("set"), Some(path), Some(value), None) => {
                let value = value.parse::<f64>().map_err(|_| malformed())?;
                Ok(Request::set(path, value))
            }
            _ => Err(malformed()),
        }
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Get { path } => write!(f, "get {path}"),
            Request::Set { path, value } => write!(f, "set {path} {value}"),
        }
    }
}

/// Parses the response to a `get` request as a base-10 number.
///
/// Non-finite values (`NaN`, `inf`) are rejected: they can never be a valid
/// instrument reading and `NaN` would defeat change detection.
pub fn parse_value(path: &str, response: &str) -> Result<f64, LinkError> {
    match response.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(LinkError::Parse {
            path: path.to_string(),
            response: response.trim_end().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_requests_as_lines() {
        assert_eq!(
            Request::get("/position/latitude-deg").to_string(),
            "get /position/latitude-deg"
        );
        assert_eq!(
            Request::set("/controls/throttle", 0.5).to_string(),
            "set /controls/throttle 0.5"
        );
        assert_eq!(
            Request::set("/controls/flight/rudder", -1.0).to_string(),
            "set /controls/flight/rudder -1"
        );
    }

    #[test]
    fn parses_request_lines() {
        assert_eq!(
            Request::parse("get /position/longitude-deg\n").unwrap(),
            Request::get("/position/longitude-deg")
        );
        assert_eq!(
            Request::parse("set /controls/flight/aileron -0.75\r\n").unwrap(),
            Request::set("/controls/flight/aileron", -0.75)
        );
    }

    #[test]
    fn rejects_malformed_request_lines() {
        for line in ["", "get", "set /a", "set /a nope", "fetch /a", "get /a /b"] {
            assert!(
                matches!(Request::parse(line), Err(LinkError::MalformedRequest(_))),
                "{line:?} should be rejected"
            );
        }
    }

    #[test]
    fn parses_decimal_responses() {
        assert_eq!(parse_value("/a", "12.5\n").unwrap(), 12.5);
        assert_eq!(parse_value("/a", "  -0.003 ").unwrap(), -0.003);
        assert_eq!(parse_value("/a", "42").unwrap(), 42.0);
    }

    #[test]
    fn rejects_non_numeric_responses() {
        for response in ["", "ERR", "12,5", "NaN", "inf", "1.0 2.0"] {
            match parse_value("/instrumentation/gps/indicated-altitude-ft", response) {
                Err(LinkError::Parse { path, .. }) => {
                    assert_eq!(path, "/instrumentation/gps/indicated-altitude-ft")
                }
                other => panic!("{response:?} parsed as {other:?}"),
            }
        }
    }
}
