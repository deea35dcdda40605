use flightlink_common::{
    Location, Request, Telemetry, parse_value, validate_latitude, validate_longitude,
};
use tracing::{debug, trace, warn};

use super::{Advisory, SyncEngine};
use crate::cancel::StopToken;
use crate::store::Field;
use crate::transport::Transport;

/// Last rejected sample of each variable in the current session.
type Rejected = [Option<f64>; Telemetry::COUNT];

impl<T: Transport> SyncEngine<T> {
    /// Reads every telemetry variable in order, then publishes the pass.
    pub(super) async fn poll_loop(self, session: u64, stop: StopToken) {
        debug!("Poll loop of session {} started", session);
        let mut rejected = Rejected::default();
        'session: while !stop.is_cancelled() {
            for variable in Telemetry::ALL {
                match self.exchange(&Request::get(variable.path()), &stop).await {
                    Ok(response) => self.record(variable, &response, &stop),
                    Err(err) if err.is_fatal() => {
                        self.fail(session, err).await;
                        break 'session;
                    }
                    Err(err) => {
                        debug!("Poll loop of session {} ending: {}", session, err);
                        break 'session;
                    }
                }
            }

            self.publish(&stop, &mut rejected);

            if !stop.sleep(self.shared.settings.poll_interval).await {
                break;
            }
        }
        debug!("Poll loop of session {} stopped", session);
    }

    /// Sends queued `set` requests one at a time, oldest first.
    pub(super) async fn command_loop(self, session: u64, stop: StopToken) {
        debug!("Command loop of session {} started", session);
        while let Some(request) = self.shared.commands.pop(&stop).await {
            match self.exchange(&request, &stop).await {
                Ok(response) => trace!("`{}` acknowledged with {:?}", request, response),
                Err(err) if err.is_fatal() => {
                    self.fail(session, err).await;
                    break;
                }
                Err(err) => {
                    debug!("`{}` abandoned: {}", request, err);
                    break;
                }
            }
        }
        debug!("Command loop of session {} stopped", session);
    }

    fn record(&self, variable: Telemetry, response: &str, stop: &StopToken) {
        match parse_value(variable.path(), response) {
            Ok(value) => {
                let mut variables = self.shared.variables.lock();
                // A reset may have happened while the response was in flight.
                if !stop.is_cancelled() {
                    variables.set(variable, value);
                }
            }
            Err(err) => {
                warn!("{}", err);
                self.advise(Advisory::InvalidValue {
                    path: variable.path().to_string(),
                    response: response.to_string(),
                });
            }
        }
    }

    /// Copies the pass into the store.
    ///
    /// Works on a copy of the table so observers run without any engine lock
    /// held. A reset cancels the session before touching the store, and every
    /// write checks the token with its field locked, so a stale pass can never
    /// overwrite a reset value.
    fn publish(&self, stop: &StopToken, rejected: &mut Rejected) {
        let variables = self.shared.variables.lock().clone();
        let live = || !stop.is_cancelled();

        let store = &self.shared.store;
        for (variable, value) in variables.iter() {
            if !live() {
                return;
            }
            let field = Field::from(variable);
            let checked = match variable {
                Telemetry::Latitude => validate_latitude(value),
                Telemetry::Longitude => validate_longitude(value),
                _ => Ok(value),
            };
            match checked {
                Ok(value) => {
                    rejected[variable.index()] = None;
                    store.set_if(field, value, live);
                }
                Err(err) => {
                    // A stuck sample is reported once, not on every pass.
                    if rejected[variable.index()].replace(value) != Some(value) {
                        warn!("Rejected sample: {}", err);
                        self.advise(Advisory::OutOfRange { field, value });
                    }
                }
            }
        }

        let location = Location::new(store.latitude(), store.longitude());
        store.set_if(Field::Location, location, live);
    }
}
