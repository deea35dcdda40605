use flightlink_common::Telemetry;

/// Last known value of every polled variable.
///
/// The set of variables is fixed; only their values change. A freshly created
/// table holds zeros, which is also what a reconnect resets it to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableTable {
    values: [f64; Telemetry::COUNT],
}

impl VariableTable {
    /// Creates a table with every value at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known value of `variable`.
    pub fn get(&self, variable: Telemetry) -> f64 {
        self.values[variable.index()]
    }

    /// Records a freshly read value.
    pub fn set(&mut self, variable: Telemetry, value: f64) {
        self.values[variable.index()] = value;
    }

    /// Variables paired with their values, in poll order.
    pub fn iter(&self) -> impl Iterator<Item = (Telemetry, f64)> + '_ {
        Telemetry::ALL.into_iter().zip(self.values.iter().copied())
    }

    /// Puts every value back to zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed_and_resets_to_zero() {
        let mut table = VariableTable::new();
        assert!(table.iter().all(|(_, value)| value == 0.0));

        table.set(Telemetry::Altitude, 3500.0);
        table.set(Telemetry::Latitude, 32.0);
        assert_eq!(table.get(Telemetry::Altitude), 3500.0);

        table.reset();
        assert_eq!(table, VariableTable::new());
    }

    #[test]
    fn iterates_in_poll_order() {
        let mut table = VariableTable::new();
        for (i, variable) in Telemetry::ALL.into_iter().enumerate() {
            table.set(variable, i as f64);
        }
        let order: Vec<_> = table.iter().map(|(variable, _)| variable).collect();
        assert_eq!(order, Telemetry::ALL.to_vec());
        assert_eq!(table.get(Telemetry::Latitude), 9.0);
    }
}
