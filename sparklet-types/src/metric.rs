use crate::{utils::timestamp, DataType, MetricId, MetricValue};

/// A version independent metric.
///
/// A metric is identified by its name and, optionally, an alias. Metrics in DATA and CMD messages may be
/// identified by alias alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: Option<String>,
    pub alias: Option<u64>,
    pub timestamp: u64,
    pub datatype: DataType,
    /// `None` represents a null value
    pub value: Option<MetricValue>,
    pub is_historical: bool,
    pub is_transient: bool,
}

impl Metric {
    /// Create a new named metric timestamped with the current time.
    pub fn new<S: Into<String>, V: Into<MetricValue>>(name: S, value: V) -> Self {
        let value = value.into();
        Self {
            name: Some(name.into()),
            alias: None,
            timestamp: timestamp(),
            datatype: value.datatype(),
            value: Some(value),
            is_historical: false,
            is_transient: false,
        }
    }

    /// Create a new named metric with a null value
    pub fn null<S: Into<String>>(name: S, datatype: DataType) -> Self {
        Self {
            name: Some(name.into()),
            alias: None,
            timestamp: timestamp(),
            datatype,
            value: None,
            is_historical: false,
            is_transient: false,
        }
    }

    /// Create a metric that is identified only by its alias.
    pub fn with_alias_only<V: Into<MetricValue>>(alias: u64, value: V) -> Self {
        let value = value.into();
        Self {
            name: None,
            alias: Some(alias),
            timestamp: timestamp(),
            datatype: value.datatype(),
            value: Some(value),
            is_historical: false,
            is_transient: false,
        }
    }

    pub fn alias(mut self, alias: u64) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn historical(mut self, is_historical: bool) -> Self {
        self.is_historical = is_historical;
        self
    }

    pub fn transient(mut self, is_transient: bool) -> Self {
        self.is_transient = is_transient;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The identifier used to refer to the metric on the wire. Aliases take precedence.
    pub fn id(&self) -> Option<MetricId> {
        if let Some(alias) = self.alias {
            Some(MetricId::Alias(alias))
        } else {
            self.name.clone().map(MetricId::Name)
        }
    }

    /// Human readable identifier for logging
    pub fn display_id(&self) -> String {
        match (&self.name, self.alias) {
            (Some(name), _) => name.clone(),
            (None, Some(alias)) => format!("alias:{alias}"),
            (None, None) => "<unidentified>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let m = Metric::new("temp", 21.5).alias(4).timestamp(10).transient(true);
        assert_eq!(m.name(), Some("temp"));
        assert_eq!(m.datatype, DataType::Double);
        assert_eq!(m.timestamp, 10);
        assert!(m.is_transient);
        assert!(!m.is_historical);
        assert_eq!(m.id(), Some(MetricId::Alias(4)));
    }

    #[test]
    fn null_metric() {
        let m = Metric::null("level", DataType::Int32);
        assert_eq!(m.value, None);
        assert_eq!(m.id(), Some(MetricId::Name("level".into())));
        assert_eq!(Metric::with_alias_only(7, 1u32).display_id(), "alias:7");
    }
}
