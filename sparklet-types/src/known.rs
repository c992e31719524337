use std::collections::HashMap;

use thiserror::Error;

use crate::{DataType, Metric, MetricId};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("Duplicate metric name {0}")]
    DuplicateName(String),
    #[error("Duplicate metric alias {0}")]
    DuplicateAlias(u64),
    #[error("Birth metrics must be named")]
    UnnamedMetric,
}

/// The declaration of a metric an entity has said it will publish
#[derive(Debug, Clone, PartialEq)]
pub struct KnownMetric {
    pub name: String,
    pub alias: Option<u64>,
    pub datatype: DataType,
}

/// The result of validating incoming metrics against a [KnownMetricsStorage]
#[derive(Debug, Default)]
pub struct Validated {
    /// Known metrics, with names resolved and values reinterpreted to their declared type
    pub known: Vec<Metric>,
    pub rejected: Vec<Metric>,
}

impl Validated {
    pub fn all_known(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// The set of metrics a single node or device is allowed to publish or receive.
///
/// The set is only ever replaced as a whole by a birth or emptied by a death.
#[derive(Debug, Default, Clone)]
pub struct KnownMetricsStorage {
    metrics: HashMap<String, KnownMetric>,
    aliases: HashMap<u64, String>,
}

impl KnownMetricsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_metrics(metrics: &[Metric]) -> Result<Self, RegistryError> {
        let mut known = HashMap::with_capacity(metrics.len());
        let mut aliases = HashMap::new();
        for metric in metrics {
            let name = metric.name.clone().ok_or(RegistryError::UnnamedMetric)?;
            if known.contains_key(&name) {
                return Err(RegistryError::DuplicateName(name));
            }
            if let Some(alias) = metric.alias {
                if aliases.insert(alias, name.clone()).is_some() {
                    return Err(RegistryError::DuplicateAlias(alias));
                }
            }
            known.insert(
                name.clone(),
                KnownMetric {
                    name,
                    alias: metric.alias,
                    datatype: metric.datatype,
                },
            );
        }
        Ok(Self {
            metrics: known,
            aliases,
        })
    }

    /// Replace the known set with the metrics of a birth certificate.
    ///
    /// On error the existing set is left untouched.
    pub fn register(&mut self, metrics: &[Metric]) -> Result<(), RegistryError> {
        *self = Self::from_metrics(metrics)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
        self.aliases.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn get(&self, name: &str) -> Option<&KnownMetric> {
        self.metrics.get(name)
    }

    pub fn get_by_id(&self, id: &MetricId) -> Option<&KnownMetric> {
        match id {
            MetricId::Name(name) => self.metrics.get(name),
            MetricId::Alias(alias) => self.aliases.get(alias).and_then(|n| self.metrics.get(n)),
        }
    }

    pub fn contains(&self, id: &MetricId) -> bool {
        self.get_by_id(id).is_some()
    }

    fn lookup(&self, metric: &Metric) -> Option<&KnownMetric> {
        match (&metric.name, metric.alias) {
            (Some(name), _) => self.metrics.get(name),
            (None, Some(alias)) => self.get_by_id(&MetricId::Alias(alias)),
            (None, None) => None,
        }
    }

    /// Resolve a metric against its declaration.
    ///
    /// The name is filled in for alias only metrics and the value is reinterpreted as the declared type.
    /// Returns the untouched metric if it is unknown or its value cannot be represented as the declared type.
    pub fn resolve(&self, mut metric: Metric) -> Result<Metric, Metric> {
        let Some(known) = self.lookup(&metric) else {
            return Err(metric);
        };
        if let Some(value) = metric.value.take() {
            match value.clone().reinterpret(known.datatype) {
                Ok(value) => metric.value = Some(value),
                Err(_) => {
                    metric.value = Some(value);
                    return Err(metric);
                }
            }
        } else if metric.datatype != known.datatype {
            return Err(metric);
        }
        metric.name = Some(known.name.clone());
        metric.datatype = known.datatype;
        Ok(metric)
    }

    /// Keep only the metrics present in the known set whose value can be represented as the declared type.
    ///
    /// Input order is preserved. Kept values are converted to the declared type, alias only metrics stay alias only.
    pub fn filter_outgoing(&self, metrics: Vec<Metric>) -> Vec<Metric> {
        metrics
            .into_iter()
            .filter_map(|metric| {
                let named = metric.name.is_some();
                let mut resolved = self.resolve(metric).ok()?;
                if !named {
                    resolved.name = None;
                }
                Some(resolved)
            })
            .collect()
    }

    /// Split incoming metrics into those that resolve against the known set and those that do not.
    pub fn validate_incoming(&self, metrics: Vec<Metric>) -> Validated {
        let mut validated = Validated::default();
        for metric in metrics {
            match self.resolve(metric) {
                Ok(m) => validated.known.push(m),
                Err(m) => validated.rejected.push(m),
            }
        }
        validated
    }
}
