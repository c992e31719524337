use sparklet_types::{utils::timestamp, KnownMetricsStorage, Metric, RegistryError};

/// The metrics an entity declares in its birth certificate together with the known set derived from them.
///
/// Published values are recorded so a rebirth reports the latest value of every metric.
#[derive(Debug)]
pub(crate) struct BirthCertificate {
    metrics: Vec<Metric>,
    known: KnownMetricsStorage,
}

impl BirthCertificate {
    pub(crate) fn new(metrics: Vec<Metric>) -> Result<Self, RegistryError> {
        let known = KnownMetricsStorage::from_metrics(&metrics)?;
        Ok(Self { metrics, known })
    }

    pub(crate) fn known(&self) -> &KnownMetricsStorage {
        &self.known
    }

    /// Update a birth metric in place. Does nothing if the metric is not part of the certificate.
    pub(crate) fn set_value(&mut self, metric: Metric) {
        if let Some(existing) = self
            .metrics
            .iter_mut()
            .find(|m| m.name.is_some() && m.name == metric.name)
        {
            existing.value = metric.value;
        }
    }

    /// Record the values of published metrics
    pub(crate) fn record(&mut self, published: &[Metric]) {
        for metric in published {
            let name = match (&metric.name, metric.alias) {
                (Some(name), _) => Some(name.clone()),
                (None, Some(_)) => self
                    .known
                    .resolve(metric.clone())
                    .ok()
                    .and_then(|m| m.name),
                (None, None) => None,
            };
            let Some(name) = name else { continue };
            if let Some(existing) = self
                .metrics
                .iter_mut()
                .find(|m| m.name.as_deref() == Some(name.as_str()))
            {
                if existing.datatype != metric.datatype {
                    continue;
                }
                existing.value = metric.value.clone();
                existing.timestamp = metric.timestamp;
            }
        }
    }

    /// The metrics to publish in a birth, stamped with the current time
    pub(crate) fn birth_metrics(&self) -> Vec<Metric> {
        let now = timestamp();
        self.metrics
            .iter()
            .cloned()
            .map(|m| m.timestamp(now))
            .collect()
    }
}
