use std::collections::BTreeMap;

use sparklet_types::{utils::validate_name, Metric};

use crate::{birth::BirthCertificate, error::DeviceRegistrationError};

pub(crate) struct Device {
    pub(crate) id: String,
    pub(crate) birth: BirthCertificate,
    pub(crate) birthed: bool,
}

/// The devices registered with a node, keyed by device id
#[derive(Default)]
pub(crate) struct DeviceMap {
    devices: BTreeMap<String, Device>,
}

impl DeviceMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        id: String,
        metrics: Vec<Metric>,
    ) -> Result<&mut Device, DeviceRegistrationError> {
        validate_name(&id).map_err(DeviceRegistrationError::InvalidName)?;
        if self.devices.contains_key(&id) {
            return Err(DeviceRegistrationError::Duplicate(id));
        }
        let birth = BirthCertificate::new(metrics)?;
        let device = self.devices.entry(id.clone()).or_insert(Device {
            id,
            birth,
            birthed: false,
        });
        Ok(device)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Device> {
        self.devices.remove(id)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut()
    }

    /// The node has died, none of its devices are birthed any more
    pub(crate) fn on_death(&mut self) {
        for device in self.devices.values_mut() {
            device.birthed = false;
        }
    }
}
