// Output device discovery (cpal)

use crate::output::{OutputError, OutputResult};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

pub struct AudioDeviceManager {
    host: Host,
}

impl AudioDeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// All output devices the host reports, default one flagged
    pub fn list_output_devices(&self) -> Vec<OutputDeviceInfo> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let Ok(devices) = self.host.output_devices() else {
            return Vec::new();
        };

        devices
            .filter_map(|device| device.name().ok())
            .map(|name| OutputDeviceInfo {
                is_default: name == default_name,
                name,
            })
            .collect()
    }

    /// Device by name, or the default output device when `name` is None
    pub fn output_device(&self, name: Option<&str>) -> OutputResult<Device> {
        let Some(wanted) = name else {
            return self
                .host
                .default_output_device()
                .ok_or_else(|| OutputError::Device("no default output device".to_string()));
        };

        let devices = self
            .host
            .output_devices()
            .map_err(|e| OutputError::Device(e.to_string()))?;
        for device in devices {
            if let Ok(device_name) = device.name()
                && device_name == wanted
            {
                return Ok(device);
            }
        }
        Err(OutputError::Device(format!("output device '{}' not found", wanted)))
    }
}

impl Default for AudioDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
