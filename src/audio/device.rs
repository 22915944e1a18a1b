use tracing::{error, info, warn};

use super::backend::{AudioHost, DeviceRef};
use crate::error::{RecorderError, Result};

/// Pick the input device for this session
///
/// The first device in host enumeration order wins. If `preferred` is set,
/// the first device whose name contains it (case-insensitive) wins instead;
/// when nothing matches the first device is used.
pub fn select_input_device(host: &dyn AudioHost, preferred: Option<&str>) -> Result<DeviceRef> {
    let devices = host.input_devices()?;

    info!("Available input devices ({}):", host.name());
    for device in &devices {
        info!("  Device {}: {}", device.index, device.name);
    }

    let chosen = choose(&devices, preferred).cloned().ok_or_else(|| {
        error!("No input devices found");
        RecorderError::NoDeviceFound
    })?;

    info!("Using input device {}: {}", chosen.index, chosen.name);
    Ok(chosen)
}

/// Selection rule without logging, shared with the device listing command
pub fn choose<'a>(devices: &'a [DeviceRef], preferred: Option<&str>) -> Option<&'a DeviceRef> {
    let preferred = preferred.map(str::trim).filter(|p| !p.is_empty());

    if let Some(wanted) = preferred {
        let wanted = wanted.to_lowercase();
        match devices
            .iter()
            .find(|d| d.name.to_lowercase().contains(&wanted))
        {
            Some(device) => return Some(device),
            None => warn!(
                "Preferred device substring '{}' not found, using first available",
                wanted
            ),
        }
    }

    devices.first()
}
