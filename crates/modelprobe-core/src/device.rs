use std::collections::BTreeMap;
use std::fmt;

/// Option key OpenVINO uses to pick the hardware target.
pub const OPENVINO_DEVICE_TYPE: &str = "device_type";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda {
        device_id: u32,
    },
    OpenVino {
        options: BTreeMap<String, String>,
    },
}

impl Device {
    /// OpenVINO targeting its own CPU plugin, the setup the explorer has always shipped with.
    pub fn openvino_default() -> Self {
        let mut options = BTreeMap::new();
        options.insert(OPENVINO_DEVICE_TYPE.to_string(), "CPU".to_string());
        Device::OpenVino { options }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda { device_id } => write!(f, "cuda:{device_id}"),
            Device::OpenVino { options } => match options.get(OPENVINO_DEVICE_TYPE) {
                Some(ty) => write!(f, "openvino({ty})"),
                None => write!(f, "openvino"),
            },
        }
    }
}
