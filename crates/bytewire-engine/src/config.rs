use bytewire_frame::FrameConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default number of slots in each listener table.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// Everything fixed when an [`Engine`](crate::Engine) is constructed.
///
/// Frame layout fields are flattened, so a JSON config reads as one flat
/// object:
///
/// ```json
/// { "checksum": "crc16", "sof_byte": 170, "max_id_listeners": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wire layout and buffer sizing.
    #[serde(flatten)]
    pub frame: FrameConfig,
    /// Capacity of the id listener table.
    pub max_id_listeners: usize,
    /// Capacity of the type listener table.
    pub max_type_listeners: usize,
    /// Capacity of the generic listener table.
    pub max_generic_listeners: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            max_id_listeners: DEFAULT_MAX_LISTENERS,
            max_type_listeners: DEFAULT_MAX_LISTENERS,
            max_generic_listeners: DEFAULT_MAX_LISTENERS,
        }
    }
}

impl EngineConfig {
    /// Wrap a frame layout with default listener capacities.
    pub fn with_frame(frame: FrameConfig) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate against the configured built-in checksum.
    pub fn validate(&self) -> Result<()> {
        self.frame.validate(&self.frame.checksum)?;
        Ok(())
    }
}
