use crate::error::ConfigError;
use crate::scsi::READ_TRACK_INFORMATION;

/// Size of the IDE transfer buffer: 256 sectors plus a small tail.
pub const DEFAULT_STAGING_CAPACITY: usize = 256 * 512 + 4;

pub const MIN_STAGING_CAPACITY: usize = 64;
pub const MAX_STAGING_CAPACITY: usize = 16 * 1024 * 1024;

/// Construction-time settings for an [`crate::AtapiBridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Drive unit on the front-end bus (0 = master, 1 = slave).
    pub unit: u8,
    /// Capacity of the staging buffer in bytes. Responses larger than this fail the command.
    pub staging_capacity: usize,
    /// Opcodes whose completions are rejected outright.
    ///
    /// Defaults to READ TRACK INFORMATION, which the back end may deliver with a response the
    /// front end cannot describe.
    pub disallowed_opcodes: Vec<u8>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            unit: 0,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            disallowed_opcodes: vec![READ_TRACK_INFORMATION],
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unit > 1 {
            return Err(ConfigError::InvalidUnit(self.unit));
        }
        if !(MIN_STAGING_CAPACITY..=MAX_STAGING_CAPACITY).contains(&self.staging_capacity) {
            return Err(ConfigError::StagingCapacity(self.staging_capacity));
        }
        Ok(())
    }

    pub fn is_disallowed(&self, opcode: u8) -> bool {
        self.disallowed_opcodes.contains(&opcode)
    }
}
