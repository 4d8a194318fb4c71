//! Interface to the command-execution back end.
//!
//! The back end runs generic SCSI commands. The bridge submits a command, and the back end later
//! delivers the result through [`crate::AtapiBridge::on_completion`]. Once the bridge is done
//! with the data phase it reports the final status through [`ScsiBackend::complete_request`].

use std::fmt;

use thiserror::Error;

use crate::scsi::CommandStatus;
use crate::sglist::ScatterList;

/// Opaque handle for a submitted command. Owned by the back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Why the back end would not take a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("no device attached to the back-end bus")]
    NoDevice,
    #[error("back end refused command 0x{opcode:02x}")]
    Refused { opcode: u8 },
}

/// What the back end hands back when a submitted command finishes executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCompletion {
    pub status: CommandStatus,
    pub payload: ScatterList,
    /// Bytes of the caller's allocation the back end did not fill.
    pub residual: usize,
}

impl BackendCompletion {
    /// Successful completion carrying `payload`.
    pub fn good(payload: impl Into<ScatterList>) -> Self {
        Self {
            status: CommandStatus::Good,
            payload: payload.into(),
            residual: 0,
        }
    }

    /// Completion with no data, typically a check condition.
    pub fn failed(status: CommandStatus) -> Self {
        Self {
            status,
            payload: ScatterList::new(),
            residual: 0,
        }
    }
}

/// Executes generic SCSI commands on behalf of the bridge.
pub trait ScsiBackend {
    /// Submit a command descriptor block for execution.
    fn execute(&mut self, cdb: &[u8]) -> Result<RequestId, BackendError>;

    /// Finish a request. After this call the handle is dead.
    fn complete_request(&mut self, id: RequestId, status: CommandStatus);
}

impl<T: ScsiBackend + ?Sized> ScsiBackend for Box<T> {
    fn execute(&mut self, cdb: &[u8]) -> Result<RequestId, BackendError> {
        (**self).execute(cdb)
    }

    fn complete_request(&mut self, id: RequestId, status: CommandStatus) {
        (**self).complete_request(id, status)
    }
}
