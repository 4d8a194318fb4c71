//! ATAPI packet front end bridged onto a generic SCSI command back end.
//!
//! A guest talks to what looks like an IDE/ATAPI CD-ROM through the task-file registers. The
//! packet commands it sends are executed by an arbitrary SCSI back end, and the responses are
//! moved back through the front end's data phases. This crate provides:
//!
//! - [`AtapiBridge`]: dispatcher and the two transfer engines (programmed chunks, bus master DMA)
//! - [`FrontEnd`]: task file, staging buffer, data window and interrupt latch
//! - [`BusMasterChannel`]: PRD-driven bulk transfer into guest memory
//! - [`ScsiBackend`]: the seam to whatever actually executes the commands
//! - [`TransferLimit`]/[`plan_chunk`]: byte-count-limit chunk planning
//!
//! Only device-to-host (data-in) responses are carried.

mod backend;
mod bridge;
mod config;
mod error;
mod frontend;
mod limit;
mod sglist;

pub mod busmaster;
pub mod memory;
pub mod regs;
pub mod scsi;

pub use backend::{BackendCompletion, BackendError, RequestId, ScsiBackend};
pub use bridge::{
    AtapiBridge, BridgeRequest, Continuation, DispatchOutcome, RejectReason, TransferStep,
};
pub use busmaster::{BusMasterChannel, DmaDirection, DmaError, DmaRequest};
pub use config::{BridgeConfig, DEFAULT_STAGING_CAPACITY};
pub use error::{BridgeError, ConfigError};
pub use frontend::{FrontEnd, RetryState, StagingBuffer};
pub use limit::{plan_chunk, ChunkPlan, TransferLimit, BYTE_COUNT_SENTINEL};
pub use memory::{GuestMemory, GuestRam};
pub use sglist::ScatterList;
