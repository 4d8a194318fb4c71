//! ATAPI front end driven by a SCSI back end.
//!
//! A packet command arriving on the front end is submitted to the back end as-is. When the back
//! end completes it, the response is staged and moved to the host either in byte-count-limited
//! PIO chunks (one interrupt per chunk, re-entered on every host acknowledge) or in a single bus
//! master DMA transfer, depending on the features register at the time the command arrived.

use tracing::{debug, trace, warn};

use crate::backend::{BackendCompletion, BackendError, RequestId, ScsiBackend};
use crate::busmaster::{BusMasterChannel, DmaRequest};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::frontend::FrontEnd;
use crate::limit::{plan_chunk, TransferLimit};
use crate::memory::GuestMemory;
use crate::regs::{
    InterruptReason, Status, TransferMode, ATAPI_PACKET_LEN, ATA_CMD_PACKET, ATA_REG_DATA,
    ATA_REG_ERROR_FEATURES, ATA_REG_STATUS_COMMAND,
};
use crate::scsi::{
    self, CommandStatus, ResponseLength, Sense, ASC_INVALID_COMMAND, ASC_INVALID_FIELD_IN_CDB,
    ASC_LBA_OUT_OF_RANGE, ASC_MEDIUM_NOT_PRESENT, MAX_CDB_LEN, SENSE_ABORTED_COMMAND,
    SENSE_NOT_READY,
};
use crate::sglist::ScatterList;

/// What runs the next time the in-flight request is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The host acknowledge plans and starts the next programmed chunk.
    Chunking,
    /// The last chunk is out; the host acknowledge completes the request.
    Done,
    /// Waiting for the bus master to run the queued transfer.
    AwaitingBulk(DmaRequest),
}

/// One translated command with a data phase in progress.
#[derive(Debug, Clone)]
pub struct BridgeRequest {
    id: RequestId,
    opcode: u8,
    mode: TransferMode,
    payload: ScatterList,
    /// Bytes not yet handed to the host.
    buflen: usize,
    continuation: Continuation,
}

impl BridgeRequest {
    /// Back-end handle of the request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// First CDB byte.
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Data path latched when the command arrived.
    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Back-end scatter view, sized to the staged response.
    pub fn payload(&self) -> &ScatterList {
        &self.payload
    }

    /// Staged response length in bytes.
    pub fn total(&self) -> usize {
        self.payload.size()
    }

    /// Bytes not yet handed to the host.
    pub fn buflen(&self) -> usize {
        self.buflen
    }

    /// What the next re-entry will do.
    pub fn continuation(&self) -> Continuation {
        self.continuation
    }
}

#[derive(Debug, Clone)]
struct SubmittedCommand {
    id: RequestId,
    opcode: u8,
    length_hint: usize,
    mode: TransferMode,
}

#[derive(Debug, Clone)]
enum RequestState {
    Idle,
    /// Handed to the back end; no completion seen yet.
    Submitted(SubmittedCommand),
    Transferring(BridgeRequest),
}

/// Why a completion was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The completion does not belong to the in-flight request.
    UnknownRequest(RequestId),
    /// The command is on the configured disallow list.
    DisallowedOpcode(u8),
}

/// Result of handing a back-end completion to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No data phase; the request is already complete.
    Completed,
    /// The programmed engine started its first chunk.
    Programmed { first_chunk: usize, total: usize },
    /// A bulk transfer of `len` bytes is queued on the bus master.
    Direct { len: usize },
    /// The request was completed with a check condition.
    Failed(Sense),
    /// Nothing was touched.
    Rejected(RejectReason),
}

/// Result of re-entering the in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    /// Another programmed chunk is exposed to the host.
    Chunk { offset: usize, len: usize },
    /// The request completed successfully.
    Done,
    Failed(Sense),
    /// The bridge was not waiting for this event.
    NotWaiting,
}

/// ATAPI device front end whose packet commands run on a SCSI back end `B`.
pub struct AtapiBridge<B: ScsiBackend> {
    config: BridgeConfig,
    frontend: FrontEnd,
    bus_master: BusMasterChannel,
    backend: B,
    state: RequestState,
}

impl<B: ScsiBackend> AtapiBridge<B> {
    /// Validate `config` and build an idle bridge in front of `backend`.
    pub fn new(config: BridgeConfig, backend: B) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            frontend: FrontEnd::new(config.staging_capacity),
            bus_master: BusMasterChannel::new(),
            config,
            backend,
            state: RequestState::Idle,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Device registers, staging buffer and interrupt state.
    pub fn frontend(&self) -> &FrontEnd {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut FrontEnd {
        &mut self.frontend
    }

    /// Bus Master IDE registers for this channel.
    pub fn bus_master(&self) -> &BusMasterChannel {
        &self.bus_master
    }

    pub fn bus_master_mut(&mut self) -> &mut BusMasterChannel {
        &mut self.bus_master
    }

    /// The back end executing this bridge's commands.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// True when no request is submitted or transferring.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, RequestState::Idle)
    }

    /// The request currently in its data phase, if any.
    pub fn in_flight(&self) -> Option<&BridgeRequest> {
        match &self.state {
            RequestState::Transferring(req) => Some(req),
            _ => None,
        }
    }

    /// A packet command arrived on the front end. Submits it to the back end.
    ///
    /// Only one request may be outstanding; a second command is refused with
    /// [`BridgeError::Busy`] and leaves every piece of state untouched.
    pub fn on_command_received(
        &mut self,
        cdb: &[u8],
        length_hint: usize,
    ) -> Result<RequestId, BridgeError> {
        if !self.is_idle() {
            warn!(opcode = cdb.first().copied(), "command received while a request is in flight");
            return Err(BridgeError::Busy);
        }
        let Some(&opcode) = cdb.first() else {
            return Err(BridgeError::EmptyCommand);
        };
        if cdb.len() > MAX_CDB_LEN {
            return Err(BridgeError::CommandTooLong(cdb.len()));
        }

        let mode = TransferMode::from_features(self.frontend.tf.features);
        let id = self.backend.execute(cdb)?;
        debug!(%id, command = scsi::opcode_name(opcode), ?mode, length_hint, "submitted");

        self.state = RequestState::Submitted(SubmittedCommand {
            id,
            opcode,
            length_hint,
            mode,
        });
        Ok(id)
    }

    /// The back end finished executing `id`.
    ///
    /// Stages the response and starts the data phase on the path latched when the command
    /// arrived. A completion that does not match the in-flight request, or that belongs to a
    /// disallowed command, is rejected before any front-end register or the staging buffer is
    /// touched.
    pub fn on_completion(&mut self, id: RequestId, completion: BackendCompletion) -> DispatchOutcome {
        let cmd = match &self.state {
            RequestState::Submitted(cmd) if cmd.id == id => cmd.clone(),
            _ => {
                warn!(%id, "completion for a request that is not in flight");
                return DispatchOutcome::Rejected(RejectReason::UnknownRequest(id));
            }
        };

        if self.config.is_disallowed(cmd.opcode) {
            warn!(%id, opcode = cmd.opcode, command = scsi::opcode_name(cmd.opcode), "incorrect command, dropping response");
            // The back end learns about the rejection from the return value and owns the
            // request from here on.
            self.state = RequestState::Idle;
            return DispatchOutcome::Rejected(RejectReason::DisallowedOpcode(cmd.opcode));
        }

        if let CommandStatus::CheckCondition(sense) = completion.status {
            debug!(%id, ?sense, "back end reported check condition");
            return DispatchOutcome::Failed(self.fail(id, sense));
        }

        let mut payload = completion.payload;
        let len = match scsi::response_length(cmd.opcode) {
            ResponseLength::NoData => {
                self.finish_ok(id);
                return DispatchOutcome::Completed;
            }
            ResponseLength::Fixed(len) => len,
            ResponseLength::Payload => payload.size(),
            ResponseLength::Hinted => {
                let reported = payload.size().saturating_sub(completion.residual);
                match cmd.length_hint {
                    0 => reported,
                    hint => reported.min(hint),
                }
            }
        };
        payload.resize(len);

        if self.frontend.staging_mut().fill_from(&payload, len).is_none() {
            warn!(%id, len, capacity = self.config.staging_capacity, "response does not fit the staging buffer");
            return DispatchOutcome::Failed(
                self.fail(id, Sense::illegal_request(ASC_LBA_OUT_OF_RANGE)),
            );
        }
        self.frontend.set_io_buffer_index(0);
        self.frontend.status = Status::IDLE;
        debug!(%id, command = scsi::opcode_name(cmd.opcode), len, mode = ?cmd.mode, "response staged");

        let mut req = BridgeRequest {
            id,
            opcode: cmd.opcode,
            mode: cmd.mode,
            payload,
            buflen: len,
            continuation: Continuation::Chunking,
        };
        match cmd.mode {
            TransferMode::Programmed => {
                self.state = RequestState::Transferring(req);
                match self.do_transfer() {
                    TransferStep::Chunk { len: first_chunk, .. } => DispatchOutcome::Programmed {
                        first_chunk,
                        total: len,
                    },
                    TransferStep::Failed(sense) => DispatchOutcome::Failed(sense),
                    TransferStep::Done | TransferStep::NotWaiting => DispatchOutcome::Completed,
                }
            }
            TransferMode::Direct => {
                let dma = DmaRequest::data_in(len);
                self.frontend.record_retry(self.config.unit);
                self.frontend.status = Status::IDLE | Status::BSY | Status::DRQ;
                self.frontend.set_active();
                req.continuation = Continuation::AwaitingBulk(dma);
                self.state = RequestState::Transferring(req);
                DispatchOutcome::Direct { len }
            }
        }
    }

    /// The host consumed the current programmed chunk.
    pub fn on_chunk_acknowledged(&mut self) -> TransferStep {
        match self.in_flight().map(BridgeRequest::continuation) {
            Some(Continuation::Chunking | Continuation::Done) => self.do_transfer(),
            _ => TransferStep::NotWaiting,
        }
    }

    /// Bulk-transfer completion for the direct path.
    ///
    /// Moves the staged bytes through the bus master into guest memory and completes the
    /// request. Fires at most once per request.
    pub fn on_bulk_complete(
        &mut self,
        mem: &mut dyn GuestMemory,
    ) -> Result<TransferStep, BridgeError> {
        let (id, dma) = match &self.state {
            RequestState::Transferring(BridgeRequest {
                id,
                continuation: Continuation::AwaitingBulk(dma),
                ..
            }) => (*id, *dma),
            _ => return Err(BridgeError::NoBulkTransfer),
        };

        self.frontend.set_io_buffer_size(dma.len);
        self.frontend
            .tf
            .set_interrupt_reason(InterruptReason::IO | InterruptReason::COD);

        let res = self
            .bus_master
            .execute_dma(mem, &dma, self.frontend.staging_mut().as_mut_slice());
        self.frontend.set_inactive();
        match res {
            Ok(moved) => {
                self.frontend.clear_retry();
                self.bus_master.finish_success();
                self.frontend.set_io_buffer_size(moved);
                debug!(%id, moved, "bulk transfer complete");
                self.backend.complete_request(id, CommandStatus::Good);
                self.frontend.status = Status::IDLE;
                self.frontend.raise_interrupt();
                self.state = RequestState::Idle;
                Ok(TransferStep::Done)
            }
            Err(err) => {
                warn!(%id, %err, retry = ?self.frontend.retry_state(), "bulk transfer failed");
                self.bus_master.finish_error();
                let sense = self.fail(id, Sense::new(SENSE_ABORTED_COMMAND, 0, 0));
                Ok(TransferStep::Failed(sense))
            }
        }
    }

    /// Run the queued bulk transfer once the guest has started the bus master.
    ///
    /// Returns how the request ended, or `None` when no transfer ran.
    pub fn tick(&mut self, mem: &mut dyn GuestMemory) -> Option<TransferStep> {
        if !self.bus_master.is_started() {
            return None;
        }
        match self.in_flight().map(BridgeRequest::continuation) {
            Some(Continuation::AwaitingBulk(_)) => self.on_bulk_complete(mem).ok(),
            _ => None,
        }
    }

    /// Programmed engine: plan and expose the next chunk, or complete when nothing is left.
    fn do_transfer(&mut self) -> TransferStep {
        let RequestState::Transferring(req) = &mut self.state else {
            return TransferStep::NotWaiting;
        };
        let id = req.id;
        if req.buflen == 0 {
            self.finish_ok(id);
            return TransferStep::Done;
        }

        let tf = &mut self.frontend.tf;
        let plan = plan_chunk(req.buflen, TransferLimit::from_registers(tf.lcyl, tf.hcyl));
        if plan.chunk == 0 {
            warn!(%id, limit = tf.byte_count(), "byte count limit admits no progress");
            let sense = self.fail(id, Sense::illegal_request(ASC_INVALID_FIELD_IN_CDB));
            return TransferStep::Failed(sense);
        }

        let offset = req.total() - req.buflen;
        req.buflen = plan.remaining;
        req.continuation = if plan.is_final() {
            Continuation::Done
        } else {
            Continuation::Chunking
        };
        tf.set_byte_count(plan.byte_count());
        tf.set_interrupt_reason(InterruptReason::IO);
        trace!(%id, offset, len = plan.chunk, remaining = plan.remaining, "programmed chunk");

        self.frontend.status = Status::IDLE;
        self.frontend.start_transfer(offset, plan.chunk);
        self.frontend.raise_interrupt();
        TransferStep::Chunk {
            offset,
            len: plan.chunk,
        }
    }

    fn finish_ok(&mut self, id: RequestId) {
        debug!(%id, "request complete");
        self.backend.complete_request(id, CommandStatus::Good);
        self.frontend.atapi_cmd_ok();
        self.frontend.raise_interrupt();
        self.state = RequestState::Idle;
    }

    fn fail(&mut self, id: RequestId, sense: Sense) -> Sense {
        self.backend
            .complete_request(id, CommandStatus::CheckCondition(sense));
        self.frontend.atapi_cmd_error(sense);
        self.frontend.raise_interrupt();
        self.state = RequestState::Idle;
        sense
    }

    /// Guest read of a command block register (`reg` = offset 0..=7). Draining the data
    /// window acknowledges the current chunk.
    pub fn io_read(&mut self, reg: u16, size: u8) -> u32 {
        if size == 0 {
            return 0;
        }
        match reg {
            ATA_REG_DATA => {
                let val = match size {
                    1 => u32::from(self.frontend.data_in_u8()),
                    2 => u32::from(self.frontend.data_in_u16()),
                    _ => self.frontend.data_in_u32(),
                };
                if self.frontend.take_transfer_end() {
                    self.on_chunk_acknowledged();
                }
                val
            }
            ATA_REG_ERROR_FEATURES => u32::from(self.frontend.error),
            ATA_REG_STATUS_COMMAND => u32::from(self.frontend.read_status()),
            _ => u32::from(self.frontend.tf.read_reg(reg)),
        }
    }

    /// Guest write of a command block register. The twelfth packet byte submits the command.
    pub fn io_write(&mut self, reg: u16, size: u8, val: u32) {
        if size == 0 {
            return;
        }
        match reg {
            ATA_REG_DATA => {
                match size {
                    1 => self.frontend.data_out_u8(val as u8),
                    2 => self.frontend.data_out_u16(val as u16),
                    _ => self.frontend.data_out_u32(val),
                }
                if let Some(packet) = self.frontend.take_packet() {
                    self.accept_packet(packet);
                }
            }
            ATA_REG_STATUS_COMMAND => self.exec_command(val as u8),
            _ => self.frontend.tf.write_reg(reg, val as u8),
        }
    }

    /// Alternate status; does not acknowledge the interrupt.
    pub fn read_alt_status(&self) -> u8 {
        self.frontend.alt_status()
    }

    /// Device control register (nIEN).
    pub fn write_device_control(&mut self, val: u8) {
        self.frontend.control = val;
    }

    fn exec_command(&mut self, cmd: u8) {
        // Commands written while a request is in flight or a data phase is open are dropped
        // with no register change; the in-flight request keeps its window.
        if !self.is_idle() || self.frontend.status.contains(Status::DRQ) {
            warn!(cmd, "command written while the device is busy, ignoring");
            return;
        }
        self.frontend.clear_interrupt();
        if cmd != ATA_CMD_PACKET {
            debug!(cmd, "aborting ATA command");
            self.frontend.abort_command();
            return;
        }
        self.frontend.begin_packet_out();
        self.frontend.raise_interrupt();
    }

    fn accept_packet(&mut self, packet: [u8; ATAPI_PACKET_LEN]) {
        // The byte-count register bounds each chunk, not the response, so the back end's
        // length stands.
        match self.on_command_received(&packet, 0) {
            Ok(_) => {}
            Err(BridgeError::Backend(err)) => {
                let sense = match err {
                    BackendError::NoDevice => Sense::new(SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT, 0),
                    BackendError::Refused { .. } => Sense::illegal_request(ASC_INVALID_COMMAND),
                };
                self.frontend.atapi_cmd_error(sense);
                self.frontend.raise_interrupt();
            }
            Err(err) => {
                warn!(%err, "packet refused");
                self.frontend.abort_command();
            }
        }
    }
}
