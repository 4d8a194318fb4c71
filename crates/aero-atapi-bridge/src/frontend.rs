//! Front-end device state: task file, staging buffer, data window and interrupt latch.
//!
//! This is the part of an IDE channel the bridge drives. The bridge owns exactly one
//! [`FrontEnd`], and only the component currently driving the in-flight request mutates it.

use crate::regs::{
    InterruptReason, Status, TaskFile, ATAPI_PACKET_LEN, ATA_ERR_ABRT, IDE_CTRL_NIEN,
};
use crate::scsi::Sense;
use crate::sglist::ScatterList;

/// Fixed-capacity buffer the response is staged in before it reaches the host.
#[derive(Debug, Clone)]
pub struct StagingBuffer {
    data: Box<[u8]>,
}

impl StagingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy the first `len` bytes of `src` to offset zero.
    ///
    /// Returns `None` without touching the buffer when `len` does not fit.
    pub fn fill_from(&mut self, src: &ScatterList, len: usize) -> Option<usize> {
        let dst = self.data.get_mut(..len)?;
        Some(src.copy_to_buf(0, dst))
    }
}

/// Bus-level bookkeeping that lets a restart re-issue the same logical DMA operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub unit: u8,
    pub sector_num: u32,
    pub nsector: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DataPhase {
    None,
    /// Host is writing a command packet through the data register.
    PacketOut {
        packet: [u8; ATAPI_PACKET_LEN],
        index: usize,
    },
    /// Host is reading `staging[io_buffer_index..end]` through the data register.
    PioIn { end: usize },
}

/// One ATAPI device as the host sees it through the task file.
#[derive(Debug, Clone)]
pub struct FrontEnd {
    pub tf: TaskFile,
    pub status: Status,
    pub error: u8,
    pub control: u8,

    staging: StagingBuffer,
    /// Host-side cursor into the staging buffer.
    io_buffer_index: usize,
    /// Bytes the last bulk transfer actually moved.
    io_buffer_size: usize,

    phase: DataPhase,
    transfer_ended: bool,
    packet_ready: Option<[u8; ATAPI_PACKET_LEN]>,

    irq_pending: bool,
    active: bool,
    retry: Option<RetryState>,
}

impl FrontEnd {
    pub fn new(staging_capacity: usize) -> Self {
        Self {
            tf: TaskFile::default(),
            status: Status::IDLE,
            error: 0,
            control: 0,
            staging: StagingBuffer::new(staging_capacity),
            io_buffer_index: 0,
            io_buffer_size: 0,
            phase: DataPhase::None,
            transfer_ended: false,
            packet_ready: None,
            irq_pending: false,
            active: false,
            retry: None,
        }
    }

    pub fn staging(&self) -> &StagingBuffer {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut StagingBuffer {
        &mut self.staging
    }

    pub fn io_buffer_index(&self) -> usize {
        self.io_buffer_index
    }

    pub fn set_io_buffer_index(&mut self, index: usize) {
        self.io_buffer_index = index;
    }

    pub fn io_buffer_size(&self) -> usize {
        self.io_buffer_size
    }

    pub fn set_io_buffer_size(&mut self, size: usize) {
        self.io_buffer_size = size;
    }

    pub fn raise_interrupt(&mut self) {
        // nIEN masks the output line only; the condition stays latched until acknowledged.
        self.irq_pending = true;
    }

    pub fn clear_interrupt(&mut self) {
        self.irq_pending = false;
    }

    /// Interrupt line as seen by the interrupt controller.
    pub fn irq_line(&self) -> bool {
        self.irq_pending && (self.control & IDE_CTRL_NIEN) == 0
    }

    pub fn irq_latched(&self) -> bool {
        self.irq_pending
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self) {
        self.active = true;
    }

    /// Mark the device idle on the bus. A recorded retry survives until [`Self::clear_retry`].
    pub fn set_inactive(&mut self) {
        self.active = false;
    }

    /// Drop the recorded retry once its operation has completed.
    pub fn clear_retry(&mut self) {
        self.retry = None;
    }

    pub fn retry_state(&self) -> Option<RetryState> {
        self.retry
    }

    pub fn record_retry(&mut self, unit: u8) {
        self.retry = Some(RetryState {
            unit,
            sector_num: self.tf.lba28(),
            nsector: self.tf.nsector,
        });
    }

    /// Host read of the status register. Acknowledges the interrupt.
    pub fn read_status(&mut self) -> u8 {
        self.clear_interrupt();
        self.status.bits()
    }

    pub fn alt_status(&self) -> u8 {
        self.status.bits()
    }

    /// Open the packet phase of a PACKET command.
    pub fn begin_packet_out(&mut self) {
        self.phase = DataPhase::PacketOut {
            packet: [0; ATAPI_PACKET_LEN],
            index: 0,
        };
        self.packet_ready = None;
        self.tf.set_interrupt_reason(InterruptReason::COD);
        self.error = 0;
        self.status = Status::IDLE | Status::DRQ;
    }

    pub fn take_packet(&mut self) -> Option<[u8; ATAPI_PACKET_LEN]> {
        self.packet_ready.take()
    }

    /// Expose `len` staging bytes at `offset` to the host and assert DRQ.
    pub fn start_transfer(&mut self, offset: usize, len: usize) {
        self.io_buffer_index = offset;
        self.phase = DataPhase::PioIn { end: offset + len };
        self.transfer_ended = false;
        if !self.status.contains(Status::ERR) {
            self.status |= Status::DRQ;
        }
    }

    /// True once since the host drained the last window started by [`Self::start_transfer`].
    pub fn take_transfer_end(&mut self) -> bool {
        std::mem::take(&mut self.transfer_ended)
    }

    fn end_transfer(&mut self) {
        self.phase = DataPhase::None;
        self.status &= !Status::DRQ;
        self.transfer_ended = true;
    }

    pub fn data_in_u8(&mut self) -> u8 {
        let DataPhase::PioIn { end } = self.phase else {
            return 0xFF;
        };
        let b = self
            .staging
            .as_slice()
            .get(self.io_buffer_index)
            .copied()
            .unwrap_or(0);
        self.io_buffer_index += 1;
        if self.io_buffer_index >= end {
            self.end_transfer();
        }
        b
    }

    pub fn data_in_u16(&mut self) -> u16 {
        let DataPhase::PioIn { end } = self.phase else {
            return 0xFFFF;
        };
        let lo = self.data_in_u8();
        // An odd-length window ends on the low byte.
        let hi = if self.io_buffer_index < end {
            self.data_in_u8()
        } else {
            0
        };
        u16::from_le_bytes([lo, hi])
    }

    pub fn data_in_u32(&mut self) -> u32 {
        let lo = u32::from(self.data_in_u16());
        if matches!(self.phase, DataPhase::None) {
            return lo;
        }
        let hi = u32::from(self.data_in_u16());
        lo | (hi << 16)
    }

    pub fn data_out_u8(&mut self, val: u8) {
        let DataPhase::PacketOut { packet, index } = &mut self.phase else {
            // Writes outside a packet phase are dropped.
            return;
        };
        packet[*index] = val;
        *index += 1;
        if *index == ATAPI_PACKET_LEN {
            self.packet_ready = Some(*packet);
            self.phase = DataPhase::None;
            self.status &= !Status::DRQ;
            self.status |= Status::BSY;
        }
    }

    pub fn data_out_u16(&mut self, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.data_out_u8(lo);
        self.data_out_u8(hi);
    }

    pub fn data_out_u32(&mut self, val: u32) {
        self.data_out_u16(val as u16);
        self.data_out_u16((val >> 16) as u16);
    }

    /// Final status phase of a successful packet command.
    pub fn atapi_cmd_ok(&mut self) {
        self.phase = DataPhase::None;
        self.error = 0;
        self.status = Status::IDLE;
        self.tf
            .set_interrupt_reason(InterruptReason::IO | InterruptReason::COD);
    }

    /// Final status phase of a failed packet command. The sense key lands in the error register.
    pub fn atapi_cmd_error(&mut self, sense: Sense) {
        self.phase = DataPhase::None;
        self.error = sense.key << 4;
        self.status = Status::DRDY | Status::ERR;
        self.tf
            .set_interrupt_reason(InterruptReason::IO | InterruptReason::COD);
    }

    /// Abort a (non-packet) ATA command.
    pub fn abort_command(&mut self) {
        self.phase = DataPhase::None;
        self.error = ATA_ERR_ABRT;
        self.status = Status::DRDY | Status::ERR;
        self.raise_interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pio_window_drains_and_signals_end_once() {
        let mut fe = FrontEnd::new(64);
        fe.staging_mut().as_mut_slice()[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);

        fe.start_transfer(2, 3);
        assert!(fe.status.contains(Status::DRQ));
        assert_eq!(fe.data_in_u16(), u16::from_le_bytes([3, 4]));
        assert!(!fe.take_transfer_end());

        // Odd tail: the high byte of the final word is padding.
        assert_eq!(fe.data_in_u16(), 5);
        assert!(!fe.status.contains(Status::DRQ));
        assert!(fe.take_transfer_end());
        assert!(!fe.take_transfer_end());

        // Reads past the window float high and do not re-signal.
        assert_eq!(fe.data_in_u16(), 0xFFFF);
        assert!(!fe.take_transfer_end());
    }

    #[test]
    fn dword_read_stops_at_window_end() {
        let mut fe = FrontEnd::new(8);
        fe.staging_mut().as_mut_slice()[..2].copy_from_slice(&[0xAA, 0xBB]);
        fe.start_transfer(0, 2);
        assert_eq!(fe.data_in_u32(), 0xBBAA);
        assert!(fe.take_transfer_end());
    }

    #[test]
    fn packet_phase_collects_twelve_bytes() {
        let mut fe = FrontEnd::new(8);
        fe.begin_packet_out();
        assert_eq!(fe.tf.interrupt_reason(), InterruptReason::COD);
        assert!(fe.status.contains(Status::DRQ));

        for w in 0..6u16 {
            assert!(fe.take_packet().is_none());
            fe.data_out_u16(w);
        }
        let packet = fe.take_packet().expect("packet complete");
        assert_eq!(packet[2], 1);
        assert_eq!(packet[10], 5);
        assert!(!fe.status.contains(Status::DRQ));
        assert!(fe.status.contains(Status::BSY));

        // Extra writes are ignored.
        fe.data_out_u16(0xFFFF);
        assert!(fe.take_packet().is_none());
    }

    #[test]
    fn status_read_acknowledges_but_nien_only_masks_line() {
        let mut fe = FrontEnd::new(8);
        fe.control = IDE_CTRL_NIEN;
        fe.raise_interrupt();
        assert!(fe.irq_latched());
        assert!(!fe.irq_line());

        fe.control = 0;
        assert!(fe.irq_line());
        let _ = fe.alt_status();
        assert!(fe.irq_line());
        let _ = fe.read_status();
        assert!(!fe.irq_latched());
    }

    #[test]
    fn staging_fill_refuses_oversized_copy() {
        let mut staging = StagingBuffer::new(4);
        let src = ScatterList::from(vec![9u8; 8]);
        assert_eq!(staging.fill_from(&src, 8), None);
        assert_eq!(staging.as_slice(), &[0, 0, 0, 0]);
        assert_eq!(staging.fill_from(&src, 3), Some(3));
        assert_eq!(staging.as_slice(), &[9, 9, 9, 0]);
    }

    #[test]
    fn retry_state_outlives_inactive() {
        let mut fe = FrontEnd::new(8);
        fe.tf.sector = 0x10;
        fe.tf.nsector = 4;
        fe.record_retry(1);
        fe.set_active();
        fe.set_inactive();
        assert!(!fe.is_active());
        assert_eq!(
            fe.retry_state(),
            Some(RetryState {
                unit: 1,
                sector_num: 0x10,
                nsector: 4,
            })
        );
        fe.clear_retry();
        assert_eq!(fe.retry_state(), None);
    }

    #[test]
    fn error_phase_reports_sense_key() {
        let mut fe = FrontEnd::new(8);
        fe.tf.nsector = 0xF8;
        fe.atapi_cmd_error(Sense::illegal_request(0x24));
        assert_eq!(fe.error, 0x50);
        assert_eq!(fe.status, Status::DRDY | Status::ERR);
        assert_eq!(fe.tf.nsector, 0xFB);
    }
}
