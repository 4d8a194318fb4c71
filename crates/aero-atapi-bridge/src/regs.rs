//! Front-end (ATA/ATAPI) register layout.
//!
//! Only the registers that take part in the packet transfer cycle are modelled: the byte-count
//! limit pair (cylinder low/high), the interrupt reason (sector count), features (DMA select),
//! status/error and device select.

use bitflags::bitflags;

pub const ATA_REG_DATA: u16 = 0;
pub const ATA_REG_ERROR_FEATURES: u16 = 1;
pub const ATA_REG_SECTOR_COUNT: u16 = 2;
pub const ATA_REG_LBA0: u16 = 3;
pub const ATA_REG_LBA1: u16 = 4;
pub const ATA_REG_LBA2: u16 = 5;
pub const ATA_REG_DEVICE: u16 = 6;
pub const ATA_REG_STATUS_COMMAND: u16 = 7;

pub const ATA_CMD_PACKET: u8 = 0xA0;

/// Error register: command aborted.
pub const ATA_ERR_ABRT: u8 = 0x04;

/// Device control: interrupt output disabled.
pub const IDE_CTRL_NIEN: u8 = 0x02;

/// Features bit 0 selects DMA for the data phase of a PACKET command.
pub const FEATURES_DMA: u8 = 0x01;

/// ATAPI command packets are always 12 bytes on this bus.
pub const ATAPI_PACKET_LEN: usize = 12;

bitflags! {
    /// ATA status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const BSY = 0x80;
        const DRDY = 0x40;
        const DF = 0x20;
        /// Seek complete (DSC).
        const SEEK = 0x10;
        const DRQ = 0x08;
        const CORR = 0x04;
        const IDX = 0x02;
        const ERR = 0x01;
    }
}

bitflags! {
    /// ATAPI interrupt reason, carried in the low bits of the sector count register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterruptReason: u8 {
        /// Command (1) vs. data (0) phase.
        const COD = 0x01;
        /// Device to host (1) vs. host to device (0).
        const IO = 0x02;
        const REL = 0x04;
    }
}

impl Status {
    /// Idle, ready for the next command.
    pub const IDLE: Status = Status::DRDY.union(Status::SEEK);
}

/// Which front-end path a request uses for its data phase.
///
/// Latched from the features register when the command is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Programmed,
    Direct,
}

impl TransferMode {
    pub fn from_features(features: u8) -> Self {
        if (features & FEATURES_DMA) != 0 {
            TransferMode::Direct
        } else {
            TransferMode::Programmed
        }
    }
}

/// ATA command block registers other than data and status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFile {
    pub features: u8,
    /// Sector count; doubles as the ATAPI interrupt reason.
    pub nsector: u8,
    pub sector: u8,
    /// Byte-count limit, low byte.
    pub lcyl: u8,
    /// Byte-count limit, high byte.
    pub hcyl: u8,
    pub select: u8,
}

impl TaskFile {
    pub fn read_reg(&self, reg: u16) -> u8 {
        match reg {
            ATA_REG_ERROR_FEATURES => self.features,
            ATA_REG_SECTOR_COUNT => self.nsector,
            ATA_REG_LBA0 => self.sector,
            ATA_REG_LBA1 => self.lcyl,
            ATA_REG_LBA2 => self.hcyl,
            ATA_REG_DEVICE => self.select,
            _ => 0,
        }
    }

    pub fn write_reg(&mut self, reg: u16, val: u8) {
        match reg {
            ATA_REG_ERROR_FEATURES => self.features = val,
            ATA_REG_SECTOR_COUNT => self.nsector = val,
            ATA_REG_LBA0 => self.sector = val,
            ATA_REG_LBA1 => self.lcyl = val,
            ATA_REG_LBA2 => self.hcyl = val,
            ATA_REG_DEVICE => self.select = val,
            _ => {}
        }
    }

    pub fn interrupt_reason(&self) -> InterruptReason {
        InterruptReason::from_bits_truncate(self.nsector)
    }

    /// Replace the interrupt reason bits, keeping the upper (tag) bits of the register.
    pub fn set_interrupt_reason(&mut self, reason: InterruptReason) {
        self.nsector = (self.nsector & !0x07) | reason.bits();
    }

    /// Raw 16-bit byte-count limit, before normalization.
    pub fn byte_count(&self) -> u16 {
        u16::from_le_bytes([self.lcyl, self.hcyl])
    }

    pub fn set_byte_count(&mut self, count: u16) {
        let [lo, hi] = count.to_le_bytes();
        self.lcyl = lo;
        self.hcyl = hi;
    }

    /// LBA28 address currently held in the task file.
    pub fn lba28(&self) -> u32 {
        let high4 = u32::from(self.select & 0x0F);
        (high4 << 24) | u32::from(self.hcyl) << 16 | u32::from(self.lcyl) << 8 | u32::from(self.sector)
    }
}
