//! Bus Master IDE channel: the bulk-transfer facility behind the direct (DMA) data path.
//!
//! The bridge describes the bytes to move as a [`DmaRequest`] over the staging buffer. The
//! transfer itself runs when the guest sets the start bit, walking the PRD table it programmed.

use thiserror::Error;

use crate::memory::GuestMemory;

/// Direction of a bus master transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// Device -> guest memory.
    ToMemory,
    /// Guest memory -> device.
    FromMemory,
}

/// Why a bus master transfer could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DmaError {
    #[error("bus master direction does not match the queued request")]
    DirectionMismatch,
    #[error("PRD table ended before the request was transferred")]
    PrdTooShort,
    #[error("PRD table has no end-of-table entry")]
    PrdMissingEndOfTable,
    #[error("request range {offset}+{len} exceeds the staging buffer")]
    OutOfBounds { offset: usize, len: usize },
}

pub type DmaResult<T> = Result<T, DmaError>;

/// Bulk-transfer descriptor: a byte range of the staging buffer plus a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRequest {
    pub direction: DmaDirection,
    pub offset: usize,
    pub len: usize,
}

impl DmaRequest {
    pub fn data_in(len: usize) -> Self {
        Self {
            direction: DmaDirection::ToMemory,
            offset: 0,
            len,
        }
    }
}

/// One physical region descriptor as the guest laid it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrdEntry {
    pub addr: u32,
    pub byte_count: u16,
    pub end_of_table: bool,
}

impl PrdEntry {
    pub fn read_from(mem: &mut dyn GuestMemory, paddr: u64) -> Self {
        let addr = mem.read_u32(paddr);
        let byte_count = mem.read_u16(paddr.wrapping_add(4));
        let flags = mem.read_u16(paddr.wrapping_add(6));
        Self {
            addr,
            byte_count,
            end_of_table: (flags & 0x8000) != 0,
        }
    }

    fn effective_len(&self) -> usize {
        // A byte_count of 0 encodes 64KiB.
        match self.byte_count {
            0 => 65536,
            c => usize::from(c),
        }
    }
}

const BM_CMD_START: u8 = 0x01;
const BM_CMD_READ: u8 = 0x08;

const BM_STATUS_ACTIVE: u8 = 0x01;
const BM_STATUS_ERROR: u8 = 0x02;
const BM_STATUS_IRQ: u8 = 0x04;

/// One Bus Master IDE register block.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusMasterChannel {
    cmd: u8,
    status: u8,
    prd_addr: u32,
}

impl BusMasterChannel {
    // Caps the work a single transfer can do when the guest hands us a degenerate PRD table.
    const MAX_PRD_ENTRIES_PER_DMA: usize = 65_536;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        (self.cmd & BM_CMD_START) != 0
    }

    pub fn read(&self, reg_off: u16) -> u8 {
        match reg_off {
            0 => self.cmd,
            2 => self.status,
            4..=7 => self.prd_addr.to_le_bytes()[usize::from(reg_off - 4)],
            _ => 0,
        }
    }

    pub fn read_prd_addr(&self) -> u32 {
        self.prd_addr
    }

    pub fn write(&mut self, reg_off: u16, val: u8) {
        match reg_off {
            0 => {
                let masked = val & (BM_CMD_START | BM_CMD_READ);
                self.cmd = masked;
                if (masked & BM_CMD_START) == 0 {
                    self.status &= !BM_STATUS_ACTIVE;
                }
            }
            2 => {
                // Write-one-to-clear.
                self.status &= !(val & (BM_STATUS_IRQ | BM_STATUS_ERROR));
            }
            _ => {}
        }
    }

    pub fn write_prd_addr(&mut self, addr: u32) {
        self.prd_addr = addr & 0xFFFF_FFFC;
    }

    /// Move `req` between `staging` and guest memory. Returns the number of bytes transferred.
    pub fn execute_dma(
        &mut self,
        mem: &mut dyn GuestMemory,
        req: &DmaRequest,
        staging: &mut [u8],
    ) -> DmaResult<usize> {
        let bm_dir = if (self.cmd & BM_CMD_READ) != 0 {
            DmaDirection::ToMemory
        } else {
            DmaDirection::FromMemory
        };
        if bm_dir != req.direction {
            return Err(DmaError::DirectionMismatch);
        }
        let buf = req
            .offset
            .checked_add(req.len)
            .and_then(|end| staging.get_mut(req.offset..end))
            .ok_or(DmaError::OutOfBounds {
                offset: req.offset,
                len: req.len,
            })?;

        self.status |= BM_STATUS_ACTIVE;

        if buf.is_empty() {
            return Ok(0);
        }

        let mut remaining = buf.len();
        let mut buf_off = 0usize;
        let mut prd_ptr = u64::from(self.prd_addr);
        let mut entries_processed = 0usize;
        while remaining > 0 {
            if entries_processed >= Self::MAX_PRD_ENTRIES_PER_DMA {
                return Err(DmaError::PrdMissingEndOfTable);
            }
            entries_processed += 1;

            let prd = PrdEntry::read_from(mem, prd_ptr);
            prd_ptr = prd_ptr.wrapping_add(8);

            let seg_len = prd.effective_len().min(remaining);
            let seg = &mut buf[buf_off..buf_off + seg_len];
            match req.direction {
                DmaDirection::ToMemory => mem.write_physical(u64::from(prd.addr), seg),
                DmaDirection::FromMemory => mem.read_physical(u64::from(prd.addr), seg),
            }
            buf_off += seg_len;
            remaining -= seg_len;

            if prd.end_of_table {
                if remaining != 0 {
                    return Err(DmaError::PrdTooShort);
                }
                return Ok(buf_off);
            }
        }

        Err(DmaError::PrdMissingEndOfTable)
    }

    pub fn finish_success(&mut self) {
        self.status &= !(BM_STATUS_ACTIVE | BM_STATUS_ERROR);
        self.status |= BM_STATUS_IRQ;
    }

    pub fn finish_error(&mut self) {
        self.status &= !BM_STATUS_ACTIVE;
        self.status |= BM_STATUS_ERROR | BM_STATUS_IRQ;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GuestRam;

    fn write_prd(mem: &mut GuestRam, at: u64, addr: u32, count: u16, eot: bool) {
        mem.write_u32(at, addr);
        mem.write_u16(at + 4, count);
        mem.write_u16(at + 6, if eot { 0x8000 } else { 0 });
    }

    #[test]
    fn transfers_across_two_prds() {
        let mut mem = GuestRam::new(0x4000);
        write_prd(&mut mem, 0x1000, 0x2000, 4, false);
        write_prd(&mut mem, 0x1008, 0x3000, 4, true);

        let mut bm = BusMasterChannel::new();
        bm.write_prd_addr(0x1000);
        bm.write(0, BM_CMD_START | BM_CMD_READ);

        let mut staging = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let n = bm
            .execute_dma(&mut mem, &DmaRequest::data_in(6), &mut staging)
            .unwrap();
        assert_eq!(n, 6);

        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        mem.read_physical(0x2000, &mut a);
        mem.read_physical(0x3000, &mut b);
        assert_eq!(a, [1, 2, 3, 4]);
        assert_eq!(&b[..2], &[5, 6]);
        assert_eq!(&b[2..], &[0, 0], "bytes past the request must be untouched");

        bm.finish_success();
        assert_eq!(bm.read(2) & 0x07, BM_STATUS_IRQ);
    }

    #[test]
    fn direction_mismatch_is_reported_before_activation() {
        let mut mem = GuestRam::new(0x1000);
        let mut bm = BusMasterChannel::new();
        // Start without the READ bit: guest memory -> device.
        bm.write(0, BM_CMD_START);

        let mut staging = [0u8; 4];
        let err = bm
            .execute_dma(&mut mem, &DmaRequest::data_in(4), &mut staging)
            .unwrap_err();
        assert_eq!(err, DmaError::DirectionMismatch);
        assert_eq!(bm.read(2) & BM_STATUS_ACTIVE, 0);

        bm.finish_error();
        assert_eq!(bm.read(2) & 0x07, 0x06);
    }

    #[test]
    fn prd_too_short_is_reported() {
        let mut mem = GuestRam::new(0x4000);
        write_prd(&mut mem, 0x1000, 0x2000, 2, true);

        let mut bm = BusMasterChannel::new();
        bm.write_prd_addr(0x1000);
        bm.write(0, BM_CMD_START | BM_CMD_READ);

        let mut staging = [0xA5u8; 8];
        let err = bm
            .execute_dma(&mut mem, &DmaRequest::data_in(8), &mut staging)
            .unwrap_err();
        assert_eq!(err, DmaError::PrdTooShort);
        assert_ne!(bm.read(2) & BM_STATUS_ACTIVE, 0);
    }

    #[test]
    fn request_outside_staging_is_rejected() {
        let mut mem = GuestRam::new(0x1000);
        let mut bm = BusMasterChannel::new();
        bm.write(0, BM_CMD_START | BM_CMD_READ);

        let mut staging = [0u8; 4];
        let err = bm
            .execute_dma(&mut mem, &DmaRequest::data_in(5), &mut staging)
            .unwrap_err();
        assert_eq!(err, DmaError::OutOfBounds { offset: 0, len: 5 });
    }

    #[test]
    fn status_bits_are_write_one_to_clear() {
        let mut bm = BusMasterChannel::new();
        bm.finish_error();
        bm.write(2, BM_STATUS_IRQ);
        assert_eq!(bm.read(2) & 0x07, BM_STATUS_ERROR);
        bm.write(2, BM_STATUS_ERROR);
        assert_eq!(bm.read(2), 0);
    }

    #[test]
    fn prd_pointer_is_dword_aligned() {
        let mut bm = BusMasterChannel::new();
        bm.write_prd_addr(0x1234_5677);
        assert_eq!(bm.read_prd_addr(), 0x1234_5674);
        assert_eq!(bm.read(4), 0x74);
        assert_eq!(bm.read(7), 0x12);
    }
}
