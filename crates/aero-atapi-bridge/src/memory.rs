/// Guest physical memory as seen by the bus-master DMA engine.
pub trait GuestMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);

    fn read_u16(&mut self, paddr: u64) -> u16 {
        let mut buf = [0u8; 2];
        self.read_physical(paddr, &mut buf);
        u16::from_le_bytes(buf)
    }

    fn read_u32(&mut self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn write_u16(&mut self, paddr: u64, val: u16) {
        self.write_physical(paddr, &val.to_le_bytes());
    }

    fn write_u32(&mut self, paddr: u64, val: u32) {
        self.write_physical(paddr, &val.to_le_bytes());
    }
}

/// Flat RAM starting at physical address 0.
///
/// Accesses past the end read as all-ones and drop writes, like an unbacked bus.
#[derive(Debug, Clone)]
pub struct GuestRam {
    data: Vec<u8>,
}

impl GuestRam {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn range(&self, paddr: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(paddr).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }
}

impl GuestMemory for GuestRam {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        match self.range(paddr, buf.len()) {
            Some(r) => buf.copy_from_slice(&self.data[r]),
            None => buf.fill(0xFF),
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        if let Some(r) = self.range(paddr, buf.len()) {
            self.data[r].copy_from_slice(buf);
        }
    }
}
