#![allow(dead_code)]

use aero_atapi_bridge::regs::{ATA_REG_DATA, ATA_REG_STATUS_COMMAND};
use aero_atapi_bridge::scsi::CommandStatus;
use aero_atapi_bridge::{AtapiBridge, BackendError, BridgeConfig, RequestId, ScsiBackend};

/// Back end that hands out sequential ids and records everything the bridge tells it.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u64,
    pub submitted: Vec<(RequestId, Vec<u8>)>,
    pub completed: Vec<(RequestId, CommandStatus)>,
    pub refuse: Option<BackendError>,
}

impl ScsiBackend for RecordingBackend {
    fn execute(&mut self, cdb: &[u8]) -> Result<RequestId, BackendError> {
        if let Some(err) = self.refuse.clone() {
            return Err(err);
        }
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.submitted.push((id, cdb.to_vec()));
        Ok(id)
    }

    fn complete_request(&mut self, id: RequestId, status: CommandStatus) {
        self.completed.push((id, status));
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn bridge() -> AtapiBridge<RecordingBackend> {
    init_tracing();
    AtapiBridge::new(BridgeConfig::default(), RecordingBackend::default()).unwrap()
}

pub fn packet(opcode: u8) -> [u8; 12] {
    let mut pkt = [0u8; 12];
    pkt[0] = opcode;
    pkt
}

pub fn set_limit(bridge: &mut AtapiBridge<RecordingBackend>, limit: u16) {
    bridge.frontend_mut().tf.set_byte_count(limit);
}

/// Read `len` bytes through the data register, one byte at a time.
pub fn drain(bridge: &mut AtapiBridge<RecordingBackend>, len: usize) -> Vec<u8> {
    (0..len)
        .map(|_| bridge.io_read(ATA_REG_DATA, 1) as u8)
        .collect()
}

/// Issue PACKET and write `pkt` through the data register the way a guest driver would.
pub fn send_packet(bridge: &mut AtapiBridge<RecordingBackend>, pkt: &[u8; 12]) {
    bridge.io_write(ATA_REG_STATUS_COMMAND, 1, 0xA0);
    for pair in pkt.chunks(2) {
        bridge.io_write(ATA_REG_DATA, 2, u32::from(u16::from_le_bytes([pair[0], pair[1]])));
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
