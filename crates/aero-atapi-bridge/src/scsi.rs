//! SCSI/MMC command vocabulary seen by the bridge.
//!
//! The bridge never builds response payloads itself. It only needs to know which commands
//! carry a data phase, and for a handful of informational commands, how long the response
//! really is.

pub const TEST_UNIT_READY: u8 = 0x00;
pub const REQUEST_SENSE: u8 = 0x03;
pub const INQUIRY: u8 = 0x12;
pub const ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;
pub const READ_CAPACITY_10: u8 = 0x25;
pub const READ_10: u8 = 0x28;
pub const READ_TOC: u8 = 0x43;
pub const GET_CONFIGURATION: u8 = 0x46;
pub const GET_EVENT_STATUS_NOTIFICATION: u8 = 0x4A;
pub const READ_DISC_INFORMATION: u8 = 0x51;
pub const READ_TRACK_INFORMATION: u8 = 0x52;
pub const MODE_SENSE_10: u8 = 0x5A;

pub const SENSE_NOT_READY: u8 = 0x02;
pub const SENSE_ILLEGAL_REQUEST: u8 = 0x05;
pub const SENSE_ABORTED_COMMAND: u8 = 0x0B;

pub const ASC_INVALID_COMMAND: u8 = 0x20;
pub const ASC_LBA_OUT_OF_RANGE: u8 = 0x21;
pub const ASC_INVALID_FIELD_IN_CDB: u8 = 0x24;
pub const ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;

/// Longest command descriptor block accepted from the front end.
pub const MAX_CDB_LEN: usize = 16;

/// SCSI status byte values.
pub const STATUS_GOOD: u8 = 0x00;
pub const STATUS_CHECK_CONDITION: u8 = 0x02;

/// Sense key with additional sense code and qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub const fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }

    pub const fn illegal_request(asc: u8) -> Self {
        Self::new(SENSE_ILLEGAL_REQUEST, asc, 0)
    }
}

/// Completion status exchanged with the back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Good,
    CheckCondition(Sense),
}

impl CommandStatus {
    pub fn is_good(&self) -> bool {
        matches!(self, CommandStatus::Good)
    }

    /// SCSI status byte.
    pub fn status_byte(&self) -> u8 {
        match self {
            CommandStatus::Good => STATUS_GOOD,
            CommandStatus::CheckCondition(_) => STATUS_CHECK_CONDITION,
        }
    }
}

/// How the bridge learns the true response length of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    /// No data phase; the command completes straight away.
    NoData,
    /// Command-specific constant. Overrides whatever the caller or back end reported.
    Fixed(usize),
    /// Whatever the back end assembled in its scatter buffer.
    Payload,
    /// Back-end payload, clipped to the caller's length hint when one was given.
    Hinted,
}

/// Classify a command by its opcode.
pub fn response_length(opcode: u8) -> ResponseLength {
    match opcode {
        TEST_UNIT_READY | ALLOW_MEDIUM_REMOVAL => ResponseLength::NoData,
        INQUIRY => ResponseLength::Fixed(36),
        MODE_SENSE_10 => ResponseLength::Fixed(30),
        READ_TOC => ResponseLength::Fixed(12),
        READ_CAPACITY_10 => ResponseLength::Fixed(8),
        GET_CONFIGURATION => ResponseLength::Fixed(40),
        GET_EVENT_STATUS_NOTIFICATION => ResponseLength::Fixed(8),
        READ_DISC_INFORMATION => ResponseLength::Fixed(34),
        READ_10 => ResponseLength::Payload,
        _ => ResponseLength::Hinted,
    }
}

pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        TEST_UNIT_READY => "TEST UNIT READY",
        REQUEST_SENSE => "REQUEST SENSE",
        INQUIRY => "INQUIRY",
        ALLOW_MEDIUM_REMOVAL => "PREVENT ALLOW MEDIUM REMOVAL",
        READ_CAPACITY_10 => "READ CAPACITY(10)",
        READ_10 => "READ(10)",
        READ_TOC => "READ TOC",
        GET_CONFIGURATION => "GET CONFIGURATION",
        GET_EVENT_STATUS_NOTIFICATION => "GET EVENT STATUS NOTIFICATION",
        READ_DISC_INFORMATION => "READ DISC INFORMATION",
        READ_TRACK_INFORMATION => "READ TRACK INFORMATION",
        MODE_SENSE_10 => "MODE SENSE(10)",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn informational_commands_have_fixed_lengths() {
        let expected = [
            (INQUIRY, 36),
            (MODE_SENSE_10, 30),
            (READ_TOC, 12),
            (READ_CAPACITY_10, 8),
            (GET_CONFIGURATION, 40),
            (GET_EVENT_STATUS_NOTIFICATION, 8),
            (READ_DISC_INFORMATION, 34),
        ];
        for (opcode, len) in expected {
            assert_eq!(
                response_length(opcode),
                ResponseLength::Fixed(len),
                "{}",
                opcode_name(opcode)
            );
        }
    }

    #[test]
    fn no_data_commands() {
        assert_eq!(response_length(TEST_UNIT_READY), ResponseLength::NoData);
        assert_eq!(response_length(ALLOW_MEDIUM_REMOVAL), ResponseLength::NoData);
        assert_eq!(response_length(READ_10), ResponseLength::Payload);
        assert_eq!(response_length(REQUEST_SENSE), ResponseLength::Hinted);
    }

    #[test]
    fn status_bytes() {
        assert_eq!(CommandStatus::Good.status_byte(), STATUS_GOOD);
        let cc = CommandStatus::CheckCondition(Sense::illegal_request(ASC_INVALID_COMMAND));
        assert_eq!(cc.status_byte(), STATUS_CHECK_CONDITION);
        assert!(!cc.is_good());
    }
}
