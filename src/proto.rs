//! Wire-level vocabulary shared by both engines: the function codes
//! dispatched (read-holding, read-input, write-multiple, diagnostic ping,
//! and the two optional custom-packet codes) and the Modbus exception
//! codes.

/// Read holding registers.
pub const FN_READ_HOLDING_REGS: u8 = 0x03;
/// Read input registers (slave-only; accepted as an alias of read-holding).
pub const FN_READ_INPUT_REGS: u8 = 0x04;
/// Diagnostic sub-function dispatch (only sub-function 0x0000, loopback, is
/// accepted).
pub const FN_DIAGNOSTIC: u8 = 0x08;
/// Write multiple holding registers.
pub const FN_WRITE_MULTIPLE_REGS: u8 = 0x10;
/// Optional custom "read packet" opcode.
pub const FN_READ_PACKET: u8 = 0x64;
/// Optional custom "write packet" opcode.
pub const FN_WRITE_PACKET: u8 = 0x65;

/// High bit set on the function byte of an exception reply.
pub const EXCEPTION_BIT: u8 = 0x80;

/// Modbus exception codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalOpcode = 0x01,
    IllegalAddress = 0x02,
    IllegalValue = 0x03,
    DeviceFault = 0x04,
}

impl ExceptionCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExceptionCode> for u8 {
    fn from(e: ExceptionCode) -> u8 {
        e.code()
    }
}
