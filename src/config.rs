//! Named constants shared by the master and slave engines.

/// Maximum ADU length: 1 address + 253 PDU bytes + 2 CRC bytes.
pub const MAX_ADU_LEN: usize = 256;

/// Size of the fixed message buffer carried by each session: `MAX_ADU_LEN`
/// plus one guard byte, matching the data model's `message[257]`.
pub const MESSAGE_BUF_LEN: usize = MAX_ADU_LEN + 1;

/// Default master per-request receive timeout, in milliseconds.
pub const RX_TIMEOUT_MS: u32 = 100;

/// Minimum/maximum register count for a read (0x03/0x04) operation.
pub const MIN_READ_REGS: u16 = 1;
pub const MAX_READ_REGS: u16 = 125;

/// Minimum/maximum register count for a write-multiple (0x10) operation.
pub const MIN_WRITE_REGS: u16 = 1;
pub const MAX_WRITE_REGS: u16 = 123;

/// Maximum payload length for a custom read/write packet (0x64/0x65).
pub const MAX_PACKET_LEN: usize = 251;

/// Minimum total ADU length: address + function + 1 body byte + 2 CRC.
pub const MIN_ADU_LEN: usize = 4;
