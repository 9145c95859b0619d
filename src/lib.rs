//! Modbus RTU master/slave protocol engine: ADU framing, CRC-16/MODBUS,
//! and the two state machines, generic over caller-supplied transport and
//! timing traits so the same engine runs against any UART/DMA driver.
//!
//! No dynamic allocation, no internal threads: forward progress comes
//! from the caller polling `check()` plus asynchronous hardware callbacks
//! that may run from interrupt context.
#![forbid(unsafe_code)]
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod crc;
pub mod error;
mod log;
pub mod master;
pub mod proto;
pub mod slave;
pub mod time_source;
pub mod transport;

pub use error::{CallerError, InvalidAddress, MasterOutcome, MasterPoll, SlaveFault, SlavePoll};
pub use master::{MasterSession, MasterState};
pub use proto::ExceptionCode;
pub use slave::{SlaveCallbacks, SlaveSession, SlaveState};
pub use time_source::TimeSource;
pub use transport::{HwFault, MasterTransport, SlaveTransport};
