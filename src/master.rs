//! Modbus RTU master engine: encodes a request, drives the
//! transmit -> wait -> parse-reply cycle, and reports the outcome on the
//! next poll.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::config::{
    MAX_ADU_LEN, MAX_READ_REGS, MAX_WRITE_REGS, MESSAGE_BUF_LEN, MIN_READ_REGS, MIN_WRITE_REGS,
    RX_TIMEOUT_MS,
};
use crate::crc;
use crate::error::{CallerError, MasterOutcome, MasterPoll};
use crate::proto::{EXCEPTION_BIT, FN_READ_HOLDING_REGS, FN_WRITE_MULTIPLE_REGS};
use crate::transport::MasterTransport;
use crate::time_source::TimeSource;

/// Master engine state. `Standby` is the initial and only
/// caller-visible idle state; every other state is internal bookkeeping
/// between a request and the `check()` call that retires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
#[repr(u8)]
pub enum MasterState {
    Standby = 0,
    Transmitting = 1,
    WaitingAnswer = 2,
    Received = 3,
    Processing = 4,
    Corrupted = 5,
    HwError = 6,
}

impl MasterState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Standby,
            1 => Self::Transmitting,
            2 => Self::WaitingAnswer,
            3 => Self::Received,
            4 => Self::Processing,
            5 => Self::Corrupted,
            6 => Self::HwError,
            // Any unrecognized encoding is treated as a failsafe return to
            // standby.
            _ => Self::Standby,
        }
    }
}

/// Modbus RTU master session, generic over its transport and time source.
///
/// One instance drives exactly one in-flight transaction to exactly one
/// slave at a time: no multi-master arbitration, no fairness
/// between concurrent transactions on one instance). Multiple independent
/// instances, each with its own transport binding, may coexist.
pub struct MasterSession<T: MasterTransport, C: TimeSource> {
    transport: T,
    clock: C,
    state: AtomicU8,
    slave_addr: u8,
    op_code: u8,
    first_reg: u16,
    num_regs: u16,
    rx_start_time: u32,
    message: [u8; MESSAGE_BUF_LEN],
    message_last: usize,
}

impl<T: MasterTransport, C: TimeSource> MasterSession<T, C> {
    /// Builds a session bound to `transport` and `clock`.
    ///
    /// The original `ModMasterInit()` validates that `send_fn`/`recv_fn`
    /// are set, returning `BadConfig` otherwise; here that precondition is
    /// enforced by the type system (a `MasterTransport` impl must exist to
    /// name the type at all), so construction is infallible. See
    /// DESIGN.md for this Open Question decision.
    pub fn new(transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            state: AtomicU8::new(MasterState::Standby as u8),
            slave_addr: 0,
            op_code: 0,
            first_reg: 0,
            num_regs: 0,
            rx_start_time: 0,
            message: [0; MESSAGE_BUF_LEN],
            message_last: 0,
        }
    }

    /// Current engine state. Uses `Acquire` ordering: this is the single
    /// synchronization point shared with the hardware-callback context
    /// synchronization point shared with the hardware-callback context.
    pub fn state(&self) -> MasterState {
        MasterState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: MasterState) {
        self.state.store(s as u8, Ordering::Release);
    }

    /// Begins a "read holding registers" (0x03) transaction.
    ///
    /// Preconditions: the session is `Standby` and `1 <= num <= 125`. On
    /// success the request has already been handed to the transport; the
    /// result is observed later through `check()`.
    pub fn read_regs(&mut self, slave: u8, first: u16, num: u16) -> Result<(), CallerError> {
        if self.state() != MasterState::Standby {
            return Err(CallerError::Busy);
        }
        if num < MIN_READ_REGS || num > MAX_READ_REGS {
            return Err(CallerError::BadParam);
        }

        self.slave_addr = slave;
        self.op_code = FN_READ_HOLDING_REGS;
        self.first_reg = first;
        self.num_regs = num;

        self.message[0] = slave;
        self.message[1] = FN_READ_HOLDING_REGS;
        self.message[2..4].copy_from_slice(&first.to_be_bytes());
        self.message[4..6].copy_from_slice(&num.to_be_bytes());
        self.message_last = 5;

        self.transmit()
    }

    /// Begins a "write multiple registers" (0x10) transaction.
    ///
    /// Preconditions: the session is `Standby`, `1 <= num <= 123`, and
    /// `values` carries at least `num` entries.
    pub fn write_regs(
        &mut self,
        slave: u8,
        first: u16,
        num: u16,
        values: &[u16],
    ) -> Result<(), CallerError> {
        if self.state() != MasterState::Standby {
            return Err(CallerError::Busy);
        }
        if num < MIN_WRITE_REGS || num > MAX_WRITE_REGS || values.len() < num as usize {
            return Err(CallerError::BadParam);
        }

        self.slave_addr = slave;
        self.op_code = FN_WRITE_MULTIPLE_REGS;
        self.first_reg = first;
        self.num_regs = num;

        self.message[0] = slave;
        self.message[1] = FN_WRITE_MULTIPLE_REGS;
        self.message[2..4].copy_from_slice(&first.to_be_bytes());
        self.message[4..6].copy_from_slice(&num.to_be_bytes());
        self.message[6] = (num * 2) as u8;
        let mut idx = 7usize;
        for &v in &values[..num as usize] {
            let [hi, lo] = v.to_be_bytes();
            self.message[idx] = hi;
            self.message[idx + 1] = lo;
            idx += 2;
        }
        self.message_last = idx - 1;

        self.transmit()
    }

    /// Appends the CRC, transitions to `Transmitting`, and hands the frame
    /// to the transport. Mirrors `ModMasterSend()`.
    fn transmit(&mut self) -> Result<(), CallerError> {
        // Guard against a PDU too long to leave room for the CRC, as the
        // original bounds check does (defensive: unreachable for the two
        // supported operations given their register-count limits).
        if self.message_last + 1 + 2 > MAX_ADU_LEN {
            return Err(CallerError::BadParam);
        }

        let crc = crc::crc16(&self.message[..=self.message_last], crc::INITIAL_SEED);
        let [lo, hi] = crc::to_le_bytes(crc);
        self.message[self.message_last + 1] = lo;
        self.message[self.message_last + 2] = hi;
        self.message_last += 2;

        self.set_state(MasterState::Transmitting);
        match self.transport.send(&self.message[..=self.message_last]) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.set_state(MasterState::HwError);
                Err(CallerError::HwError)
            }
        }
    }

    /// Poll entry point. `reg_buffer`, if supplied, receives
    /// decoded register values when the pending operation is a read and
    /// the reply parses successfully; it is ignored otherwise. The caller
    /// must pass the same buffer (or a buffer at least as long) on every
    /// poll of a read transaction — the engine never stores it between
    /// calls (see DESIGN.md).
    pub fn check(&mut self, reg_buffer: Option<&mut [u16]>) -> MasterPoll {
        match self.state() {
            MasterState::Standby => MasterPoll::Done(MasterOutcome::Standby),
            MasterState::Transmitting => MasterPoll::StillRunning,
            MasterState::WaitingAnswer => {
                let elapsed = self.clock.now_ms().wrapping_sub(self.rx_start_time);
                if elapsed > RX_TIMEOUT_MS {
                    crate::log::log_warn!("transaction to slave {=u8} timed out", self.slave_addr);
                    self.set_state(MasterState::Standby);
                    MasterPoll::Done(MasterOutcome::TimedOut)
                } else {
                    MasterPoll::StillRunning
                }
            }
            MasterState::Received => {
                let outcome = self.parse_reply(reg_buffer);
                self.set_state(MasterState::Standby);
                MasterPoll::Done(outcome)
            }
            MasterState::Corrupted => {
                self.set_state(MasterState::Standby);
                MasterPoll::Done(MasterOutcome::Corrupted)
            }
            MasterState::HwError => {
                self.set_state(MasterState::Standby);
                MasterPoll::Done(MasterOutcome::HwError)
            }
            MasterState::Processing => {
                // Only observable if a previous parse panicked mid-way,
                // which cannot happen; failsafe back to standby.
                self.set_state(MasterState::Standby);
                MasterPoll::Done(MasterOutcome::Corrupted)
            }
        }
    }

    /// Reply parsing. Runs entirely inside `check()`'s `Received`
    /// arm; `self.state` is `Processing` for the duration, matching the
    /// original's `ModMasterParseAnswer`/`ModMasterProcessAnswer` split.
    fn parse_reply(&mut self, reg_buffer: Option<&mut [u16]>) -> MasterOutcome {
        self.set_state(MasterState::Processing);

        if self.message[0] != self.slave_addr {
            crate::log::log_warn!("reply from unexpected address {=u8}", self.message[0]);
            return MasterOutcome::Corrupted;
        }
        if self.message_last + 1 < 4 {
            return MasterOutcome::Corrupted;
        }

        let crc_end = self.message_last - 1; // index of crc-lo
        let computed = crc::crc16(&self.message[..crc_end], crc::INITIAL_SEED);
        let received = u16::from_le_bytes([self.message[crc_end], self.message[crc_end + 1]]);
        if computed != received {
            crate::log::log_warn!("reply failed CRC check");
            return MasterOutcome::Corrupted;
        }
        // Strip the CRC: message_last now indexes the last PDU byte.
        self.message_last -= 2;

        let function = self.message[1];
        if (function & !EXCEPTION_BIT) != self.op_code {
            return MasterOutcome::Corrupted;
        }

        if function & EXCEPTION_BIT != 0 {
            return if self.message_last >= 2 {
                MasterOutcome::ErrReported(self.message[2])
            } else {
                MasterOutcome::Corrupted
            };
        }

        match function {
            FN_READ_HOLDING_REGS => self.decode_read_reply(reg_buffer),
            FN_WRITE_MULTIPLE_REGS => self.decode_write_reply(),
            _ => MasterOutcome::Corrupted,
        }
    }

    fn decode_read_reply(&self, reg_buffer: Option<&mut [u16]>) -> MasterOutcome {
        let byte_count = self.message[2] as usize;
        let expected_bytes = 2 * self.num_regs as usize;
        // Explicit total-ADU-length comparison rather than a bare index
        // check against messageLast, which is off by one against a byte
        // count that already excludes the header.
        let total_len = self.message_last + 1;
        if byte_count != expected_bytes || total_len < 3 + expected_bytes {
            return MasterOutcome::Corrupted;
        }

        if let Some(buf) = reg_buffer {
            if buf.len() < self.num_regs as usize {
                return MasterOutcome::Corrupted;
            }
            for i in 0..self.num_regs as usize {
                buf[i] = u16::from_be_bytes([self.message[3 + 2 * i], self.message[4 + 2 * i]]);
            }
        }
        MasterOutcome::Processed
    }

    fn decode_write_reply(&self) -> MasterOutcome {
        if self.message_last < 5 {
            return MasterOutcome::Corrupted;
        }
        let echoed_first = u16::from_be_bytes([self.message[2], self.message[3]]);
        let echoed_num = u16::from_be_bytes([self.message[4], self.message[5]]);
        if echoed_first == self.first_reg && echoed_num == self.num_regs {
            MasterOutcome::Processed
        } else {
            MasterOutcome::Corrupted
        }
    }

    /// Exposes the internal message buffer for a transport that DMAs the
    /// reply directly into engine-owned memory, avoiding the copy
    /// `on_rx_done` would otherwise perform. An explicit entry point rather
    /// than a pointer-identity check, since the latter needs `unsafe`
    /// pointer comparison this crate forbids.
    pub fn rx_buffer(&mut self) -> &mut [u8; MESSAGE_BUF_LEN] {
        &mut self.message
    }

    fn complete_rx(&mut self, len: usize, bytes: Option<&[u8]>) {
        if self.state() != MasterState::WaitingAnswer {
            return;
        }
        if len < 1 || len > MAX_ADU_LEN {
            self.set_state(MasterState::Corrupted);
            return;
        }
        if let Some(b) = bytes {
            self.message[..len].copy_from_slice(b);
        }
        self.message_last = len - 1;
        self.set_state(MasterState::Received);
    }

    /// Hardware callback: the reply was received into `bytes`, copying it
    /// into the session's buffer. May run in interrupt context.
    pub fn on_rx_done(&mut self, bytes: &[u8]) {
        self.complete_rx(bytes.len(), Some(bytes));
    }

    /// Hardware callback: the reply was received directly into the buffer
    /// returned by [`Self::rx_buffer`]; `len` bytes are valid. May run in
    /// interrupt context.
    pub fn on_rx_done_in_place(&mut self, len: usize) {
        self.complete_rx(len, None);
    }

    /// Hardware callback: the receiver reported an error. May run in
    /// interrupt context.
    pub fn on_rx_error(&mut self) {
        if self.state() == MasterState::WaitingAnswer {
            self.set_state(MasterState::Corrupted);
        }
    }

    /// Hardware callback: the request finished transmitting; arms the
    /// receiver and records the timeout baseline. May run in interrupt
    /// context.
    pub fn on_tx_done(&mut self) {
        if self.state() != MasterState::Transmitting {
            return;
        }
        self.set_state(MasterState::WaitingAnswer);
        let result = self.transport.start_receive();
        self.rx_start_time = self.clock.now_ms();
        if result.is_err() {
            self.set_state(MasterState::HwError);
        }
    }
}
