//! Modbus RTU slave engine: awaits an inbound frame, decodes the opcode,
//! delegates to application callbacks, and encodes the reply. One method
//! per function code, each returning a `Result` that collapses into an
//! exception reply.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::config::{
    MAX_ADU_LEN, MAX_PACKET_LEN, MAX_READ_REGS, MAX_WRITE_REGS, MESSAGE_BUF_LEN, MIN_ADU_LEN,
    MIN_READ_REGS, MIN_WRITE_REGS,
};
use crate::crc;
use crate::error::{InvalidAddress, SlaveFault, SlavePoll};
use crate::proto::{
    ExceptionCode, EXCEPTION_BIT, FN_DIAGNOSTIC, FN_READ_HOLDING_REGS, FN_READ_INPUT_REGS,
    FN_READ_PACKET, FN_WRITE_MULTIPLE_REGS, FN_WRITE_PACKET,
};
use crate::transport::SlaveTransport;

/// Slave engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
#[repr(u8)]
pub enum SlaveState {
    Standby = 0,
    Receiving = 1,
    Received = 2,
    Processing = 3,
    Transmitting = 4,
    HwError = 5,
}

impl SlaveState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Standby,
            1 => Self::Receiving,
            2 => Self::Received,
            3 => Self::Processing,
            4 => Self::Transmitting,
            5 => Self::HwError,
            _ => Self::Standby,
        }
    }
}

/// Application-side register and packet storage consumed by the slave.
/// `get_reg`/`set_reg` are required; `get_packet`/`set_packet` are
/// optional — their default implementations report `ILLEGAL_OPCODE`, which
/// is the expected behavior for an application that has not enabled the
/// custom packet opcodes (0x64/0x65).
pub trait SlaveCallbacks {
    /// Reads the register at `addr`. Returns the Modbus exception code
    /// (nonzero) on failure, e.g. an address outside the application's
    /// mapped range that `last_reg` didn't already reject.
    fn get_reg(&mut self, addr: u16) -> Result<u16, u8>;

    /// Writes `value` to the register at `addr`. Returns the Modbus
    /// exception code (nonzero) on failure.
    fn set_reg(&mut self, addr: u16, value: u16) -> Result<(), u8>;

    /// Fills `buf` with the next outgoing custom packet, returning the
    /// number of bytes written (at most `buf.len()`, which is capped to
    /// [`MAX_PACKET_LEN`] by the caller).
    fn get_packet(&mut self, _buf: &mut [u8]) -> Result<usize, u8> {
        Err(ExceptionCode::IllegalOpcode.code())
    }

    /// Delivers an inbound custom packet's payload.
    fn set_packet(&mut self, _payload: &[u8]) -> Result<(), u8> {
        Err(ExceptionCode::IllegalOpcode.code())
    }
}

/// Modbus RTU slave session, generic over its transport and its
/// application register/packet callbacks.
#[derive(Debug)]
pub struct SlaveSession<T: SlaveTransport, A: SlaveCallbacks> {
    transport: T,
    app: A,
    state: AtomicU8,
    address: u8,
    last_reg: u16,
    message: [u8; MESSAGE_BUF_LEN],
    message_last: usize,
}

impl<T: SlaveTransport, A: SlaveCallbacks> SlaveSession<T, A> {
    /// Builds a session for station `address` (1..=247) exposing registers
    /// `0..=last_reg`.
    ///
    /// The original `ModSlaveInit()` also validates that `pfStandby`/
    /// `pfGetReg`/`pfSetReg`/`pfSendAns` are set; here that precondition is
    /// enforced by the type system instead (see DESIGN.md). The one
    /// runtime-checkable precondition that survives is `address != 0`.
    pub fn new(address: u8, last_reg: u16, transport: T, app: A) -> Result<Self, InvalidAddress> {
        if address == 0 {
            return Err(InvalidAddress);
        }
        Ok(Self {
            transport,
            app,
            state: AtomicU8::new(SlaveState::Standby as u8),
            address,
            last_reg,
            message: [0; MESSAGE_BUF_LEN],
            message_last: 0,
        })
    }

    /// Current engine state (`Acquire`-ordered).
    pub fn state(&self) -> SlaveState {
        SlaveState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: SlaveState) {
        self.state.store(s as u8, Ordering::Release);
    }

    /// Poll entry point.
    pub fn check(&mut self) -> SlavePoll {
        match self.state() {
            SlaveState::Standby => {
                self.set_state(SlaveState::Receiving);
                match self.transport.standby() {
                    Ok(()) => SlavePoll::StillRunning,
                    Err(_) => {
                        self.set_state(SlaveState::HwError);
                        SlavePoll::StillRunning
                    }
                }
            }
            SlaveState::Received => self.process_received(),
            SlaveState::HwError => {
                self.set_state(SlaveState::Standby);
                SlavePoll::Rejected(SlaveFault::HwError)
            }
            SlaveState::Receiving | SlaveState::Processing | SlaveState::Transmitting => {
                SlavePoll::StillRunning
            }
        }
    }

    /// Frame processing, run from `check()`'s `Received`
    /// arm. Mirrors `ModSlaveParseMessage`.
    fn process_received(&mut self) -> SlavePoll {
        self.set_state(SlaveState::Processing);

        let addr_byte = self.message[0];
        let is_broadcast = addr_byte == 0;
        if addr_byte != self.address && !is_broadcast {
            self.set_state(SlaveState::Standby);
            return SlavePoll::Dropped;
        }

        let total_len = self.message_last + 1;
        if total_len < MIN_ADU_LEN {
            crate::log::log_warn!("frame too short: {=usize} bytes", total_len);
            self.set_state(SlaveState::Standby);
            return SlavePoll::Rejected(SlaveFault::FrameTooShort);
        }

        let crc_end = self.message_last - 1;
        let computed = crc::crc16(&self.message[..crc_end], crc::INITIAL_SEED);
        let received = u16::from_le_bytes([self.message[crc_end], self.message[crc_end + 1]]);
        if computed != received {
            crate::log::log_warn!("frame failed CRC check");
            self.set_state(SlaveState::Standby);
            return SlavePoll::Rejected(SlaveFault::CrcMismatch);
        }
        self.message_last -= 2; // now indexes the last PDU byte

        let dispatch_err = self.dispatch();

        if is_broadcast {
            self.set_state(SlaveState::Standby);
            return match dispatch_err {
                None => SlavePoll::BroadcastHandled,
                Some(code) => SlavePoll::Rejected(SlaveFault::Exception(code)),
            };
        }

        match self.send_reply() {
            Ok(()) => match dispatch_err {
                None => SlavePoll::Replied,
                Some(code) => SlavePoll::Rejected(SlaveFault::Exception(code)),
            },
            Err(()) => {
                self.set_state(SlaveState::Standby);
                SlavePoll::Rejected(SlaveFault::HwError)
            }
        }
    }

    /// Dispatches the PDU currently in `self.message[1..=message_last]` by
    /// function code, building the reply (success or exception) in place.
    /// Returns the exception code if one was raised, for reporting
    /// purposes; the reply bytes already reflect it either way.
    fn dispatch(&mut self) -> Option<u8> {
        match self.message[1] {
            FN_READ_HOLDING_REGS | FN_READ_INPUT_REGS => self.handle_read_regs(),
            FN_WRITE_MULTIPLE_REGS => self.handle_write_regs(),
            FN_DIAGNOSTIC => self.handle_diagnostic(),
            FN_READ_PACKET => self.handle_read_packet(),
            FN_WRITE_PACKET => self.handle_write_packet(),
            _ => self.report_exception(ExceptionCode::IllegalOpcode),
        }
    }

    fn report_exception(&mut self, code: ExceptionCode) -> Option<u8> {
        self.message[1] |= EXCEPTION_BIT;
        self.message[2] = code.code();
        self.message_last = 2;
        Some(code.code())
    }

    /// Read holding/input registers (0x03/0x04). Body: 2-byte start, 2-byte
    /// count, exactly 4 bytes total.
    fn handle_read_regs(&mut self) -> Option<u8> {
        if self.message_last != 5 {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        let start = u16::from_be_bytes([self.message[2], self.message[3]]);
        let count = u16::from_be_bytes([self.message[4], self.message[5]]);
        if count < MIN_READ_REGS || count > MAX_READ_REGS {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        let last = match start.checked_add(count - 1) {
            Some(l) if l <= self.last_reg => l,
            _ => return self.report_exception(ExceptionCode::IllegalAddress),
        };

        self.message[2] = (2 * count) as u8;
        let mut idx = 3usize;
        for addr in start..=last {
            match self.app.get_reg(addr) {
                Ok(value) => {
                    let [hi, lo] = value.to_be_bytes();
                    self.message[idx] = hi;
                    self.message[idx + 1] = lo;
                    idx += 2;
                }
                Err(code) => {
                    self.message[1] |= EXCEPTION_BIT;
                    self.message[2] = code;
                    self.message_last = 2;
                    return Some(code);
                }
            }
        }
        self.message_last = idx - 1;
        None
    }

    /// Write multiple registers (0x10). Body: 2-byte start, 2-byte count,
    /// 1-byte byte-count, then `2*count` data bytes.
    fn handle_write_regs(&mut self) -> Option<u8> {
        if self.message_last < 6 {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        let start = u16::from_be_bytes([self.message[2], self.message[3]]);
        let count = u16::from_be_bytes([self.message[4], self.message[5]]);
        let byte_count = self.message[6] as usize;
        let total_len = self.message_last + 1;

        if count < MIN_WRITE_REGS || count > MAX_WRITE_REGS {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        // Explicit total-ADU-length check against the declared register
        // count, rather than a bare byte-count-vs-messageLast comparison
        // that can pass on a truncated frame.
        if byte_count != 2 * count as usize || total_len != 7 + 2 * count as usize {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        let last = match start.checked_add(count - 1) {
            Some(l) if l <= self.last_reg => l,
            _ => return self.report_exception(ExceptionCode::IllegalAddress),
        };

        let mut idx = 7usize;
        for addr in start..=last {
            let value = u16::from_be_bytes([self.message[idx], self.message[idx + 1]]);
            idx += 2;
            if let Err(code) = self.app.set_reg(addr, value) {
                self.message[1] |= EXCEPTION_BIT;
                self.message[2] = code;
                self.message_last = 2;
                return Some(code);
            }
        }

        // Success: echo back the original header (start, count).
        self.message_last = 5;
        None
    }

    /// Diagnostic loopback (0x08), sub-function 0x0000 only.
    fn handle_diagnostic(&mut self) -> Option<u8> {
        if self.message_last != 3 || self.message[2] != 0 || self.message[3] != 0 {
            return self.report_exception(ExceptionCode::IllegalOpcode);
        }
        // Reply is the request unchanged; message_last is already correct.
        None
    }

    /// Custom read-packet (0x64, optional). Empty body.
    fn handle_read_packet(&mut self) -> Option<u8> {
        if self.message_last != 1 {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        let mut scratch = [0u8; MAX_PACKET_LEN];
        match self.app.get_packet(&mut scratch) {
            Ok(len) if len <= MAX_PACKET_LEN => {
                self.message[2] = len as u8;
                self.message[3..3 + len].copy_from_slice(&scratch[..len]);
                self.message_last = 2 + len;
                None
            }
            Ok(_) => self.report_exception(ExceptionCode::DeviceFault),
            Err(code) => {
                self.message[1] |= EXCEPTION_BIT;
                self.message[2] = code;
                self.message_last = 2;
                Some(code)
            }
        }
    }

    /// Custom write-packet (0x65, optional). Body: 1-byte length, then
    /// `length` payload bytes.
    fn handle_write_packet(&mut self) -> Option<u8> {
        if self.message_last < 2 {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        let len = self.message[2] as usize;
        if self.message_last != len + 2 {
            return self.report_exception(ExceptionCode::IllegalValue);
        }
        let payload_end = 3 + len;
        match self.app.set_packet(&self.message[3..payload_end]) {
            Ok(()) => {
                self.message_last = 2;
                None
            }
            Err(code) => {
                self.message[1] |= EXCEPTION_BIT;
                self.message[2] = code;
                self.message_last = 2;
                Some(code)
            }
        }
    }

    /// Appends the CRC and hands the reply to the transport. Mirrors
    /// `ModSlaveSendAnswer`.
    fn send_reply(&mut self) -> Result<(), ()> {
        if self.message_last + 1 + 2 > MAX_ADU_LEN {
            return Err(());
        }
        let crc = crc::crc16(&self.message[..=self.message_last], crc::INITIAL_SEED);
        let [lo, hi] = crc::to_le_bytes(crc);
        self.message[self.message_last + 1] = lo;
        self.message[self.message_last + 2] = hi;
        self.message_last += 2;

        self.set_state(SlaveState::Transmitting);
        self.transport
            .send_answer(&self.message[..=self.message_last])
            .map_err(|_| ())
    }

    /// Exposes the internal message buffer for a transport that DMAs an
    /// inbound frame directly into engine-owned memory; see
    /// [`crate::master::MasterSession::rx_buffer`] for the same pattern on
    /// the master side.
    pub fn rx_buffer(&mut self) -> &mut [u8; MESSAGE_BUF_LEN] {
        &mut self.message
    }

    fn complete_rx(&mut self, len: usize, bytes: Option<&[u8]>) {
        if self.state() != SlaveState::Receiving {
            return;
        }
        if len < 1 || len > MAX_ADU_LEN {
            self.set_state(SlaveState::Standby);
            return;
        }
        if let Some(b) = bytes {
            self.message[..len].copy_from_slice(b);
        }
        self.message_last = len - 1;
        self.set_state(SlaveState::Received);
    }

    /// Hardware callback: a full request frame was received into `bytes`.
    /// May run in interrupt context.
    pub fn on_rx_done(&mut self, bytes: &[u8]) {
        self.complete_rx(bytes.len(), Some(bytes));
    }

    /// Hardware callback: a full request frame was received directly into
    /// the buffer returned by [`Self::rx_buffer`]. May run in interrupt
    /// context.
    pub fn on_rx_done_in_place(&mut self, len: usize) {
        self.complete_rx(len, None);
    }

    /// Hardware callback: the receiver reported an error. May run in
    /// interrupt context.
    pub fn on_rx_error(&mut self) {
        if self.state() == SlaveState::Receiving {
            self.set_state(SlaveState::Standby);
        }
    }

    /// Hardware callback: the reply finished transmitting. May run in
    /// interrupt context.
    pub fn on_tx_done(&mut self) {
        if self.state() == SlaveState::Transmitting {
            self.set_state(SlaveState::Standby);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const N_REGS: usize = 16;

    #[derive(Debug)]
    struct TestApp {
        regs: [u16; N_REGS],
        deny_addr: Option<u16>,
    }

    impl TestApp {
        fn new() -> Self {
            Self {
                regs: core::array::from_fn(|i| i as u16 * 10),
                deny_addr: None,
            }
        }
    }

    impl SlaveCallbacks for TestApp {
        fn get_reg(&mut self, addr: u16) -> Result<u16, u8> {
            if Some(addr) == self.deny_addr {
                return Err(ExceptionCode::DeviceFault.code());
            }
            self.regs
                .get(addr as usize)
                .copied()
                .ok_or(ExceptionCode::IllegalAddress.code())
        }

        fn set_reg(&mut self, addr: u16, value: u16) -> Result<(), u8> {
            if Some(addr) == self.deny_addr {
                return Err(ExceptionCode::DeviceFault.code());
            }
            match self.regs.get_mut(addr as usize) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(ExceptionCode::IllegalAddress.code()),
            }
        }
    }

    #[derive(Default, Debug)]
    struct RecordingTransport {
        sent: Vec<u8>,
        standby_calls: usize,
    }

    impl SlaveTransport for RecordingTransport {
        fn standby(&mut self) -> Result<(), crate::transport::HwFault> {
            self.standby_calls += 1;
            Ok(())
        }

        fn send_answer(&mut self, frame: &[u8]) -> Result<(), crate::transport::HwFault> {
            self.sent = frame.to_vec();
            Ok(())
        }
    }

    fn framed(pdu: &[u8]) -> Vec<u8> {
        let crc = crc::crc16(pdu, crc::INITIAL_SEED);
        let [lo, hi] = crc::to_le_bytes(crc);
        let mut out = pdu.to_vec();
        out.push(lo);
        out.push(hi);
        out
    }

    fn session() -> SlaveSession<RecordingTransport, TestApp> {
        SlaveSession::new(0x11, (N_REGS - 1) as u16, RecordingTransport::default(), TestApp::new())
            .unwrap()
    }

    fn arm_and_deliver(s: &mut SlaveSession<RecordingTransport, TestApp>, frame: &[u8]) {
        assert_eq!(s.check(), SlavePoll::StillRunning); // Standby -> Receiving
        s.on_rx_done(frame);
    }

    #[test]
    fn rejects_zero_address() {
        assert_eq!(
            SlaveSession::new(0, 10, RecordingTransport::default(), TestApp::new()).unwrap_err(),
            InvalidAddress
        );
    }

    #[test]
    fn read_holding_regs_success() {
        let mut s = session();
        let frame = framed(&[0x11, FN_READ_HOLDING_REGS, 0x00, 0x02, 0x00, 0x03]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(s.check(), SlavePoll::Replied);
        assert_eq!(s.transport.sent[0], 0x11);
        assert_eq!(s.transport.sent[1], FN_READ_HOLDING_REGS);
        assert_eq!(s.transport.sent[2], 6); // 3 regs * 2 bytes
        assert_eq!(u16::from_be_bytes([s.transport.sent[3], s.transport.sent[4]]), 20);
        assert_eq!(u16::from_be_bytes([s.transport.sent[5], s.transport.sent[6]]), 30);
        assert_eq!(u16::from_be_bytes([s.transport.sent[7], s.transport.sent[8]]), 40);
    }

    #[test]
    fn read_regs_address_out_of_range_is_exception() {
        let mut s = session();
        let frame = framed(&[0x11, FN_READ_HOLDING_REGS, 0x00, 0x0F, 0x00, 0x02]);
        arm_and_deliver(&mut s, &frame);
        let poll = s.check();
        assert_eq!(
            poll,
            SlavePoll::Rejected(SlaveFault::Exception(ExceptionCode::IllegalAddress.code()))
        );
        assert_eq!(s.transport.sent[1], FN_READ_HOLDING_REGS | EXCEPTION_BIT);
        assert_eq!(s.transport.sent[2], ExceptionCode::IllegalAddress.code());
    }

    #[test]
    fn read_regs_count_out_of_range_is_exception() {
        let mut s = session();
        let frame = framed(&[0x11, FN_READ_HOLDING_REGS, 0x00, 0x00, 0x00, 0x00]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(
            s.check(),
            SlavePoll::Rejected(SlaveFault::Exception(ExceptionCode::IllegalValue.code()))
        );
    }

    #[test]
    fn write_multiple_regs_success() {
        let mut s = session();
        let frame = framed(&[
            0x11,
            FN_WRITE_MULTIPLE_REGS,
            0x00,
            0x01,
            0x00,
            0x02,
            0x04,
            0x00,
            0x64,
            0x00,
            0xC8,
        ]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(s.check(), SlavePoll::Replied);
        assert_eq!(s.transport.sent[2], 0x00);
        assert_eq!(s.transport.sent[3], 0x01);
        assert_eq!(s.transport.sent[4], 0x00);
        assert_eq!(s.transport.sent[5], 0x02);
        assert_eq!(s.app.regs[1], 0x0064);
        assert_eq!(s.app.regs[2], 0x00C8);
    }

    #[test]
    fn write_multiple_regs_bad_byte_count_is_rejected() {
        let mut s = session();
        // byte_count claims 4 but only 2 bytes of data follow: this is
        // exactly the ambiguity in the original's
        // `messageLast - 6` check.
        let frame = framed(&[
            0x11,
            FN_WRITE_MULTIPLE_REGS,
            0x00,
            0x01,
            0x00,
            0x02,
            0x04,
            0x00,
            0x64,
        ]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(
            s.check(),
            SlavePoll::Rejected(SlaveFault::Exception(ExceptionCode::IllegalValue.code()))
        );
    }

    #[test]
    fn diagnostic_echo() {
        let mut s = session();
        let frame = framed(&[0x11, FN_DIAGNOSTIC, 0x00, 0x00]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(s.check(), SlavePoll::Replied);
        assert_eq!(&s.transport.sent[..4], &[0x11, FN_DIAGNOSTIC, 0x00, 0x00]);
    }

    #[test]
    fn unknown_function_code_is_illegal_opcode() {
        let mut s = session();
        let frame = framed(&[0x11, 0x77, 0x00, 0x00]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(
            s.check(),
            SlavePoll::Rejected(SlaveFault::Exception(ExceptionCode::IllegalOpcode.code()))
        );
    }

    #[test]
    fn custom_packet_defaults_to_illegal_opcode() {
        let mut s = session();
        let frame = framed(&[0x11, FN_READ_PACKET]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(
            s.check(),
            SlavePoll::Rejected(SlaveFault::Exception(ExceptionCode::IllegalOpcode.code()))
        );
    }

    #[test]
    fn broadcast_executes_silently() {
        let mut s = session();
        let frame = framed(&[
            0x00,
            FN_WRITE_MULTIPLE_REGS,
            0x00,
            0x00,
            0x00,
            0x01,
            0x02,
            0x00,
            0x2A,
        ]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(s.check(), SlavePoll::BroadcastHandled);
        assert!(s.transport.sent.is_empty());
        assert_eq!(s.app.regs[0], 0x2A);
    }

    #[test]
    fn wrong_address_is_dropped() {
        let mut s = session();
        let frame = framed(&[0x12, FN_READ_HOLDING_REGS, 0x00, 0x00, 0x00, 0x01]);
        arm_and_deliver(&mut s, &frame);
        assert_eq!(s.check(), SlavePoll::Dropped);
        assert!(s.transport.sent.is_empty());
        assert_eq!(s.state(), SlaveState::Standby);
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let mut s = session();
        let mut frame = framed(&[0x11, FN_READ_HOLDING_REGS, 0x00, 0x00, 0x00, 0x01]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        arm_and_deliver(&mut s, &frame);
        assert_eq!(
            s.check(),
            SlavePoll::Rejected(SlaveFault::CrcMismatch)
        );
    }

    #[test]
    fn frame_too_short_is_rejected() {
        let mut s = session();
        arm_and_deliver(&mut s, &[0x11, 0x00, 0x00]);
        assert_eq!(
            s.check(),
            SlavePoll::Rejected(SlaveFault::FrameTooShort)
        );
    }

    #[test]
    fn hw_error_on_standby_is_reported() {
        struct FailingTransport;
        impl SlaveTransport for FailingTransport {
            fn standby(&mut self) -> Result<(), crate::transport::HwFault> {
                Err(crate::transport::HwFault)
            }
            fn send_answer(&mut self, _frame: &[u8]) -> Result<(), crate::transport::HwFault> {
                Ok(())
            }
        }
        let mut s = SlaveSession::new(0x11, 10, FailingTransport, TestApp::new()).unwrap();
        assert_eq!(s.check(), SlavePoll::StillRunning); // Standby -> HwError
        assert_eq!(s.check(), SlavePoll::Rejected(SlaveFault::HwError));
        assert_eq!(s.state(), SlaveState::Standby);
    }

    #[test]
    fn stale_rx_callback_after_drop_is_ignored() {
        let mut s = session();
        let frame = framed(&[0x12, FN_READ_HOLDING_REGS, 0x00, 0x00, 0x00, 0x01]);
        arm_and_deliver(&mut s, &frame);
        s.check(); // Dropped, back to Standby
        // A stale ISR callback arriving after the engine already moved on
        // must not resurrect a frame.
        s.on_rx_done(&frame);
        assert_eq!(s.state(), SlaveState::Standby);
    }
}
