//! Error types for the three strictly-separated error planes:
//! caller errors, master transaction outcomes, and slave outcomes.
//!
//! Hand-rolled `Debug`/`defmt::Format` enums, no `thiserror`.

/// Synchronous error returned by a request API (`read_regs`/`write_regs`)
/// or by a slave/master constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum CallerError {
    /// The engine is not in `Standby`.
    Busy,
    /// A parameter (register count, buffer length) is out of range.
    BadParam,
    /// The transport's synchronous send failed; the session has moved to
    /// `HwError` and must be drained via `check()` before reuse.
    HwError,
}

/// Returned by [`crate::slave::SlaveSession::new`] when `address == 0`
/// (reserved for broadcast, invalid as a station address).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub struct InvalidAddress;

/// Terminal outcome of a master transaction, surfaced by `check()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum MasterOutcome {
    /// No transaction was in flight; the session was already idle.
    Standby,
    /// The slave's reply was valid and decoded (registers copied for reads).
    Processed,
    /// The slave returned a legal Modbus exception, carrying its code.
    ErrReported(u8),
    /// No reply arrived within `RX_TIMEOUT_MS` of arming the receiver.
    TimedOut,
    /// The reply was malformed: bad address, bad CRC, bad length, or a
    /// reply to a function code other than the one requested.
    Corrupted,
    /// The transport reported a failure from a hardware callback.
    HwError,
}

/// Result of polling the master engine once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum MasterPoll {
    /// The transaction is still in flight; call `check()` again later.
    StillRunning,
    /// The transaction reached a terminal state; the session is back in
    /// `Standby`.
    Done(MasterOutcome),
}

/// Reason a slave's `check()` rejected (rather than dispatched) a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum SlaveFault {
    /// Frame shorter than the minimum ADU length.
    FrameTooShort,
    /// Trailing CRC bytes did not match the computed CRC.
    CrcMismatch,
    /// The request was well-formed but the application (or the dispatch
    /// rules) rejected it; an exception reply carrying this code was sent
    /// (unless the frame was a broadcast, in which case it was dropped).
    Exception(u8),
    /// The transport reported a failure arming the receiver or sending the
    /// reply.
    HwError,
}

/// Result of polling the slave engine once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub enum SlavePoll {
    /// Nothing reached a conclusion this call (receiver armed, or still
    /// waiting/transmitting).
    StillRunning,
    /// A unicast request was valid and a reply was handed to the transport.
    Replied,
    /// A broadcast request was valid and executed; no reply is sent.
    BroadcastHandled,
    /// The frame's address byte was neither ours nor broadcast; ignored.
    Dropped,
    /// The frame (or the dispatch of it) failed; see [`SlaveFault`].
    Rejected(SlaveFault),
}
