//! Driver interface consumed by the engines.
//!
//! Each session is generic over its transport type: binding a concrete
//! `impl MasterTransport`/`impl SlaveTransport` at construction gives every
//! session instance its own statically-dispatched driver with no shared
//! global, so multiple engine instances can coexist without a routing
//! table.
//!
//! Implementations are expected to be non-blocking: they initiate a DMA
//! transfer or hand off to a UART peripheral and return immediately: the
//! corresponding `on_tx_done`/`on_rx_done`/`on_rx_error` callback on the
//! session reports completion, potentially from interrupt context.

/// A driver-reported hardware failure (DMA setup failed, peripheral busy
/// past recovery, etc). Carries no payload: the engine only needs to know
/// whether the call succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), derive(defmt::Format))]
pub struct HwFault;

/// Transport binding consumed by [`crate::master::MasterSession`].
pub trait MasterTransport {
    /// Start transmitting `frame`. Must not block; completion is reported
    /// later via `on_tx_done`.
    fn send(&mut self, frame: &[u8]) -> Result<(), HwFault>;

    /// Arm the receiver for the reply. Must not block; completion is
    /// reported later via `on_rx_done`/`on_rx_done_in_place`/`on_rx_error`.
    fn start_receive(&mut self) -> Result<(), HwFault>;
}

/// Transport binding consumed by [`crate::slave::SlaveSession`].
pub trait SlaveTransport {
    /// Arm the receiver for the next incoming request. Must not block.
    fn standby(&mut self) -> Result<(), HwFault>;

    /// Start transmitting `frame` as the reply to the request just
    /// processed. Must not block; completion is reported via `on_tx_done`.
    fn send_answer(&mut self, frame: &[u8]) -> Result<(), HwFault>;
}
