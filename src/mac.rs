//! Narrow interface to the external LoRaWAN MAC engine.
//!
//! The MAC engine owns frame encryption, channel plans and regional
//! parameters. This core only issues requests into it and consumes the
//! asynchronous confirm/indication callbacks it produces, so the whole
//! surface is three request operations and four callback payload types.

use crate::{AppEui, AppKey, DevEui, DeviceClass};

/// Outcome status carried by every confirm/indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum EventStatus {
    Ok,
    Error,
    TxTimeout,
    RxTimeout,
    RxError,
    JoinFail,
    DownlinkTooMany,
    AddressFail,
    MicFail,
}

/// Frame class of an MCPS request, confirm or indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum McpsKind {
    Unconfirmed,
    Confirmed,
    Proprietary,
    Multicast,
}

/// Receive window a downlink arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RxSlot {
    Rx1,
    Rx2,
}

/// MLME operation a confirm refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MlmeKind {
    Join,
    LinkCheck,
    DeviceTime,
}

/// Network-initiated MLME indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MlmeIndication {
    /// The network asks for an uplink as soon as possible.
    ScheduleUplink,
}

/// Why the MAC engine declined a request at the instant of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MacError {
    /// Radio or MAC busy with a prior operation.
    Busy,
    /// Request parameters rejected.
    Rejected,
    /// No session; data requests need a completed join.
    NotJoined,
}

/// Payload would not fit the current data rate and channel constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PayloadTooLarge;

/// One MCPS (data) request. The buffer is only borrowed for the duration of
/// the call; the MAC engine copies what it needs before returning.
pub struct McpsRequest<'a> {
    pub kind: McpsKind,
    pub fport: u8,
    pub data: &'a [u8],
    pub datarate: u8,
    /// Confirmed-send retry bound, enforced by the MAC layer. Ignored for
    /// unconfirmed frames.
    pub nb_trials: u8,
}

/// OTAA join request.
pub struct JoinRequest {
    pub dev_eui: DevEui,
    pub app_eui: AppEui,
    pub app_key: AppKey,
    pub nb_trials: u8,
}

/// MCPS-Confirm callback payload.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct McpsConfirm {
    pub status: EventStatus,
    pub kind: McpsKind,
    pub ack_received: bool,
    pub trials: u8,
    pub uplink_counter: u32,
}

/// MCPS-Indication callback payload: a downlink arrived.
#[derive(Debug, Clone, Copy)]
pub struct McpsIndication<'a> {
    pub status: EventStatus,
    pub kind: McpsKind,
    pub fport: u8,
    pub data: &'a [u8],
    pub rx_slot: RxSlot,
    /// The network has more data queued and wants an uplink to flush it.
    pub frame_pending: bool,
    pub rssi: i16,
    pub snr: i8,
}

/// MLME-Confirm callback payload.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct MlmeConfirm {
    pub kind: MlmeKind,
    pub status: EventStatus,
}

/// Request surface of the external MAC engine.
pub trait Mac {
    /// Whether a payload of `len` bytes fits the active data rate once
    /// pending MAC commands are accounted for.
    fn query_tx_possible(&mut self, len: u8) -> Result<(), PayloadTooLarge>;
    /// Queue one data frame for transmission.
    fn mcps_request(&mut self, req: &McpsRequest) -> Result<(), MacError>;
    /// Start an OTAA join handshake.
    fn mlme_join(&mut self, req: &JoinRequest) -> Result<(), MacError>;
    /// Network-joined flag, including a session restored from persistent
    /// storage at startup.
    fn is_joined(&self) -> bool;
    fn set_device_class(&mut self, class: DeviceClass);
}

/// Application diagnostic hooks, injected at construction. Every method has
/// a no-op default; outcomes are telemetry, never values the caller must
/// check.
pub trait Hooks {
    fn uplink_acked(&mut self, _confirm: &McpsConfirm) {}
    fn downlink_received(&mut self, _indication: &McpsIndication) {}
    fn link_checked(&mut self, _confirm: &MlmeConfirm) {}
    fn device_time_updated(&mut self) {}
}

/// Default hook implementation: discard everything.
pub struct NullHooks;

impl Hooks for NullHooks {}
