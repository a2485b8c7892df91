//! Session state machine for the per-uplink lifecycle: join, send,
//! duty-cycle wait and sleep.
//!
//! Non-blocking and non-async, in the same shape as a classic firmware main
//! loop: the application calls [`Device::run_once`] once per pass and feeds
//! the MAC engine's asynchronous confirm/indication callbacks in through
//! [`Device::handle_event`]. Every recoverable failure is absorbed here and
//! turned into a state transition; nothing is surfaced for the caller to
//! check after the fact beyond the optional [`Hooks`] telemetry.

use heapless::Vec;
use rand_core::RngCore;

use crate::hal::Board;
use crate::lowpower::LowPowerGate;
use crate::mac::{
    Hooks, Mac, McpsConfirm, McpsIndication, MlmeConfirm, MlmeIndication,
};
use crate::timer::EventTimer;
use crate::{AppEui, AppKey, DevEui, DeviceClass, Region};

pub(crate) mod state;
pub use state::SessionState;
use state::State;


/// Largest application payload the staging buffer accepts.
pub const MAX_APP_PAYLOAD: usize = 242;

/// Session and retry policy. Constructed once at startup; the defaults
/// mirror a conservative battery-powered class-A profile.
pub struct Config {
    pub device_class: DeviceClass,
    pub region: Region,
    pub dev_eui: DevEui,
    pub app_eui: AppEui,
    pub app_key: AppKey,
    /// Minimum wait between successive uplinks.
    pub tx_duty_cycle_ms: u32,
    /// Random extra wait added to every cycle to de-synchronize devices.
    pub duty_cycle_jitter_ms: u32,
    /// Wait before retrying a failed join. Long and fixed rather than
    /// exponential: join attempts are rare and flooding an unreachable
    /// network is worse than joining late.
    pub join_backoff_ms: u32,
    /// Send confirmed uplinks.
    pub confirmed: bool,
    /// Confirmed-send retry bound handed to the MAC layer.
    pub nb_trials: u8,
    pub fport: u8,
    /// Data rate used while ADR is off.
    pub data_rate: u8,
}

impl Config {
    pub fn new(
        device_class: DeviceClass,
        region: Region,
        dev_eui: DevEui,
        app_eui: AppEui,
        app_key: AppKey,
    ) -> Self {
        Self {
            device_class,
            region,
            dev_eui,
            app_eui,
            app_key,
            tx_duty_cycle_ms: 15_000,
            duty_cycle_jitter_ms: 1_000,
            join_backoff_ms: 3_600_000,
            confirmed: false,
            nb_trials: 4,
            fport: 2,
            data_rate: region.default_datarate(),
        }
    }
}

/// Staged application payload. Logically handed to the MAC engine for the
/// duration of the send request; not mutated again until the matching
/// confirm re-enables transmission.
pub(crate) struct PendingUplink {
    pub(crate) data: Vec<u8, MAX_APP_PAYLOAD>,
    pub(crate) fport: u8,
}

pub(crate) struct Shared<M, B, H, RNG> {
    pub(crate) mac: M,
    pub(crate) board: B,
    pub(crate) hooks: H,
    pub(crate) rng: RNG,
    pub(crate) config: Config,
    pub(crate) timer: EventTimer,
    pub(crate) gate: LowPowerGate,
    pub(crate) uplink: PendingUplink,
    /// Whether a new uplink may be issued. Cleared when a send request is
    /// accepted, set again by any confirm (best-effort delivery: past
    /// failures never block future uplinks).
    pub(crate) next_tx: bool,
}

/// Asynchronous input into the state machine.
#[derive(Debug)]
pub enum Event<'a> {
    McpsConfirm(McpsConfirm),
    McpsIndication(McpsIndication<'a>),
    MlmeConfirm(MlmeConfirm),
    MlmeIndication(MlmeIndication),
    /// The duty-cycle or backoff deadline passed.
    TimerFired,
}

/// What one pass or one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Response {
    NoUpdate,
    /// A join request was accepted for transmission; confirm pending.
    JoinRequestSending,
    /// Join failed; backoff timer armed for the given interval.
    NoJoinAccept(u32),
    JoinSuccess,
    /// A data uplink was accepted for transmission.
    UplinkSending,
    /// Payload did not fit the current data rate; an empty frame was sent
    /// to flush pending MAC commands instead.
    FlushUplinkSending,
    /// The MAC engine declined the request right now; retried next cycle.
    UplinkDeferred,
    /// Duty-cycle timer armed for the given interval.
    CycleArmed(u32),
    /// A confirm re-enabled transmission.
    ReadyToSend,
    DownlinkReceived,
    /// An immediate uplink was scheduled, overriding the duty-cycle timer.
    UplinkScheduled,
    /// A deep-sleep window was taken and the device is awake again.
    WokeUp,
}

/// Errors surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// Staged payload exceeds [`MAX_APP_PAYLOAD`].
    PayloadTooLong,
}

/// The device session: owned context plus the current state. Exactly one
/// instance exists per device; all state advances through its methods.
pub struct Device<M, B, H, RNG>
where
    M: Mac,
    B: Board,
    H: Hooks,
    RNG: RngCore,
{
    state: State,
    shared: Shared<M, B, H, RNG>,
}

impl<M, B, H, RNG> Device<M, B, H, RNG>
where
    M: Mac,
    B: Board,
    H: Hooks,
    RNG: RngCore,
{
    pub fn new(config: Config, mac: M, board: B, hooks: H, rng: RNG) -> Self {
        Self {
            state: State::default(),
            shared: Shared {
                mac,
                board,
                hooks,
                rng,
                config,
                timer: EventTimer::new(),
                gate: LowPowerGate::default(),
                uplink: PendingUplink { data: Vec::new(), fport: 0 },
                next_tx: true,
            },
        }
    }

    /// One main-loop pass: fire a pending deadline first, then let the
    /// current state act.
    pub fn run_once(&mut self) -> Response {
        let now = self.shared.board.now_ms();
        if self.shared.timer.fired(now) {
            return self.handle_event(Event::TimerFired);
        }
        let (state, response) = self.state.poll(&mut self.shared);
        self.state = state;
        response
    }

    /// Feed one asynchronous MAC callback or timer expiry in.
    pub fn handle_event(&mut self, event: Event) -> Response {
        let (state, response) = self.state.handle_event(&mut self.shared, event);
        self.state = state;
        response
    }

    /// Stage the next application payload. The buffer is copied; it is not
    /// touched again until the matching confirm fires.
    pub fn stage_uplink(&mut self, fport: u8, data: &[u8]) -> Result<(), Error> {
        self.shared.uplink.data.clear();
        self.shared
            .uplink
            .data
            .extend_from_slice(data)
            .map_err(|()| Error::PayloadTooLong)?;
        self.shared.uplink.fport = fport;
        Ok(())
    }

    /// Skip the join handshake when the external MAC restored a persisted
    /// session at startup. The first cycle lands at a random point within
    /// the duty interval to avoid synchronized rejoin bursts after a
    /// region-wide power event.
    pub fn resume_saved_session(&mut self) -> bool {
        if !self.shared.mac.is_joined() {
            return false;
        }
        let span = self.shared.config.tx_duty_cycle_ms.max(1);
        let interval = self.shared.rng.next_u32() % span;
        info!("saved session restored, first uplink in {} ms", interval);
        let now = self.shared.board.now_ms();
        self.shared.timer.arm(now, interval);
        self.state = state::Cycling.into();
        true
    }

    /// Force a join attempt now.
    pub fn join(&mut self) -> Response {
        let (state, response) = state::join_attempt(&mut self.shared);
        self.state = state;
        response
    }

    /// Force the send path now (no-op if transmission is not permitted yet).
    pub fn send(&mut self) -> Response {
        let (state, response) = State::from(state::Sending).poll(&mut self.shared);
        self.state = state;
        response
    }

    /// Arm the duty-cycle timer with an explicit interval.
    pub fn cycle(&mut self, interval_ms: u32) -> Response {
        let now = self.shared.board.now_ms();
        self.shared.timer.arm(now, interval_ms);
        self.state = state::Cycling.into();
        Response::CycleArmed(interval_ms)
    }

    /// One low-power pass. Returns whether a sleep window was taken.
    pub fn sleep(&mut self) -> bool {
        self.shared.gate.poll(&mut self.shared.board)
    }

    /// Terminal state; the device stops reacting to events.
    pub fn shutdown(&mut self) {
        self.shared.timer.stop();
        self.state = state::ShutDown.into();
    }

    pub fn state(&self) -> SessionState {
        (&self.state).into()
    }

    pub fn ready_to_send(&self) -> bool {
        self.shared.next_tx && self.shared.mac.is_joined()
    }

    /// Pending deadline of the duty-cycle/backoff timer, if armed.
    pub fn timer_deadline_ms(&self) -> Option<u32> {
        self.shared.timer.deadline_ms()
    }

    pub fn get_mac(&mut self) -> &mut M {
        &mut self.shared.mac
    }
}
