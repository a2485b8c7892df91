//! Per-state transition logic. Each state is a unit struct; transitions
//! consume the current state and return the next one plus a [`Response`]
//! describing what happened on this pass.

use rand_core::RngCore;

use super::{Event, Response, Shared};
use crate::hal::Board;
use crate::mac::{
    EventStatus, Hooks, JoinRequest, Mac, McpsIndication, McpsKind, McpsRequest, MlmeConfirm,
    MlmeIndication, MlmeKind,
};

macro_rules! into_state {
    ($($struct:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$struct> for State {
                fn from(state: $struct) -> State {
                    State::$variant(state)
                }
            }
        )*
    };
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Init;
#[derive(Debug, Clone, Copy)]
pub(crate) struct Joining;
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sending;
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cycling;
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sleeping;
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShutDown;

into_state![
    Init => Init,
    Joining => Join,
    Sending => Send,
    Cycling => Cycle,
    Sleeping => Sleep,
    ShutDown => ShutDown,
];

#[derive(Debug, Clone, Copy)]
pub(crate) enum State {
    Init(Init),
    Join(Joining),
    Send(Sending),
    Cycle(Cycling),
    Sleep(Sleeping),
    ShutDown(ShutDown),
}

impl Default for State {
    fn default() -> Self {
        State::Init(Init)
    }
}

/// Externally visible session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SessionState {
    Init,
    Join,
    Send,
    Cycle,
    Sleep,
    ShutDown,
}

impl From<&State> for SessionState {
    fn from(state: &State) -> Self {
        match state {
            State::Init(_) => SessionState::Init,
            State::Join(_) => SessionState::Join,
            State::Send(_) => SessionState::Send,
            State::Cycle(_) => SessionState::Cycle,
            State::Sleep(_) => SessionState::Sleep,
            State::ShutDown(_) => SessionState::ShutDown,
        }
    }
}

impl State {
    pub(crate) fn poll<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
        self,
        shared: &mut Shared<M, B, H, RNG>,
    ) -> (State, Response) {
        match self {
            State::Init(state) => state.poll(shared),
            State::Join(state) => state.poll(shared),
            State::Send(state) => state.poll(shared),
            // Both waiting states hand the pass to the low-power gate.
            State::Cycle(_) | State::Sleep(_) => low_power_pass(self, shared),
            State::ShutDown(_) => (self, Response::NoUpdate),
        }
    }

    pub(crate) fn handle_event<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
        self,
        shared: &mut Shared<M, B, H, RNG>,
        event: Event,
    ) -> (State, Response) {
        if let State::ShutDown(_) = self {
            return (self, Response::NoUpdate);
        }
        match event {
            Event::TimerFired => schedule_uplink(shared),
            Event::McpsConfirm(confirm) => {
                if confirm.status == EventStatus::Ok {
                    shared.hooks.uplink_acked(&confirm);
                }
                // Best-effort delivery: a failed confirm still re-enables tx.
                shared.next_tx = true;
                (self, Response::ReadyToSend)
            }
            Event::McpsIndication(indication) => handle_indication(self, shared, &indication),
            Event::MlmeConfirm(confirm) => handle_mlme_confirm(self, shared, confirm),
            Event::MlmeIndication(MlmeIndication::ScheduleUplink) => schedule_uplink(shared),
        }
    }
}

impl Init {
    fn poll<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
        self,
        shared: &mut Shared<M, B, H, RNG>,
    ) -> (State, Response) {
        shared.mac.set_device_class(shared.config.device_class);
        info!("device initialized, starting join");
        (Joining.into(), Response::NoUpdate)
    }
}

impl Joining {
    fn poll<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
        self,
        shared: &mut Shared<M, B, H, RNG>,
    ) -> (State, Response) {
        join_attempt(shared)
    }
}

impl Sending {
    fn poll<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
        self,
        shared: &mut Shared<M, B, H, RNG>,
    ) -> (State, Response) {
        let sent = if shared.next_tx {
            send_frame(shared)
        } else {
            Response::NoUpdate
        };
        // The duty cycle restarts from the send attempt whether or not a
        // frame actually went out.
        let (state, armed) = arm_cycle(shared);
        let response = match sent {
            Response::NoUpdate => armed,
            other => other,
        };
        (state, response)
    }
}

/// Issue one OTAA join request. Accepted requests leave the device sleeping
/// until the MLME confirm arrives; a MAC engine that is busy right now gets
/// retried after a regular cycle.
pub(crate) fn join_attempt<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
    shared: &mut Shared<M, B, H, RNG>,
) -> (State, Response) {
    let request = JoinRequest {
        dev_eui: shared.config.dev_eui,
        app_eui: shared.config.app_eui,
        app_key: shared.config.app_key,
        nb_trials: 1,
    };
    match shared.mac.mlme_join(&request) {
        Ok(()) => {
            info!("join request queued");
            (Sleeping.into(), Response::JoinRequestSending)
        }
        Err(_) => arm_cycle(shared),
    }
}

fn handle_mlme_confirm<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
    current: State,
    shared: &mut Shared<M, B, H, RNG>,
    confirm: MlmeConfirm,
) -> (State, Response) {
    let (state, response) = match (confirm.kind, confirm.status) {
        (MlmeKind::Join, EventStatus::Ok) => {
            info!("network joined");
            (Sending.into(), Response::JoinSuccess)
        }
        (MlmeKind::Join, _) => {
            let backoff = shared.config.join_backoff_ms;
            warn!("join failed, next attempt in {} ms", backoff);
            shared.timer.arm(shared.board.now_ms(), backoff);
            (Cycling.into(), Response::NoJoinAccept(backoff))
        }
        (MlmeKind::LinkCheck, status) => {
            if status == EventStatus::Ok {
                shared.hooks.link_checked(&confirm);
            }
            (current, Response::NoUpdate)
        }
        (MlmeKind::DeviceTime, status) => {
            if status == EventStatus::Ok {
                shared.hooks.device_time_updated();
            }
            (current, Response::NoUpdate)
        }
    };
    shared.next_tx = true;
    (state, response)
}

fn handle_indication<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
    current: State,
    shared: &mut Shared<M, B, H, RNG>,
    indication: &McpsIndication,
) -> (State, Response) {
    if indication.status != EventStatus::Ok {
        return (current, Response::NoUpdate);
    }
    trace!("downlink on port {}, {} bytes", indication.fport, indication.data.len());
    shared.hooks.downlink_received(indication);
    if indication.kind == McpsKind::Confirmed || indication.frame_pending {
        // The network is waiting on us; do not sit out the duty cycle.
        schedule_uplink(shared)
    } else {
        (current, Response::DownlinkReceived)
    }
}

/// Move the next uplink to now. Unjoined devices turn this into a fresh join
/// attempt instead.
fn schedule_uplink<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
    shared: &mut Shared<M, B, H, RNG>,
) -> (State, Response) {
    shared.timer.stop();
    if shared.mac.is_joined() {
        shared.next_tx = true;
        (Sending.into(), Response::UplinkScheduled)
    } else {
        join_attempt(shared)
    }
}

fn send_frame<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
    shared: &mut Shared<M, B, H, RNG>,
) -> Response {
    let len = shared.uplink.data.len() as u8;
    let (request, flush) = if shared.mac.query_tx_possible(len).is_err() {
        // Payload does not fit once pending MAC replies are piggybacked.
        // Send an empty frame to flush them so the next attempt has room.
        let flush_frame = McpsRequest {
            kind: McpsKind::Unconfirmed,
            fport: 0,
            data: &[],
            datarate: shared.config.data_rate,
            nb_trials: 1,
        };
        (flush_frame, true)
    } else {
        let kind = if shared.config.confirmed {
            McpsKind::Confirmed
        } else {
            McpsKind::Unconfirmed
        };
        let data_frame = McpsRequest {
            kind,
            fport: shared.uplink.fport,
            data: &shared.uplink.data,
            datarate: shared.config.data_rate,
            nb_trials: shared.config.nb_trials,
        };
        (data_frame, false)
    };
    match shared.mac.mcps_request(&request) {
        Ok(()) => {
            shared.next_tx = false;
            if flush {
                debug!("payload too large at current data rate, flushing mac commands");
                Response::FlushUplinkSending
            } else {
                debug!("uplink queued, {} bytes on port {}", request.data.len(), request.fport);
                Response::UplinkSending
            }
        }
        Err(_) => Response::UplinkDeferred,
    }
}

fn arm_cycle<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
    shared: &mut Shared<M, B, H, RNG>,
) -> (State, Response) {
    let jitter = match shared.config.duty_cycle_jitter_ms {
        0 => 0,
        span => shared.rng.next_u32() % (span + 1),
    };
    let interval = shared.config.tx_duty_cycle_ms.wrapping_add(jitter);
    shared.timer.arm(shared.board.now_ms(), interval);
    debug!("next uplink window in {} ms", interval);
    (Cycling.into(), Response::CycleArmed(interval))
}

fn low_power_pass<M: Mac, B: Board, H: Hooks, RNG: RngCore>(
    current: State,
    shared: &mut Shared<M, B, H, RNG>,
) -> (State, Response) {
    if shared.gate.poll(&mut shared.board) {
        (current, Response::WokeUp)
    } else {
        (current, Response::NoUpdate)
    }
}
