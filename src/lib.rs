//! Control core for a battery-powered LoRaWAN end-device.
//!
//! This crate coordinates three things that must not get out of step on a
//! class-A node: the command/register transaction protocol of the radio
//! transceiver ([`radio`]), the deep-sleep/wake cycle of the MCU
//! ([`lowpower`]) and the per-uplink session lifecycle ([`device`]). The
//! LoRaWAN MAC engine itself is an external collaborator reached through the
//! narrow request/confirm/indication interface in [`mac`].
//!
//! The session state machine is non-blocking and non-async: the main loop
//! calls [`device::Device::run_once`] once per pass and feeds MAC callbacks
//! in through [`device::Device::handle_event`]. Nothing in this crate blocks
//! indefinitely except the sanctioned deep-sleep call behind
//! [`hal::Board::enter_deep_sleep`].
//!
//! ## Feature flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]
#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod fmt;

pub mod device;
pub mod hal;
pub mod lowpower;
pub mod mac;
pub mod radio;
pub mod timer;

pub use rand_core::RngCore;

/// LoRaWAN device class. Only class A drives the sleep cycle implemented
/// here; B and C are accepted and forwarded to the MAC engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DeviceClass {
    A,
    B,
    C,
}

/// Regional band the external MAC engine is configured for. The control core
/// only consults this for the default data rate used when ADR is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Region {
    As923,
    Au915,
    Cn470,
    Eu433,
    Eu868,
    In865,
    Kr920,
    Us915,
}

impl Region {
    /// Default data rate when ADR is disabled. US915 caps at DR3 for the
    /// 125 kHz uplink channels; every other plan starts at DR5.
    pub fn default_datarate(&self) -> u8 {
        match self {
            Region::Us915 => 3,
            _ => 5,
        }
    }
}

macro_rules! lorawan_key {
    (
        $(#[$outer:meta])*
        pub struct $type:ident([u8; $len:literal]);
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
        pub struct $type([u8; $len]);

        impl From<[u8; $len]> for $type {
            fn from(key: [u8; $len]) -> Self {
                $type(key)
            }
        }

        impl AsRef<[u8]> for $type {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

lorawan_key!(
    /// Device EUI, provisioned per device.
    pub struct DevEui([u8; 8]);
);
lorawan_key!(
    /// Application (join) EUI.
    pub struct AppEui([u8; 8]);
);
lorawan_key!(
    /// Application root key used by the join handshake.
    pub struct AppKey([u8; 16]);
);
