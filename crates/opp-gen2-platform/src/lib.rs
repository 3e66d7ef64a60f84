//! Async host driver for Open Pinball Project Gen2 boards.
//!
//! One [`OppPlatform`] drives any number of serial chains. Each chain is
//! brought up by a handshake (probe, inventory, configuration, firmware
//! versions, initial switch snapshot) and then polled periodically; switch
//! edges are reported to the host's [`SwitchStateTracker`].
//!
//! The host talks to the platform through four capability traits:
//! [`SwitchPlatform`], [`DriverPlatform`], [`LedPlatform`] and
//! [`MatrixLightPlatform`]. Hardware rules link switches to coils on the same
//! board so flippers and slingshots fire without a host round trip.
//!
//! Library code never installs a tracing subscriber.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod cards;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
mod handshake;
pub mod lights;
#[cfg(any(test, feature = "harness"))]
pub mod mock;
pub mod platform;
mod poll;
pub mod ports;
pub mod registry;
pub mod rules;
pub mod transport;

pub use channel::{CardKey, ChannelKey};
pub use config::{CoilConfig, LedConfig, MatrixLightConfig, OppConfig, SwitchConfig};
pub use dispatch::{DispatchOutcome, Phase, SwitchTransition};
pub use error::{PlatformError, PlatformResult};
pub use lights::{LedHandle, MatrixLightHandle};
pub use platform::{OppPlatform, SwitchHandle};
pub use ports::{
    DriverPlatform, LedPlatform, MatrixLightPlatform, SwitchPlatform, SwitchStateTracker,
};
pub use registry::{BoardInfo, CardCounts, ChainState, Registry};
pub use rules::DriverHandle;
pub use transport::{ChainReader, ChainWriter, Transport};

pub use opp_gen2_protocol::{FirmwareVersion, WingType};
