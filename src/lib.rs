// LDK-to-LND watchtower bridge
// Written in 2024 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Bridges a local Lightning Development Kit node to an external,
//! LND-compatible watchtower. [`capture::CaptureQueue`] turns channel
//! monitor updates into justice blobs as revocation secrets arrive;
//! [`delivery::DeliveryPipeline`] carries them to the tower over a
//! Brontide (BOLT 8) transport, falling back to on-disk storage
//! ([`localstore::LocalStore`]) whenever the tower is unreachable.
//!
//! An embedding application drives the bridge through three calls:
//! feed channel updates into the capture queue as the core signer
//! produces them, run [`delivery::DeliveryPipeline::run`] as a background
//! task, and poll [`delivery::DeliveryPipeline::status`] to decide whether
//! it is still safe to accept new channel updates.

// Coding conventions
#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code
)]

#[allow(unused_imports)]
#[macro_use]
extern crate amplify;
#[macro_use]
extern crate amplify_derive;

pub mod blobcrypto;
pub mod capture;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod error;
pub mod justice;
pub mod localstore;
pub mod model;
pub mod noise;
pub mod status;
pub mod transport;
pub mod wire;

pub use capture::CaptureQueue;
pub use config::{BridgeConfig, TowerUri, TransportMode};
pub use delivery::DeliveryPipeline;
pub use error::{BridgeError, BridgeExitCode};
pub use status::BridgeStatus;
