//! # zwave-serial
//!
//! Async host-side driver for a Z-Wave controller chip speaking the Serial
//! API over a UART.
//!
//! ## Architecture
//!
//! - **Link** ([`link`]): frames bytes, answers every data frame with Ack or
//!   Nack, and publishes what the controller sent
//! - **Functions** ([`function`]): controller operations, each run as a
//!   retrying request/Ack/Response transaction
//! - **Command classes** ([`command_class`]): payloads exchanged with remote
//!   nodes, decoded by per-class codecs and correlated Get → Report
//! - **Inclusion** ([`inclusion`]): the add/remove node handshake
//!
//! ## Example
//!
//! ```ignore
//! use zwave_serial::inclusion::AddDeviceOptions;
//! use zwave_serial::ZWaveClient;
//!
//! #[tokio::main]
//! async fn main() -> zwave_serial::Result<()> {
//!     let port = zwave_serial::transport::open_serial(&Default::default())?;
//!     let client = ZWaveClient::builder().connect(port);
//!
//!     let added = client.add_device(AddDeviceOptions::new()).await?;
//!     println!("node {} joined", added.node_id);
//!
//!     let level = client.basic_get(added.node_id).await?;
//!     println!("level {}", level.value);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod command_class;
pub mod config;
pub mod error;
pub mod function;
pub mod inclusion;
pub mod link;
pub mod protocol;
#[cfg(feature = "serial")]
pub mod transport;
pub mod writer;

mod client;

/// One-byte node address on the mesh.
pub type NodeId = u8;

pub use client::{ZWaveClient, ZWaveClientBuilder};
pub use command_class::{GetRequest, NodeReport, Report};
pub use config::ClientConfig;
pub use error::{Result, ZWaveError};
pub use inclusion::{AddDeviceOptions, InclusionResult, RemovalResult, RemoveDeviceOptions};
pub use link::{LinkEvent, SerialLink};
