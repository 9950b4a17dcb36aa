// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Non-blocking Modbus RTU/ASCII/TCP client and server engine.
//!
//! Everything in this crate is driven by polling: operations return
//! `Ok(None)` while they are still in progress and are simply called
//! again later, so one thread can drive any number of ports.
//!
//! - [`ClientPort`] owns one [`Port`](port::Port) and arbitrates the
//!   requests of several [`Client`]s.
//! - [`ServerResource`] and [`ServerTcp`] answer requests by calling a
//!   [`ModbusInterface`] device.
//!
//! ```no_run
//! use modbus_port::{Client, ProtocolType, Settings, create_client_port};
//!
//! let mut settings = Settings::default();
//! settings.protocol = ProtocolType::Tcp;
//! settings.tcp.host = "192.168.0.10".into();
//!
//! let mut port = create_client_port(&settings);
//! let client = Client::new(&mut port, 1);
//! let mut values = [0; 4];
//! loop {
//!     match client.read_holding_registers(&mut port, 0, 4, &mut values) {
//!         Ok(None) => continue,
//!         Ok(Some(())) => break,
//!         Err(err) => panic!("{err}"),
//!     }
//! }
//! ```

pub mod client;
pub mod codec;
pub mod port;
pub mod server;
pub mod signal;
pub mod util;

mod error;
mod frame;
mod settings;
mod status;

pub use self::{
    client::{Client, ClientId, ClientPort, RequestStatus},
    codec::ProtocolType,
    error::Error,
    frame::*,
    server::{ModbusInterface, ServerPort, ServerResource, ServerTcp, SharedDevice},
    settings::*,
    status::StatusCode,
};

pub type Result<T> = core::result::Result<T, Error>;

/// Create a client port for the protocol of `settings`.
#[must_use]
pub fn create_client_port(settings: &Settings) -> ClientPort {
    ClientPort::from_settings(settings)
}

/// Create a server for the protocol of `settings`.
///
/// TCP settings yield a listening [`ServerTcp`], serial settings a
/// [`ServerResource`] on the configured line.
#[must_use]
pub fn create_server_port(settings: &Settings, device: SharedDevice) -> Box<dyn ServerPort> {
    match settings.protocol {
        ProtocolType::Tcp => Box::new(ServerTcp::new(settings.tcp.clone(), device)),
        ProtocolType::Rtu | ProtocolType::Asc => Box::new(ServerResource::new(
            port::Port::from_settings(settings),
            device,
        )),
    }
}
