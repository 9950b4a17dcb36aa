// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus server
//!
//! A server answers the requests arriving on its port by calling a
//! [`ModbusInterface`] device. Serial lines are served by a single
//! [`ServerResource`], TCP by a [`ServerTcp`] listener that creates one
//! resource per connection.

mod interface;
mod resource;
mod tcp;

pub use self::{
    interface::{ModbusInterface, SharedDevice},
    resource::ServerResource,
    tcp::ServerTcp,
};

use crate::{ProtocolType, Result, signal::Signals};

/// Common interface of the server flavors.
pub trait ServerPort {
    fn protocol(&self) -> ProtocolType;

    fn name(&self) -> &str;

    /// Observers of this server and all of its connections.
    fn signals(&self) -> &Signals;

    fn is_open(&self) -> bool;

    /// Cancel a pending [`close`](Self::close).
    fn open(&mut self);

    /// Request shutdown, carried out by the following [`process`](Self::process) calls.
    fn close(&mut self);

    /// Make progress.
    ///
    /// Returns `Ok(Some(()))` once the server is closed after a
    /// [`close`](Self::close) request and `Ok(None)` while it is running.
    /// Errors are also reported to the `Error` observers.
    fn process(&mut self) -> Result<Option<()>>;
}
