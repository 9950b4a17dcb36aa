// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io,
    net::{SocketAddr, TcpListener},
};

use super::{ServerPort, ServerResource, SharedDevice};
use crate::{
    Error, ProtocolType, Result, TcpSettings,
    port::{Port, TcpTransport},
    signal::{Event, Signals},
};

/// Modbus TCP listener.
///
/// Every accepted connection is served by its own [`ServerResource`]
/// bound to the shared device. Idle connections are dropped after
/// [`TcpSettings::timeout`].
pub struct ServerTcp {
    settings: TcpSettings,
    device: SharedDevice,
    name: String,
    listener: Option<TcpListener>,
    connections: Vec<ServerResource>,
    cmd_close: bool,
    // listener stopped, connections still closing
    closing: bool,
    signals: Signals,
}

impl ServerTcp {
    #[must_use]
    pub fn new(settings: TcpSettings, device: SharedDevice) -> Self {
        let name = format!("TCP:{}", settings.port);
        Self {
            settings,
            device,
            name,
            listener: None,
            connections: Vec::new(),
            cmd_close: false,
            closing: false,
            signals: Signals::new(),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub const fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn set_error(&self, err: Error) -> Error {
        let text = err.to_string();
        log::error!("{}: {text}", self.name);
        self.signals.emit(&Event::Error {
            source: &self.name,
            status: err.status(),
            text: &text,
        });
        err
    }

    fn listen(&mut self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.settings.port))
            .map_err(|err| Error::TcpBind(err.to_string()))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| Error::TcpListen(err.to_string()))?;
        log::debug!("{}: listening on port {}", self.name, self.settings.port);
        self.listener = Some(listener);
        self.signals.emit(&Event::Opened { source: &self.name });
        Ok(())
    }

    fn accept(&mut self) -> Result<()> {
        let Some(listener) = &self.listener else {
            return Ok(());
        };
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) => return Err(Error::TcpAccept(err.to_string())),
        };
        let transport = TcpTransport::from_stream(stream, self.settings.timeout)?;
        let port = Port::new(ProtocolType::Tcp, Box::new(transport));
        // named "ip:port" after its transport
        let connection =
            ServerResource::with_signals(port, self.device.clone(), self.signals.clone());
        log::debug!("{}: new connection {}", self.name, connection.name());
        self.signals.emit(&Event::NewConnection {
            source: connection.name(),
        });
        self.connections.push(connection);
        Ok(())
    }

    fn close_listener(&mut self) {
        if self.listener.take().is_some() {
            log::debug!("{}: stopped listening", self.name);
            self.closing = true;
        }
    }

    fn process_connections(&mut self) {
        for connection in &mut self.connections {
            if let Err(err) = connection.process() {
                // already reported through the shared signals
                log::trace!("{}: {err}", connection.name());
            }
        }
    }

    // Drop the connections matching `remove`, notifying observers.
    fn remove_connections(&mut self, remove: impl Fn(&ServerResource) -> bool) {
        let signals = &self.signals;
        self.connections.retain(|c| {
            if !remove(c) {
                return true;
            }
            log::debug!("connection {} closed", c.name());
            signals.emit(&Event::CloseConnection { source: c.name() });
            false
        });
    }
}

impl ServerPort for ServerTcp {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::Tcp
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }

    fn is_open(&self) -> bool {
        self.listener.is_some()
    }

    fn open(&mut self) {
        self.cmd_close = false;
    }

    fn close(&mut self) {
        self.cmd_close = true;
    }

    fn process(&mut self) -> Result<Option<()>> {
        if self.cmd_close {
            self.close_listener();
            for connection in &mut self.connections {
                connection.close();
            }
            self.process_connections();
            self.remove_connections(|c| c.is_closed() || !c.is_open());
            if !self.connections.is_empty() {
                return Ok(None);
            }
            if self.closing {
                self.closing = false;
                self.signals.emit(&Event::Closed { source: &self.name });
            }
            return Ok(Some(()));
        }
        if self.listener.is_none() {
            if let Err(err) = self.listen() {
                return Err(self.set_error(err));
            }
        }
        if let Err(err) = self.accept() {
            return Err(self.set_error(err));
        }
        self.process_connections();
        self.remove_connections(|c| !c.is_open());
        Ok(None)
    }
}

impl std::fmt::Debug for ServerTcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTcp")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("listening", &self.listener.is_some())
            .field("connections", &self.connections.len())
            .field("cmd_close", &self.cmd_close)
            .field("closing", &self.closing)
            .finish_non_exhaustive()
    }
}
