// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Instant;

use crate::{
    Error, Result, Settings, StatusCode, UnitId,
    port::Port,
    signal::{Event, Signals},
};

/// Identity of a logical client on a [`ClientPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u32);

/// Answer of [`ClientPort::request_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// The port was free and is now held by the caller
    Enable,
    /// The caller already holds the port
    Process,
    /// Another client holds the port
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    WaitForOpen,
    Opened,
    BeginWrite,
    Write,
    Read,
    WaitForClose,
}

/// A [`Port`] shared by logical clients.
///
/// One request is in flight at a time. A client claims the port with
/// [`ClientPort::request_status`] and keeps it until its request completes,
/// fails for the last time or is cancelled.
#[derive(Debug)]
pub struct ClientPort {
    port: Port,
    name: String,
    state: State,
    current: Option<ClientId>,
    next_id: u32,
    blocked: bool,
    repeats: u32,
    repeat_count: u32,
    last_status: StatusCode,
    last_status_timestamp: Instant,
    last_error: Option<Error>,
    signals: Signals,
}

impl ClientPort {
    #[must_use]
    pub fn new(mut port: Port) -> Self {
        port.set_server_mode(false);
        let name = port.name();
        Self {
            port,
            name,
            state: State::Closed,
            current: None,
            next_id: 0,
            blocked: false,
            repeats: 0,
            repeat_count: 1,
            last_status: StatusCode::default(),
            last_status_timestamp: Instant::now(),
            last_error: None,
            signals: Signals::new(),
        }
    }

    /// Create a client port for `settings.protocol`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut port = Self::new(Port::from_settings(settings));
        port.repeat_count = settings.repeat_count();
        port
    }

    /// Hand out a new identity for a logical client.
    pub fn new_client_id(&mut self) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub const fn port(&self) -> &Port {
        &self.port
    }

    #[must_use]
    pub const fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Number of attempts per request.
    #[must_use]
    pub const fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// Set the number of attempts per request. `0` is ignored.
    pub fn set_repeat_count(&mut self, repeat_count: u32) {
        if repeat_count > 0 {
            self.repeat_count = repeat_count;
        }
    }

    /// Apply new settings. Changed connection parameters take effect
    /// with the next request.
    pub fn configure(&mut self, settings: &Settings) {
        self.port.configure(settings);
        self.set_repeat_count(settings.repeat_count());
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    #[must_use]
    pub const fn last_status(&self) -> StatusCode {
        self.last_status
    }

    #[must_use]
    pub const fn last_status_timestamp(&self) -> Instant {
        self.last_status_timestamp
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The client that currently holds the port.
    #[must_use]
    pub const fn current_client(&self) -> Option<ClientId> {
        self.current
    }

    /// Claim the port for `client`.
    pub fn request_status(&mut self, client: ClientId) -> RequestStatus {
        match self.current {
            None => {
                self.current = Some(client);
                RequestStatus::Enable
            }
            Some(current) if current == client => RequestStatus::Process,
            Some(_) => RequestStatus::Disable,
        }
    }

    /// Release the port before anything was sent.
    ///
    /// Only the holder can cancel. Returns `false` otherwise.
    pub fn cancel_request(&mut self, client: ClientId) -> bool {
        if self.current != Some(client) {
            return false;
        }
        self.release();
        true
    }

    /// Close the connection and release the port.
    pub fn close(&mut self) -> Result<Option<()>> {
        let was_open = self.port.is_open();
        self.port.close()?;
        self.release();
        self.state = State::Closed;
        if was_open {
            self.signals.emit(&Event::Closed { source: &self.name });
        }
        Ok(Some(()))
    }

    /// Drive one request of `client`.
    ///
    /// Returns the number of response bytes copied into `out` once the
    /// response arrived. A failed attempt is repeated until the repeat
    /// budget is exhausted.
    pub fn request(
        &mut self,
        client: ClientId,
        unit: UnitId,
        function: u8,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<Option<usize>> {
        if self.request_status(client) == RequestStatus::Disable {
            return Ok(None);
        }
        if !self.blocked {
            if let Err(err) = self.port.write_buffer(unit, function, payload) {
                self.release();
                return Err(self.set_error(err));
            }
            self.blocked = true;
        }
        let res = self.process();
        match &res {
            Ok(None) => return Ok(None),
            Err(_) => {
                self.repeats += 1;
                if self.repeats < self.repeat_count {
                    log::debug!(
                        "{}: repeating request ({}/{})",
                        self.name,
                        self.repeats + 1,
                        self.repeat_count
                    );
                    // re-encoded with the same transaction id
                    self.port.set_next_request_repeated(true);
                    self.blocked = false;
                    return Ok(None);
                }
            }
            Ok(Some(())) => {}
        }
        self.release();
        if let Err(err) = res {
            return Err(err);
        }
        let copied = self.port.read_buffer().and_then(|frame| {
            let data = frame.data;
            let Some(dst) = out.get_mut(..data.len()) else {
                return Err(Error::ReadBufferOverflow);
            };
            dst.copy_from_slice(data);
            Ok(data.len())
        });
        match copied {
            Ok(len) => {
                self.set_status(StatusCode::GOOD);
                Ok(Some(len))
            }
            Err(err) => Err(self.set_error(err)),
        }
    }

    /// Record a failure and notify observers.
    pub(crate) fn set_error(&mut self, err: Error) -> Error {
        let status = err.status();
        let text = err.to_string();
        log::warn!("{}: {text}", self.name);
        self.set_status(status);
        self.last_error = Some(err.clone());
        self.signals.emit(&Event::Error {
            source: &self.name,
            status,
            text: &text,
        });
        err
    }

    fn set_status(&mut self, status: StatusCode) {
        self.last_status = status;
        self.last_status_timestamp = Instant::now();
    }

    fn release(&mut self) {
        self.current = None;
        self.blocked = false;
        self.repeats = 0;
    }

    // One slice of the open, write, read cycle.
    fn process(&mut self) -> Result<Option<()>> {
        loop {
            match self.state {
                State::Closed | State::WaitForOpen => {
                    self.state = State::WaitForOpen;
                    match self.port.open() {
                        Ok(None) => return Ok(None),
                        Ok(Some(())) => {
                            self.state = State::Opened;
                            self.signals.emit(&Event::Opened { source: &self.name });
                        }
                        Err(err) => {
                            self.state = State::Closed;
                            return Err(self.set_error(err));
                        }
                    }
                }
                State::WaitForClose => {
                    self.port.close()?;
                    self.state = State::Closed;
                    self.signals.emit(&Event::Closed { source: &self.name });
                    return Ok(None);
                }
                State::BeginWrite => {
                    self.state = if self.port.is_open() {
                        State::Opened
                    } else {
                        State::Closed
                    };
                }
                State::Opened => {
                    self.state = if self.port.is_changed() {
                        State::WaitForClose
                    } else {
                        State::Write
                    };
                }
                State::Write => match self.port.write() {
                    Ok(None) => return Ok(None),
                    Ok(Some(())) => {
                        self.signals.emit(&Event::Tx {
                            source: &self.name,
                            bytes: self.port.write_buffer_data(),
                        });
                        self.set_status(StatusCode::PROCESSING_BEGIN);
                        self.state = State::Read;
                    }
                    Err(err) => {
                        self.state = State::BeginWrite;
                        return Err(self.set_error(err));
                    }
                },
                State::Read => {
                    let res = self.port.read();
                    if matches!(res, Ok(None)) {
                        return Ok(None);
                    }
                    self.state = State::BeginWrite;
                    return match res {
                        Ok(_) => {
                            self.signals.emit(&Event::Rx {
                                source: &self.name,
                                bytes: self.port.read_buffer_data(),
                            });
                            Ok(Some(()))
                        }
                        Err(err) => Err(self.set_error(err)),
                    };
                }
            }
        }
    }
}
