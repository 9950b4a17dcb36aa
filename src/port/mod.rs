// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resumable port state machine
//!
//! A [`Port`] drives one connection through open, write, read and close.
//! Every call does a bounded slice of work and returns `Ok(None)` if it
//! has to be called again, `Ok(Some(_))` when the step is complete, or an
//! error that ends the step.

use std::time::{Duration, Instant};

use crate::{
    DecodedFrame, Error, ProtocolType, Result, Settings, UnitId,
    codec::Codec,
};

#[cfg(test)]
pub(crate) mod mock;
mod serial;
mod tcp;

pub use self::{serial::SerialTransport, tcp::TcpTransport};

/// Physical medium of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    Tcp,
}

impl TransportKind {
    fn read_error(self, text: &str) -> Error {
        match self {
            Self::Serial => Error::SerialRead(text.into()),
            Self::Tcp => Error::TcpRead(text.into()),
        }
    }

    fn write_error(self, text: &str) -> Error {
        match self {
            Self::Serial => Error::SerialWrite(text.into()),
            Self::Tcp => Error::TcpWrite(text.into()),
        }
    }
}

/// Read and write timeouts of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Time until the first byte of a frame must be transferred
    pub first_byte: Duration,
    /// Serial: silence that ends a frame. TCP: maximum gap between bytes.
    pub inter_byte: Duration,
}

/// Non-blocking byte transport.
///
/// Implementations never wait: they transfer what is possible right now
/// and report errors with the matching [`Error`] variant.
pub trait Transport {
    fn kind(&self) -> TransportKind;

    /// Human readable name, e.g. `localhost:502` or `/dev/ttyS0`.
    fn name(&self) -> String;

    /// Apply `settings`. Returns `true` if a connection parameter changed.
    fn configure(&mut self, settings: &Settings) -> bool;

    fn timeouts(&self) -> Timeouts;

    /// Open or continue opening. `Ok(None)` while still connecting.
    fn open(&mut self) -> Result<Option<()>>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Write as much of `data` as possible. Returns `0` if the transport is busy.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read available bytes. `Ok(None)` if nothing is pending,
    /// `Ok(Some(0))` if the peer closed the connection.
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Drop stale inbound bytes before a new request is sent.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Life-cycle state of a [`Port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Closed,
    WaitForOpen,
    Opened,
    WaitForWrite,
    WaitForWriteAll,
    WaitForRead,
    WaitForReadAll,
}

/// One connection: a transport, its framing and the frame buffers.
pub struct Port {
    transport: Box<dyn Transport>,
    codec: Codec,
    state: PortState,
    changed: bool,
    server_mode: bool,
    // identity of the outstanding request (client mode)
    unit: UnitId,
    function: u8,
    write_buf: Vec<u8>,
    write_len: usize,
    written: usize,
    // one spare byte to detect overflow
    read_buf: Vec<u8>,
    read_len: usize,
    bin_buf: Vec<u8>,
    timestamp: Instant,
    last_error: Option<Error>,
}

impl Port {
    #[must_use]
    pub fn new(protocol: ProtocolType, transport: Box<dyn Transport>) -> Self {
        let codec = Codec::new(protocol);
        let size = codec.buffer_size();
        Self {
            transport,
            state: PortState::Closed,
            changed: false,
            server_mode: false,
            unit: 0,
            function: 0,
            write_buf: vec![0; size],
            write_len: 0,
            written: 0,
            read_buf: vec![0; size + 1],
            read_len: 0,
            bin_buf: vec![0; crate::codec::ascii::BIN_BUFF_SZ],
            timestamp: Instant::now(),
            last_error: None,
            codec,
        }
    }

    /// Create a port with the transport that matches `settings.protocol`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let transport: Box<dyn Transport> = match settings.protocol {
            ProtocolType::Tcp => Box::new(TcpTransport::new(settings.tcp.clone())),
            ProtocolType::Rtu | ProtocolType::Asc => {
                Box::new(SerialTransport::new(settings.serial.clone()))
            }
        };
        Self::new(settings.protocol, transport)
    }

    #[must_use]
    pub const fn protocol(&self) -> ProtocolType {
        self.codec.protocol()
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.transport.name()
    }

    #[must_use]
    pub const fn state(&self) -> PortState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Settings changed since the port was opened.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        self.changed
    }

    #[must_use]
    pub const fn is_server_mode(&self) -> bool {
        self.server_mode
    }

    pub fn set_server_mode(&mut self, server_mode: bool) {
        self.server_mode = server_mode;
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Apply new settings. A changed connection parameter forces a reopen.
    pub fn configure(&mut self, settings: &Settings) {
        if self.transport.configure(settings) {
            self.changed = true;
        }
    }

    /// Hint that the next request repeats the previous one.
    pub fn set_next_request_repeated(&mut self, repeated: bool) {
        self.codec.set_next_request_repeated(repeated);
    }

    /// The encoded outbound frame.
    #[must_use]
    pub fn write_buffer_data(&self) -> &[u8] {
        &self.write_buf[..self.write_len]
    }

    /// The raw inbound frame.
    #[must_use]
    pub fn read_buffer_data(&self) -> &[u8] {
        &self.read_buf[..self.read_len]
    }

    /// Printable dump of a raw frame of this port's protocol.
    #[must_use]
    pub fn dump(&self, frame: &[u8]) -> String {
        self.codec.dump(frame)
    }

    pub fn open(&mut self) -> Result<Option<()>> {
        if self.changed {
            self.transport.close();
            self.changed = false;
            self.state = PortState::Closed;
        }
        if self.state != PortState::WaitForOpen && self.transport.is_open() {
            if self.state == PortState::Closed {
                self.state = PortState::Opened;
            }
            return Ok(Some(()));
        }
        self.state = PortState::WaitForOpen;
        match self.transport.open() {
            Ok(None) => Ok(None),
            Ok(Some(())) => {
                self.state = PortState::Opened;
                log::debug!("{}: opened", self.name());
                Ok(Some(()))
            }
            Err(err) => {
                self.state = PortState::Closed;
                Err(self.set_error(err))
            }
        }
    }

    /// Release the connection. Closing a closed port is a no-op.
    pub fn close(&mut self) -> Result<Option<()>> {
        if self.transport.is_open() {
            log::debug!("{}: closed", self.name());
        }
        self.transport.close();
        self.state = PortState::Closed;
        Ok(Some(()))
    }

    /// Encode an outbound frame.
    pub fn write_buffer(&mut self, unit: UnitId, function: u8, payload: &[u8]) -> Result<()> {
        let len = self
            .codec
            .encode(self.server_mode, &mut self.write_buf, unit, function, payload)
            .map_err(|err| self.set_error(err))?;
        self.write_len = len;
        self.written = 0;
        if !self.server_mode {
            self.unit = unit;
            self.function = function;
        }
        Ok(())
    }

    /// Decode and validate the received frame.
    ///
    /// In client mode the response must answer the outstanding request.
    pub fn read_buffer(&mut self) -> Result<DecodedFrame<'_>> {
        let Self {
            codec,
            server_mode,
            unit,
            function,
            read_buf,
            read_len,
            bin_buf,
            last_error,
            ..
        } = self;
        let res = codec
            .decode(*server_mode, &read_buf[..*read_len], bin_buf)
            .and_then(|frame| {
                if !*server_mode {
                    frame.check_response(*unit, *function)?;
                }
                Ok(frame)
            });
        if let Err(err) = &res {
            *last_error = Some(err.clone());
        }
        res
    }

    /// Send the encoded frame.
    pub fn write(&mut self) -> Result<Option<()>> {
        if !matches!(
            self.state,
            PortState::WaitForWrite | PortState::WaitForWriteAll
        ) {
            if !self.transport.is_open() {
                let err = self.transport.kind().write_error("port is not open");
                return Err(self.set_error(err));
            }
            if let Err(err) = self.transport.clear_input() {
                return Err(self.fail(err));
            }
            self.written = 0;
            self.timestamp = Instant::now();
            self.state = PortState::WaitForWrite;
        }
        while self.written < self.write_len {
            let n = match self
                .transport
                .write(&self.write_buf[self.written..self.write_len])
            {
                Ok(n) => n,
                Err(err) => return Err(self.fail(err)),
            };
            if n == 0 {
                break;
            }
            self.written += n;
            self.state = PortState::WaitForWriteAll;
        }
        if self.written >= self.write_len {
            self.state = PortState::Opened;
            log::trace!("{} Tx: {}", self.name(), self.dump(self.write_buffer_data()));
            return Ok(Some(()));
        }
        if self.timestamp.elapsed() >= self.transport.timeouts().first_byte {
            let err = self.transport.kind().write_error("timeout");
            return Err(self.fail(err));
        }
        Ok(None)
    }

    /// Receive a frame.
    ///
    /// TCP frames are complete once the length announced by the MBAP
    /// header arrived, serial frames after an inter-byte silence.
    pub fn read(&mut self) -> Result<Option<()>> {
        if !matches!(
            self.state,
            PortState::WaitForRead | PortState::WaitForReadAll
        ) {
            if !self.transport.is_open() {
                let err = self.transport.kind().read_error("port is not open");
                return Err(self.set_error(err));
            }
            self.read_len = 0;
            self.timestamp = Instant::now();
            self.state = PortState::WaitForRead;
        }
        match self.receive() {
            Ok(true) => {
                self.timestamp = Instant::now();
                self.state = PortState::WaitForReadAll;
            }
            Ok(false) => {}
            Err(err) => return Err(self.fail(err)),
        }
        let kind = self.transport.kind();
        let timeouts = self.transport.timeouts();
        let elapsed = self.timestamp.elapsed();
        if self.state == PortState::WaitForRead {
            // a serial server waits for requests without limit
            let unbounded = self.server_mode && kind == TransportKind::Serial;
            if !unbounded && elapsed >= timeouts.first_byte {
                return Err(self.fail(kind.read_error("timeout")));
            }
            return Ok(None);
        }
        if self.codec.is_length_prefixed() {
            match self.codec.frame_len(&self.read_buf[..self.read_len]) {
                Some(len) if len > self.codec.buffer_size() => {
                    return Err(self.fail(Error::ReadBufferOverflow));
                }
                Some(len) if self.read_len >= len => {
                    if self.read_len > len {
                        log::debug!(
                            "{}: dropping {} surplus byte(s)",
                            self.name(),
                            self.read_len - len
                        );
                        self.read_len = len;
                    }
                    return Ok(Some(self.complete_read()));
                }
                _ => {}
            }
            if elapsed >= timeouts.inter_byte {
                return Err(self.fail(kind.read_error("timeout")));
            }
            return Ok(None);
        }
        if elapsed >= timeouts.inter_byte {
            return Ok(Some(self.complete_read()));
        }
        Ok(None)
    }

    // Pull everything available. Returns `true` if new bytes arrived.
    fn receive(&mut self) -> Result<bool> {
        let mut received = false;
        loop {
            if self.read_len >= self.read_buf.len() {
                return Err(Error::ReadBufferOverflow);
            }
            match self.transport.read(&mut self.read_buf[self.read_len..])? {
                None => return Ok(received),
                Some(0) => return Err(Error::TcpDisconnect),
                Some(n) => {
                    self.read_len += n;
                    received = true;
                }
            }
        }
    }

    fn complete_read(&mut self) {
        self.state = PortState::Opened;
        log::trace!("{} Rx: {}", self.name(), self.dump(self.read_buffer_data()));
    }

    // Transport failure: TCP connections are dropped, serial lines stay open.
    fn fail(&mut self, err: Error) -> Error {
        match self.transport.kind() {
            TransportKind::Tcp => {
                self.transport.close();
                self.state = PortState::Closed;
            }
            TransportKind::Serial => self.state = PortState::Opened,
        }
        self.set_error(err)
    }

    fn set_error(&mut self, err: Error) -> Error {
        log::debug!("{}: {err}", self.name());
        self.last_error = Some(err.clone());
        err
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name())
            .field("protocol", &self.protocol())
            .field("state", &self.state)
            .field("changed", &self.changed)
            .field("server_mode", &self.server_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Exception, util::crc16};
    use mock::MockTransport;

    fn rtu_frame(bytes: &[u8]) -> Vec<u8> {
        let mut frame = bytes.to_vec();
        frame.extend_from_slice(&crc16(bytes).to_le_bytes());
        frame
    }

    fn open(port: &mut Port) {
        assert_eq!(port.open(), Ok(Some(())));
        assert_eq!(port.state(), PortState::Opened);
    }

    #[test]
    fn open_write_read_close_cycle() {
        let (transport, link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        open(&mut port);

        port.write_buffer(0x01, 0x03, &[0x00, 0x00, 0x00, 0x02]).unwrap();
        assert_eq!(port.write(), Ok(Some(())));
        assert_eq!(
            link.borrow().sent,
            vec![vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]]
        );

        link.borrow_mut()
            .push(rtu_frame(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]));
        assert_eq!(port.read(), Ok(Some(())));
        let frame = port.read_buffer().unwrap();
        assert_eq!(frame.data, &[0x04, 0x00, 0x0A, 0x00, 0x14]);

        assert_eq!(port.close(), Ok(Some(())));
        assert_eq!(port.close(), Ok(Some(())));
        assert!(!port.is_open());
        assert_eq!(port.state(), PortState::Closed);
    }

    #[test]
    fn open_failure_resets_to_closed() {
        let (transport, link) = MockTransport::serial();
        link.borrow_mut().open_error = Some(Error::SerialOpen("busy".into()));
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        assert_eq!(port.open(), Err(Error::SerialOpen("busy".into())));
        assert_eq!(port.state(), PortState::Closed);
        assert_eq!(port.last_error(), Some(&Error::SerialOpen("busy".into())));
    }

    #[test]
    fn open_in_progress() {
        let (transport, link) = MockTransport::tcp(Duration::from_secs(1));
        link.borrow_mut().open_polls = 2;
        let mut port = Port::new(ProtocolType::Tcp, Box::new(transport));
        assert_eq!(port.open(), Ok(None));
        assert_eq!(port.state(), PortState::WaitForOpen);
        assert_eq!(port.open(), Ok(None));
        assert_eq!(port.open(), Ok(Some(())));
    }

    #[test]
    fn changed_settings_force_reopen() {
        let (transport, link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        open(&mut port);
        port.configure(&Settings::default());
        assert!(port.is_changed());
        open(&mut port);
        assert!(!port.is_changed());
        assert_eq!(link.borrow().open_count, 2);
        assert_eq!(link.borrow().close_count, 1);
    }

    #[test]
    fn serial_read_timeout_keeps_the_port_open() {
        let (transport, _link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        open(&mut port);
        assert_eq!(port.read(), Err(Error::SerialRead("timeout".into())));
        assert!(port.is_open());
        assert_eq!(port.state(), PortState::Opened);
    }

    #[test]
    fn serial_server_waits_for_the_first_byte() {
        let (transport, link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        port.set_server_mode(true);
        open(&mut port);
        assert_eq!(port.read(), Ok(None));
        assert_eq!(port.read(), Ok(None));
        link.borrow_mut().push(rtu_frame(&[0x01, 0x07]));
        assert_eq!(port.read(), Ok(Some(())));
    }

    #[test]
    fn serial_read_overflow() {
        let (transport, link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        open(&mut port);
        link.borrow_mut().push(vec![0x01; crate::codec::rtu::BUFF_SZ + 1]);
        assert_eq!(port.read(), Err(Error::ReadBufferOverflow));
    }

    mod tcp_read {

        use super::*;

        fn tcp_port() -> (Port, std::rc::Rc<std::cell::RefCell<mock::Link>>) {
            let (transport, link) = MockTransport::tcp(Duration::from_secs(5));
            let mut port = Port::new(ProtocolType::Tcp, Box::new(transport));
            open(&mut port);
            port.write_buffer(0x01, 0x03, &[0x00, 0x00, 0x00, 0x01]).unwrap();
            assert_eq!(port.write(), Ok(Some(())));
            (port, link)
        }

        #[test]
        fn accumulate_partial_prefix_across_polls() {
            let (mut port, link) = tcp_port();
            link.borrow_mut().push(vec![0x00, 0x01, 0x00]);
            assert_eq!(port.read(), Ok(None));
            link.borrow_mut().push(vec![0x00, 0x00, 0x05, 0x01]);
            assert_eq!(port.read(), Ok(None));
            link.borrow_mut().push(vec![0x03, 0x02, 0x00, 0x2A]);
            assert_eq!(port.read(), Ok(Some(())));
            let frame = port.read_buffer().unwrap();
            assert_eq!(frame.data, &[0x02, 0x00, 0x2A]);
        }

        #[test]
        fn complete_frame_in_a_single_poll() {
            let (mut port, link) = tcp_port();
            link.borrow_mut().push(vec![
                0x00, 0x01, // transaction id
                0x00, 0x00, // protocol id
                0x00, 0x03, // length
                0x01, // unit
                0x83, // function code
                0x02, // exception code
            ]);
            assert_eq!(port.read(), Ok(Some(())));
            assert_eq!(
                port.read_buffer().err().unwrap(),
                Error::Exception(Exception::IllegalDataAddress)
            );
        }

        #[test]
        fn peer_close_drops_the_connection() {
            let (mut port, link) = tcp_port();
            link.borrow_mut().peer_closed = true;
            assert_eq!(port.read(), Err(Error::TcpDisconnect));
            assert!(!port.is_open());
            assert_eq!(port.state(), PortState::Closed);
        }

        #[test]
        fn read_timeout_closes() {
            let (transport, _link) = MockTransport::tcp(Duration::ZERO);
            let mut port = Port::new(ProtocolType::Tcp, Box::new(transport));
            open(&mut port);
            assert_eq!(port.read(), Err(Error::TcpRead("timeout".into())));
            assert!(!port.is_open());
        }
    }

    #[test]
    fn write_buffer_overflow_is_reported() {
        let (transport, _link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Asc, Box::new(transport));
        let payload = [0; crate::codec::ascii::MAX_PAYLOAD + 1];
        assert_eq!(
            port.write_buffer(1, 0x10, &payload),
            Err(Error::WriteBufferOverflow)
        );
        assert_eq!(port.last_error(), Some(&Error::WriteBufferOverflow));
    }

    #[test]
    fn write_on_closed_port_fails() {
        let (transport, _link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        port.write_buffer(1, 0x07, &[]).unwrap();
        assert!(matches!(port.write(), Err(Error::SerialWrite(_))));
    }

    #[test]
    fn serial_write_failure_keeps_the_line_open() {
        let (transport, link) = MockTransport::serial();
        let mut port = Port::new(ProtocolType::Rtu, Box::new(transport));
        open(&mut port);
        link.borrow_mut().write_error = Some(Error::SerialWrite("broken".into()));

        port.write_buffer(1, 0x07, &[]).unwrap();
        assert_eq!(port.write(), Err(Error::SerialWrite("broken".into())));
        assert_eq!(port.state(), PortState::Opened);
        assert!(port.is_open());
        assert_eq!(port.last_error(), Some(&Error::SerialWrite("broken".into())));
        assert!(link.borrow().sent.is_empty());

        link.borrow_mut().write_error = None;
        assert_eq!(port.write(), Ok(Some(())));
        assert_eq!(link.borrow().sent.len(), 1);
    }

    #[test]
    fn tcp_write_failure_closes_the_connection() {
        let (transport, link) = MockTransport::tcp(Duration::from_secs(1));
        let mut port = Port::new(ProtocolType::Tcp, Box::new(transport));
        open(&mut port);
        link.borrow_mut().write_error = Some(Error::TcpWrite("reset".into()));

        port.write_buffer(1, 0x07, &[]).unwrap();
        assert_eq!(port.write(), Err(Error::TcpWrite("reset".into())));
        assert_eq!(port.state(), PortState::Closed);
        assert!(!port.is_open());
        assert_eq!(link.borrow().close_count, 1);
    }
}
