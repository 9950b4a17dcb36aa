// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    io::{self, Read as _, Write as _},
    net::{Shutdown, TcpStream, ToSocketAddrs as _},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};

use super::{Timeouts, Transport, TransportKind};
use crate::{Error, Result, Settings, TcpSettings};

struct Connecting {
    result: Receiver<Result<TcpStream>>,
    started: Instant,
}

/// Non-blocking TCP connection.
///
/// Connecting happens on a helper thread so that [`Transport::open`]
/// never blocks the polling thread.
pub struct TcpTransport {
    settings: TcpSettings,
    stream: Option<TcpStream>,
    connecting: Option<Connecting>,
}

impl TcpTransport {
    #[must_use]
    pub const fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            stream: None,
            connecting: None,
        }
    }

    /// Wrap a connection accepted by a listener.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map_err(|err| Error::TcpAccept(err.to_string()))?;
        stream
            .set_nonblocking(true)
            .map_err(|err| Error::TcpAccept(err.to_string()))?;
        let settings = TcpSettings {
            host: peer.ip().to_string(),
            port: peer.port(),
            timeout,
        };
        Ok(Self {
            settings,
            stream: Some(stream),
            connecting: None,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    fn start_connect(&self) -> Connecting {
        let (tx, rx) = mpsc::channel();
        let TcpSettings {
            host,
            port,
            timeout,
        } = self.settings.clone();
        thread::spawn(move || {
            // The receiver is gone if the attempt was abandoned.
            let _ = tx.send(connect(&host, port, timeout));
        });
        Connecting {
            result: rx,
            started: Instant::now(),
        }
    }
}

fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|err| Error::TcpCreate(err.to_string()))?;
    let timeout = timeout.max(Duration::from_millis(1));
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(Error::TcpConnect(last_err.map_or_else(
        || format!("no address for {host}:{port}"),
        |err| err.to_string(),
    )))
}

fn is_pending(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn name(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    fn configure(&mut self, settings: &Settings) -> bool {
        if self.settings == settings.tcp {
            return false;
        }
        self.settings = settings.tcp.clone();
        true
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            first_byte: self.settings.timeout,
            inter_byte: self.settings.timeout,
        }
    }

    fn open(&mut self) -> Result<Option<()>> {
        if self.stream.is_some() {
            return Ok(Some(()));
        }
        let connecting = match self.connecting.take() {
            Some(connecting) => connecting,
            None => self.start_connect(),
        };
        match connecting.result.try_recv() {
            Ok(Ok(stream)) => {
                stream
                    .set_nonblocking(true)
                    .map_err(|err| Error::TcpConnect(err.to_string()))?;
                if let Err(err) = stream.set_nodelay(true) {
                    log::debug!("{}: failed to disable Nagle: {err}", self.name());
                }
                self.stream = Some(stream);
                Ok(Some(()))
            }
            Ok(Err(err)) => Err(err),
            Err(TryRecvError::Empty) => {
                if connecting.started.elapsed() >= self.settings.timeout {
                    return Err(Error::TcpConnect("timeout".into()));
                }
                self.connecting = Some(connecting);
                Ok(None)
            }
            Err(TryRecvError::Disconnected) => {
                Err(Error::TcpConnect("connect attempt aborted".into()))
            }
        }
    }

    fn close(&mut self) {
        self.connecting = None;
        if let Some(stream) = self.stream.take() {
            // The peer may already have gone.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let Some(stream) = &mut self.stream else {
            return Err(Error::TcpWrite("not connected".into()));
        };
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(err) if is_pending(&err) => Ok(0),
            Err(err) => Err(Error::TcpWrite(err.to_string())),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(stream) = &mut self.stream else {
            return Err(Error::TcpRead("not connected".into()));
        };
        match stream.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(err) if is_pending(&err) => Ok(None),
            Err(err) => Err(Error::TcpRead(err.to_string())),
        }
    }
}
