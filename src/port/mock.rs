// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted in-memory transport for tests

use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

use super::{Timeouts, Transport, TransportKind};
use crate::{Error, Result, Settings};

/// Shared state between a test and its [`MockTransport`].
#[derive(Debug, Default)]
pub(crate) struct Link {
    pub open: bool,
    pub open_error: Option<Error>,
    /// Number of `open` polls that report "in progress"
    pub open_polls: usize,
    pub open_count: usize,
    pub close_count: usize,
    /// Inbound chunks, one per `read` call
    pub incoming: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub peer_closed: bool,
    pub write_error: Option<Error>,
}

impl Link {
    pub fn push(&mut self, chunk: Vec<u8>) {
        self.incoming.push_back(chunk);
    }
}

pub(crate) struct MockTransport {
    link: Rc<RefCell<Link>>,
    kind: TransportKind,
    timeouts: Timeouts,
}

impl MockTransport {
    /// Serial line that completes frames on the first silent poll.
    pub fn serial() -> (Self, Rc<RefCell<Link>>) {
        Self::with(
            TransportKind::Serial,
            Timeouts {
                first_byte: Duration::ZERO,
                inter_byte: Duration::ZERO,
            },
        )
    }

    pub fn tcp(timeout: Duration) -> (Self, Rc<RefCell<Link>>) {
        Self::with(
            TransportKind::Tcp,
            Timeouts {
                first_byte: timeout,
                inter_byte: timeout,
            },
        )
    }

    fn with(kind: TransportKind, timeouts: Timeouts) -> (Self, Rc<RefCell<Link>>) {
        let link = Rc::new(RefCell::new(Link::default()));
        let transport = Self {
            link: Rc::clone(&link),
            kind,
            timeouts,
        };
        (transport, link)
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn name(&self) -> String {
        "mock".into()
    }

    fn configure(&mut self, _: &Settings) -> bool {
        true
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn open(&mut self) -> Result<Option<()>> {
        let mut link = self.link.borrow_mut();
        if let Some(err) = &link.open_error {
            return Err(err.clone());
        }
        if link.open_polls > 0 {
            link.open_polls -= 1;
            return Ok(None);
        }
        link.open = true;
        link.open_count += 1;
        Ok(Some(()))
    }

    fn close(&mut self) {
        let mut link = self.link.borrow_mut();
        link.open = false;
        link.close_count += 1;
    }

    fn is_open(&self) -> bool {
        self.link.borrow().open
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut link = self.link.borrow_mut();
        if let Some(err) = &link.write_error {
            return Err(err.clone());
        }
        link.sent.push(data.to_vec());
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut link = self.link.borrow_mut();
        match link.incoming.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    link.incoming.push_front(chunk.split_off(n));
                }
                Ok(Some(n))
            }
            None if link.peer_closed => Ok(Some(0)),
            None => Ok(None),
        }
    }
}
