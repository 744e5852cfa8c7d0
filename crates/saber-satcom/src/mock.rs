//! Scripted in-memory modem. Each write pops the next scripted reply and
//! makes its bytes readable.

use std::collections::VecDeque;
use std::io;

use crate::clock::{Clock, ManualClock};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub enum Reply {
    Silence,
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub at_ms: u32,
    pub handshake_high: bool,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct MockTransport {
    clock: ManualClock,
    script: VecDeque<Reply>,
    rx: VecDeque<u8>,
    handshake: bool,
    pub writes: Vec<WriteRecord>,
    pub handshake_edges: Vec<(u32, bool)>,
}

impl MockTransport {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            script: VecDeque::new(),
            rx: VecDeque::new(),
            handshake: true,
            writes: Vec::new(),
            handshake_edges: Vec::new(),
        }
    }

    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.script.push_back(Reply::Bytes(bytes.to_vec()));
        self
    }

    pub fn silence(mut self) -> Self {
        self.script.push_back(Reply::Silence);
        self
    }

    /// Bytes that arrive without being asked for.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn handshake(&self) -> bool {
        self.handshake
    }
}

impl Transport for MockTransport {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.rx.pop_front())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writes.push(WriteRecord {
            at_ms: self.clock.now_ms(),
            handshake_high: self.handshake,
            bytes: data.to_vec(),
        });
        if let Some(Reply::Bytes(b)) = self.script.pop_front() {
            self.rx.extend(b);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_handshake(&mut self, high: bool) -> io::Result<()> {
        self.handshake = high;
        self.handshake_edges.push((self.clock.now_ms(), high));
        Ok(())
    }
}
