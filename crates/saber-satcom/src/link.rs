use std::fmt;

use saber_proto::crc::{verify_trailing, CrcOrder};
use saber_proto::SYNC;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::clock::{elapsed_ms, Clock};
use crate::packet::{self, CMD_GET_ID, CMD_NAK, MAX_FRAME_LEN, MIN_PACKET_LEN};
use crate::transport::Transport;
use crate::LinkError;

/// Timings and policy of the modem link. Defaults are the values the modem
/// was qualified with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub wake_low_ms: u32,
    pub wake_high_ms: u32,
    /// Extra settle after wake before a documented command.
    pub command_settle_ms: u32,
    pub handshake_guard_ms: u32,
    /// How long the line is held low before a raw frame goes out.
    pub raw_low_ms: u32,
    pub id_attempts: u32,
    pub id_timeout_ms: u32,
    pub no_reply_backoff_ms: u32,
    pub busy_backoff_ms: u32,
    pub query_timeout_ms: u32,
    pub id_rx_capacity: usize,
    pub query_rx_capacity: usize,
    pub verify_checksum: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            wake_low_ms: 70,
            wake_high_ms: 70,
            command_settle_ms: 150,
            handshake_guard_ms: 2,
            raw_low_ms: 3,
            id_attempts: 5,
            id_timeout_ms: 1500,
            no_reply_backoff_ms: 250,
            busy_backoff_ms: 400,
            query_timeout_ms: 1000,
            id_rx_capacity: 64,
            query_rx_capacity: 128,
            verify_checksum: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Init,
    IdOk,
    NoResponse,
    Tx,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Init => "INIT",
            LinkState::IdOk => "ID OK",
            LinkState::NoResponse => "NO RSP",
            LinkState::Tx => "TX",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub total_rx: u64,
    pub total_tx: u64,
}

/// Half-duplex link to the satellite modem. One request at a time; every
/// call blocks until its own timeout/retry policy completes.
pub struct SatLink<T, C> {
    transport: T,
    clock: C,
    cfg: LinkConfig,
    stats: LinkStats,
    state: LinkState,
    modem_id: Option<u32>,
    last_summary_ms: Option<u32>,
    rx_snapshot: u64,
}

impl<T: Transport, C: Clock> SatLink<T, C> {
    pub fn new(transport: T, clock: C, cfg: LinkConfig) -> Self {
        Self {
            transport,
            clock,
            cfg,
            stats: LinkStats::default(),
            state: LinkState::Init,
            modem_id: None,
            last_summary_ms: None,
            rx_snapshot: 0,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn modem_id(&self) -> Option<u32> {
        self.modem_id
    }

    fn wake(&mut self) -> Result<(), LinkError> {
        self.transport.set_handshake(false)?;
        self.clock.sleep_ms(self.cfg.wake_low_ms);
        self.transport.set_handshake(true)?;
        self.clock.sleep_ms(self.cfg.wake_high_ms);
        Ok(())
    }

    /// Sends a documented command. The handshake line stays high for the
    /// whole write.
    pub fn send_command(&mut self, cmd: u8, payload: &[u8]) -> Result<(), LinkError> {
        let msg = packet::build_command(cmd, payload)?;

        self.wake()?;
        self.clock.sleep_ms(self.cfg.command_settle_ms);
        self.transport.set_handshake(true)?;
        self.clock.sleep_ms(self.cfg.handshake_guard_ms);

        self.transport.write_all(&msg)?;
        self.transport.flush()?;
        self.stats.total_tx += msg.len() as u64;
        debug!("sat: TX {}", hex::encode(&msg));
        Ok(())
    }

    /// Writes a pre-built frame verbatim using the legacy raw sequence:
    /// the handshake line is pulled low during the write. No reply is
    /// awaited.
    pub fn send_raw(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(LinkError::FrameTooLarge { len: frame.len(), max: MAX_FRAME_LEN });
        }
        self.wake()?;
        self.transport.set_handshake(false)?;
        self.clock.sleep_ms(self.cfg.raw_low_ms);
        let written = self
            .transport
            .write_all(frame)
            .and_then(|_| self.transport.flush());
        // release the line even if the write failed
        self.transport.set_handshake(true)?;
        written?;

        self.stats.total_tx += frame.len() as u64;
        self.state = LinkState::Tx;
        info!("sat: sent raw frame len={}", frame.len());
        debug!("sat: TX {}", hex::encode(frame));
        Ok(())
    }

    fn read_with_timeout(&mut self, t0: u32, timeout_ms: u32) -> Result<Option<u8>, LinkError> {
        while elapsed_ms(self.clock.now_ms(), t0) < timeout_ms {
            if let Some(b) = self.transport.read_byte()? {
                self.stats.total_rx += 1;
                return Ok(Some(b));
            }
            self.clock.sleep_ms(1);
        }
        Ok(None)
    }

    /// Reads one `AA LEN ...` packet.
    pub fn read_packet(&mut self, max_len: usize, timeout_ms: u32) -> Result<Vec<u8>, LinkError> {
        let mut buf = Vec::with_capacity(max_len);

        // scan for sync
        let t0 = self.clock.now_ms();
        loop {
            match self.read_with_timeout(t0, timeout_ms)? {
                Some(SYNC) => {
                    buf.push(SYNC);
                    break;
                }
                Some(_) => continue,
                None => return Err(LinkError::Timeout(timeout_ms)),
            }
        }

        // the length byte and body share a fresh window
        let t0 = self.clock.now_ms();
        let len = self
            .read_with_timeout(t0, timeout_ms)?
            .ok_or(LinkError::Timeout(timeout_ms))?;
        buf.push(len);
        if len < MIN_PACKET_LEN || len as usize > max_len {
            return Err(LinkError::BadLength { len, max: max_len });
        }

        while buf.len() < len as usize {
            match self.read_with_timeout(t0, timeout_ms)? {
                Some(b) => buf.push(b),
                None => return Err(LinkError::Timeout(timeout_ms)),
            }
        }
        debug!("sat: RX {}", hex::encode(&buf));

        if self.cfg.verify_checksum && !verify_trailing(&buf, CrcOrder::HighFirst) {
            return Err(LinkError::Checksum);
        }
        Ok(buf)
    }

    /// Identity query with retries: silence or a damaged reply backs off
    /// briefly, busy/NAK backs off longer, any other reply shape aborts.
    pub fn get_id(&mut self) -> Result<u32, LinkError> {
        info!("sat: get id (0x{:02X})", CMD_GET_ID);
        let attempts = self.cfg.id_attempts;

        for attempt in 1..=attempts {
            debug!("sat: get id attempt {}/{}", attempt, attempts);
            self.send_command(CMD_GET_ID, &[])?;

            let rx = match self.read_packet(self.cfg.id_rx_capacity, self.cfg.id_timeout_ms) {
                Ok(rx) => rx,
                Err(e @ (LinkError::Timeout(_) | LinkError::BadLength { .. } | LinkError::Checksum)) => {
                    warn!("sat: get id: {}", e);
                    self.clock.sleep_ms(self.cfg.no_reply_backoff_ms);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (len, cmd) = (rx[1], rx[2]);
            if cmd == CMD_NAK {
                warn!("sat: get id: modem busy");
                self.clock.sleep_ms(self.cfg.busy_backoff_ms);
                continue;
            }

            return match packet::decode_id(&rx) {
                Some(id) => {
                    info!("sat: modem id {} (0x{:08X})", id, id);
                    self.modem_id = Some(id);
                    self.state = LinkState::IdOk;
                    Ok(id)
                }
                None => {
                    warn!("sat: get id: unexpected reply cmd=0x{:02X} len={}", cmd, len);
                    Err(LinkError::UnexpectedReply { cmd, len })
                }
            };
        }

        warn!("sat: get id: giving up after {} attempts", attempts);
        self.state = LinkState::NoResponse;
        Err(LinkError::RetriesExhausted(attempts))
    }

    /// Single-shot diagnostic query; returns the raw reply packet.
    pub fn query(&mut self, cmd: u8, payload: &[u8], timeout_ms: u32) -> Result<Vec<u8>, LinkError> {
        info!("sat: query cmd=0x{:02X}", cmd);
        self.send_command(cmd, payload)?;
        let rx = self.read_packet(self.cfg.query_rx_capacity, timeout_ms)?;
        info!("sat: reply ({} bytes): {}", rx.len(), hex::encode(&rx));
        Ok(rx)
    }

    pub fn query_default(&mut self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
        let timeout = self.cfg.query_timeout_ms;
        self.query(cmd, payload, timeout)
    }

    /// Raw-frame exercise: sends `DE AD BE EF` and collects whatever comes
    /// back within a second.
    pub fn ping(&mut self) -> Result<Vec<u8>, LinkError> {
        let frame = packet::build_raw(&[0xDE, 0xAD, 0xBE, 0xEF])?;
        self.send_raw(&frame)?;
        let heard = self.drain_for(1000)?;
        if heard.is_empty() {
            info!("sat: ping: no bytes");
        } else {
            info!("sat: ping: {}", hex::encode(&heard));
        }
        Ok(heard)
    }

    fn drain_for(&mut self, ms: u32) -> Result<Vec<u8>, LinkError> {
        let t0 = self.clock.now_ms();
        let mut heard = Vec::new();
        while elapsed_ms(self.clock.now_ms(), t0) < ms {
            while let Some(b) = self.transport.read_byte()? {
                self.stats.total_rx += 1;
                heard.push(b);
            }
            self.clock.sleep_ms(2);
        }
        Ok(heard)
    }

    /// Drops unsolicited bytes and logs a once-per-second rate summary.
    pub fn poll(&mut self) -> Result<(), LinkError> {
        while self.transport.read_byte()?.is_some() {
            self.stats.total_rx += 1;
        }

        let now = self.clock.now_ms();
        let due = match self.last_summary_ms {
            None => true,
            Some(t) => elapsed_ms(now, t) >= 1000,
        };
        if due {
            let per_sec = self.stats.total_rx - self.rx_snapshot;
            self.rx_snapshot = self.stats.total_rx;
            self.last_summary_ms = Some(now);
            debug!(
                "sat: rx bytes/s={} total_rx={} total_tx={}",
                per_sec, self.stats.total_rx, self.stats.total_tx
            );
        }
        Ok(())
    }
}
