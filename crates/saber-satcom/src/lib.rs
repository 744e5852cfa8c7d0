pub mod autodetect;
pub mod clock;
pub mod link;
pub mod packet;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use link::{LinkConfig, LinkState, LinkStats, SatLink};
pub use transport::{SerialTransport, Transport};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct SatcomConfig {
    pub enable: bool,

    /// Probe candidate ports with the identity query instead of using
    /// `serial_dev`/`baud`.
    #[serde(default)]
    pub autodetect: bool,

    pub serial_dev: Option<String>,
    pub baud: Option<u32>,

    /// Autodetect candidates, e.g. ["/dev/serial0","/dev/ttyUSB0"]
    pub candidate_devs: Option<Vec<String>>,
    pub candidate_bauds: Option<Vec<u32>>,

    /// Protocol timings; every key is optional.
    #[serde(default)]
    pub link: LinkConfig,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no complete reply packet within {0} ms")]
    Timeout(u32),
    #[error("reply declares length {len}, accepted range is 5..={max}")]
    BadLength { len: u8, max: usize },
    #[error("reply checksum mismatch")]
    Checksum,
    #[error("unexpected reply format cmd=0x{cmd:02X} len={len}")]
    UnexpectedReply { cmd: u8, len: u8 },
    #[error("no identity after {0} attempts")]
    RetriesExhausted(u32),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("transport: {0}")]
    Io(#[from] std::io::Error),
}
