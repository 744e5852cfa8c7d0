use std::io;

use tracing::{info, warn};

use crate::clock::{elapsed_ms, Clock, SystemClock};
use crate::link::{LinkConfig, SatLink};
use crate::transport::{SerialTransport, Transport};

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub modem_id: Option<u32>,
    pub elapsed_ms: u32,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    pub modem_id: Option<u32>,
    pub probes: Vec<ProbeResult>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
        "/dev/ttyS0".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![9600]
}

/// Tries every device/baud pair in order and stops at the first port that
/// answers the identity query.
pub fn probe_modems<T, C, F>(
    candidate_devs: &[String],
    candidate_bauds: &[u32],
    cfg: &LinkConfig,
    clock: C,
    mut open: F,
) -> AutodetectResult
where
    T: Transport,
    C: Clock + Clone,
    F: FnMut(&str, u32) -> io::Result<T>,
{
    let mut probes = Vec::new();

    for dev in candidate_devs {
        for &baud in candidate_bauds {
            let start = clock.now_ms();
            let mut modem_id = None;

            let note = match open(dev, baud) {
                Ok(transport) => {
                    let mut link = SatLink::new(transport, clock.clone(), cfg.clone());
                    match link.get_id() {
                        Ok(id) => {
                            modem_id = Some(id);
                            format!("id {}", id)
                        }
                        Err(e) => e.to_string(),
                    }
                }
                Err(e) => {
                    warn!("sat autodetect probe failed dev={} baud={} err={}", dev, baud, e);
                    format!("open failed: {}", e)
                }
            };

            probes.push(ProbeResult {
                dev: dev.clone(),
                baud,
                modem_id,
                elapsed_ms: elapsed_ms(clock.now_ms(), start),
                note,
            });

            if modem_id.is_some() {
                info!("sat autodetect: OK {} @ {}", dev, baud);
                return AutodetectResult {
                    chosen: Some((dev.clone(), baud)),
                    modem_id,
                    probes,
                };
            }
        }
    }

    AutodetectResult { chosen: None, modem_id: None, probes }
}

pub fn autodetect_modem(
    candidate_devs: &[String],
    candidate_bauds: &[u32],
    cfg: &LinkConfig,
) -> AutodetectResult {
    probe_modems(candidate_devs, candidate_bauds, cfg, SystemClock::new(), SerialTransport::open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::MockTransport;

    const ID_REPLY: [u8; 9] = [0xAA, 0x09, 0x01, 0x00, 0x12, 0xD6, 0x87, 0x65, 0xFF];

    #[test]
    fn picks_first_answering_port() {
        let clock = ManualClock::default();
        let devs = vec!["/dev/a".to_string(), "/dev/b".to_string(), "/dev/c".to_string()];
        let cfg = LinkConfig { id_attempts: 1, ..LinkConfig::default() };

        let c = clock.clone();
        let res = probe_modems(&devs, &[9600], &cfg, clock.clone(), |dev, _| match dev {
            "/dev/a" => Err(io::Error::new(io::ErrorKind::NotFound, "no such device")),
            "/dev/b" => Ok(MockTransport::new(c.clone())),
            _ => Ok(MockTransport::new(c.clone()).reply(&ID_REPLY)),
        });

        assert_eq!(res.chosen, Some(("/dev/c".to_string(), 9600)));
        assert_eq!(res.modem_id, Some(0x0012_D687));
        assert_eq!(res.probes.len(), 3);
        assert!(res.probes[0].note.starts_with("open failed"));
        assert_eq!(res.probes[1].modem_id, None);
    }

    #[test]
    fn nothing_answers() {
        let clock = ManualClock::default();
        let cfg = LinkConfig { id_attempts: 1, ..LinkConfig::default() };
        let c = clock.clone();
        let res = probe_modems(&["/dev/x".to_string()], &[9600, 19200], &cfg, clock, |_, _| {
            Ok(MockTransport::new(c.clone()))
        });
        assert!(res.chosen.is_none());
        assert_eq!(res.probes.len(), 2);
    }
}
