mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use saber_geofence::geometry::point_in_polygon;
use saber_geofence::{doctor as geo_doctor, GeofenceEngine, LineAxis, RuleKind, DEFAULT_SUSTAIN_MS};
use saber_mission::{
    JsonFileStore, KeyValueStore, MissionConfig, MissionController, MissionIo, StatusSink,
    SystemStatus, TelemetryDownlink, Termination, TerminationLatch,
};
use saber_proto::telemetry::{self, TelemetryFields};
use saber_satcom::autodetect::{autodetect_modem, default_candidate_bauds, default_candidate_devs};
use saber_satcom::{Clock, SatLink, SatcomConfig, SerialTransport, SystemClock};

use replay::GpsReplay;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Modem = SatLink<SerialTransport, SystemClock>;

#[derive(Debug, Parser)]
#[command(name = "saber", version, about = "SABER - balloon flight-safety core")]
struct Cli {
    #[arg(long, default_value = "saber.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    Run,
    /// Print a raw telemetry frame as hex.
    Encode {
        #[arg(long)]
        time: u32,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        alt: Option<f64>,
        #[arg(long)]
        temp: Option<f64>,
        #[arg(long)]
        pressure: Option<f64>,
    },
    Geofence { #[command(subcommand)] cmd: GeofenceCmd },
    Sat { #[command(subcommand)] cmd: SatCmd },
}

#[derive(Debug, Subcommand)]
enum GeofenceCmd {
    /// Show how a position relates to every loaded rule.
    Check {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

#[derive(Debug, Subcommand)]
enum SatCmd {
    /// Identity query with retries.
    GetId,
    /// Single diagnostic command, reply printed as hex.
    Query {
        /// Command id, hex (e.g. 01)
        #[arg(long)]
        cmd: String,
        /// Payload bytes, hex
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u32>,
    },
    /// Raw DEADBEEF frame, then listen for a second.
    Ping,
    /// Probe serial ports for a modem that answers the identity query.
    Detect,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    mission: MissionCfg,
    gps: GpsCfg,
    satcom: Option<SatcomConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct MissionCfg {
    #[serde(default = "default_tick_ms")]
    tick_ms: u64,
    store_path: String,
    geofence_path: String,
    sustain_ms: Option<u32>,
    telemetry_interval_s: Option<u32>,
    #[serde(default)]
    test_flight: bool,
}

fn default_tick_ms() -> u64 {
    200
}

#[derive(Debug, Clone, serde::Deserialize)]
struct GpsCfg {
    track: String,
    #[serde(default)]
    loop_track: bool,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Encode { time, lat, lon, alt, temp, pressure } => {
            encode(time, lat, lon, alt, temp, pressure);
            Ok(())
        }
        Command::Doctor => doctor(&load_config(&cli.config)?),
        Command::Run => run(load_config(&cli.config)?).await,
        Command::Geofence { cmd } => geofence_cmd(&load_config(&cli.config)?, cmd),
        Command::Sat { cmd } => sat_cmd(&load_config(&cli.config)?, cmd),
    }
}

fn encode(
    time: u32,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    temp: Option<f64>,
    pressure: Option<f64>,
) {
    let fields = TelemetryFields {
        time_code: time,
        lat: lat.unwrap_or(f64::NAN),
        lon: lon.unwrap_or(f64::NAN),
        alt_m: alt.unwrap_or(f64::NAN),
        temp_k: temp.unwrap_or(f64::NAN),
        pressure_hpa: pressure.unwrap_or(f64::NAN),
    };
    println!("{}", hex::encode(telemetry::encode(&fields)));
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    anyhow::ensure!(cfg.mission.tick_ms > 0, "mission.tick_ms must be > 0");
    let sustain = cfg.mission.sustain_ms.unwrap_or(DEFAULT_SUSTAIN_MS);
    geo_doctor::check_sustain(sustain)?;

    let mut engine = GeofenceEngine::new(sustain);
    let n = engine
        .load_from_path(&cfg.mission.geofence_path)
        .context("geofence rule file")?;
    geo_doctor::check_rules(engine.rules())?;
    info!("doctor: {} geofence rules OK", n);

    let store = JsonFileStore::new(&cfg.mission.store_path);
    match store.load().and_then(|doc| MissionConfig::from_doc(&doc)) {
        Ok(m) => {
            info!("doctor: mission {}", serde_json::to_string(&m)?);
            if m.time_kill_min == 0 {
                warn!("doctor: time_kill_min=0, flight timer kill disabled");
            }
            if !m.satcom_verified {
                warn!("doctor: satcom_verified=false, mission will HOLD");
            }
        }
        Err(e) => warn!("doctor: mission store {}: {}", cfg.mission.store_path, e),
    }

    let track = GpsReplay::open(&cfg.gps.track, cfg.gps.loop_track)?;
    info!("doctor: gps track {} samples", track.len());

    if let Some(sc) = &cfg.satcom {
        if sc.enable {
            if sc.autodetect {
                info!("doctor: satcom autodetect enabled (OK)");
            } else {
                anyhow::ensure!(
                    sc.serial_dev.as_ref().map(|s| !s.is_empty()).unwrap_or(false),
                    "satcom.serial_dev missing"
                );
                anyhow::ensure!(sc.baud.unwrap_or(0) > 0, "satcom.baud invalid");
            }
        }
    }

    info!("doctor: OK");
    Ok(())
}

fn geofence_cmd(cfg: &Config, cmd: GeofenceCmd) -> Result<()> {
    match cmd {
        GeofenceCmd::Check { lat, lon } => {
            let mut engine = GeofenceEngine::new(cfg.mission.sustain_ms.unwrap_or(DEFAULT_SUSTAIN_MS));
            engine
                .load_from_path(&cfg.mission.geofence_path)
                .context("geofence rule file")?;

            let c = engine.contained_at(lat, lon);
            println!("position lat={} lon={}", lat, lon);
            println!("contained={} stay_in_rules={}", c.inside, c.has_stay_in);
            for rule in engine.rules() {
                let verdict = match &rule.kind {
                    RuleKind::KeepOut { polygon } => {
                        let inside = point_in_polygon(polygon, lat, lon);
                        format!("keep_out inside={}{}", inside, if inside { " VIOLATION" } else { "" })
                    }
                    RuleKind::StayIn { polygon, .. } => {
                        let inside = point_in_polygon(polygon, lat, lon);
                        format!("stay_in inside={}{}", inside, if inside { "" } else { " (violation once armed)" })
                    }
                    RuleKind::Line { axis, value } => {
                        let (coord, name) = match axis {
                            LineAxis::NorthSouth => (lon, "lon"),
                            LineAxis::EastWest => (lat, "lat"),
                        };
                        let side = if coord < *value { "below" } else if coord > *value { "above" } else { "on" };
                        format!("line {}={} {} {}", name, value, side, rule.detail)
                    }
                };
                println!("rule {}: {}", rule.id, verdict);
            }
            Ok(())
        }
    }
}

fn satcom_cfg(cfg: &Config) -> Result<&SatcomConfig> {
    let sc = cfg.satcom.as_ref().context("no [satcom] config section")?;
    anyhow::ensure!(sc.enable, "satcom.enable=false");
    Ok(sc)
}

fn sat_cmd(cfg: &Config, cmd: SatCmd) -> Result<()> {
    let sc = satcom_cfg(cfg)?;
    match cmd {
        SatCmd::Detect => {
            let res = run_sat_autodetect(sc);
            if let Some((dev, baud)) = &res.chosen {
                println!("CHOSEN: {} @ {}", dev, baud);
            } else {
                println!("CHOSEN: none");
            }
            for p in res.probes {
                println!("probe dev={} baud={} {}ms note={}", p.dev, p.baud, p.elapsed_ms, p.note);
            }
            Ok(())
        }
        SatCmd::GetId => {
            let mut link = open_modem(sc)?;
            let id = link.get_id().context("get id")?;
            println!("modem id {} (0x{:08X})", id, id);
            Ok(())
        }
        SatCmd::Query { cmd, payload, timeout_ms } => {
            let cmd = parse_hex_byte(&cmd)?;
            let payload = match payload {
                Some(p) => hex::decode(p.trim()).context("payload hex")?,
                None => Vec::new(),
            };
            let mut link = open_modem(sc)?;
            let rx = match timeout_ms {
                Some(t) => link.query(cmd, &payload, t),
                None => link.query_default(cmd, &payload),
            }
            .context("query")?;
            println!("{}", hex::encode(rx));
            Ok(())
        }
        SatCmd::Ping => {
            let mut link = open_modem(sc)?;
            let heard = link.ping().context("ping")?;
            if heard.is_empty() {
                println!("no reply");
            } else {
                println!("{}", hex::encode(heard));
            }
            Ok(())
        }
    }
}

fn parse_hex_byte(s: &str) -> Result<u8> {
    let s = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).with_context(|| format!("bad command id '{}'", s))
}

fn run_sat_autodetect(sc: &SatcomConfig) -> saber_satcom::autodetect::AutodetectResult {
    let devs = sc.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
    let bauds = sc.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
    autodetect_modem(&devs, &bauds, &sc.link)
}

fn resolve_sat_port(sc: &SatcomConfig) -> Result<(String, u32)> {
    if sc.autodetect {
        let res = run_sat_autodetect(sc);
        if let Some((dev, baud)) = res.chosen {
            return Ok((dev, baud));
        }
        anyhow::bail!("satcom autodetect failed: no modem answered");
    } else {
        let dev = sc.serial_dev.clone().context("satcom.serial_dev missing (autodetect=false)")?;
        let baud = sc.baud.context("satcom.baud missing (autodetect=false)")?;
        Ok((dev, baud))
    }
}

fn open_modem(sc: &SatcomConfig) -> Result<Modem> {
    let (dev, baud) = resolve_sat_port(sc)?;
    let transport = SerialTransport::open(&dev, baud).with_context(|| format!("open {}", dev))?;
    Ok(SatLink::new(transport, SystemClock::new(), sc.link.clone()))
}

async fn run(cfg: Config) -> Result<()> {
    info!("run: starting");

    let sustain = cfg.mission.sustain_ms.unwrap_or(DEFAULT_SUSTAIN_MS);
    let mut geofence = GeofenceEngine::new(sustain);
    if let Err(e) = geofence.load_from_path(&cfg.mission.geofence_path) {
        // no rules means no violations; keep flying
        warn!("run: geofence disabled: {}", e);
    }

    let mut controller = MissionController::new(JsonFileStore::new(&cfg.mission.store_path))
        .with_telemetry_interval_s(cfg.mission.telemetry_interval_s.unwrap_or(0));
    if let Err(e) = controller.begin() {
        warn!("run: mission store not ready: {}", e);
    }
    controller.set_test_flight_mode(cfg.mission.test_flight);

    let replay = GpsReplay::open(&cfg.gps.track, cfg.gps.loop_track)?;

    let mut status = SystemStatus::default();
    let modem = match cfg.satcom.as_ref().filter(|s| s.enable) {
        Some(sc) => match open_modem(sc) {
            Ok(mut link) => {
                if let Err(e) = link.get_id() {
                    warn!("run: modem identity unknown: {}", e);
                }
                status.set_satcom_state(link.state().as_str());
                Some(link)
            }
            Err(e) => {
                warn!("run: satcom unavailable: {:#}", e);
                status.set_satcom_state("NO RSP");
                None
            }
        },
        None => None,
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop2 = stop.clone();
    let tick = std::time::Duration::from_millis(cfg.mission.tick_ms);

    // The loop blocks inside modem exchanges, so it gets its own thread.
    let handle = tokio::task::spawn_blocking(move || {
        control_loop(controller, geofence, replay, modem, status, tick, &stop2)
    });

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("run: stopping");
    stop.store(true, Ordering::Relaxed);

    let (status, term) = handle.await.context("control loop")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if let Some(reason) = term.reason() {
        println!("TERMINATED: {}", reason);
    }
    Ok(())
}

fn control_loop(
    mut controller: MissionController<JsonFileStore>,
    mut geofence: GeofenceEngine,
    mut replay: GpsReplay,
    mut modem: Option<Modem>,
    mut status: SystemStatus,
    tick: std::time::Duration,
    stop: &AtomicBool,
) -> (SystemStatus, TerminationLatch) {
    let clock = SystemClock::new();
    let mut term = TerminationLatch::new();
    let mut reported = false;

    while !stop.load(Ordering::Relaxed) {
        let now = clock.now_ms();
        let (gps, env) = replay.next_sample();

        {
            let downlink = modem.as_mut().map(|m| m as &mut dyn TelemetryDownlink);
            let mut io = MissionIo {
                gps: &gps,
                env: &env,
                geofence: &mut geofence,
                termination: &mut term,
                status: &mut status,
                downlink,
            };
            controller.update(now, &mut io);
        }

        if let Some(m) = modem.as_mut() {
            if let Err(e) = m.poll() {
                warn!("run: satcom poll: {}", e);
            }
        }

        if term.triggered() && !reported {
            reported = true;
            error!(
                "run: TERMINATION latched: {}",
                term.reason().unwrap_or_default()
            );
        }

        std::thread::sleep(tick);
    }

    (status, term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            [mission]
            tick_ms = 100
            store_path = "/data/mission_active.json"
            geofence_path = "/data/geofence.json"
            telemetry_interval_s = 120

            [gps]
            track = "track.jsonl"

            [satcom]
            enable = true
            serial_dev = "/dev/ttyUSB0"
            baud = 19200

            [satcom.link]
            id_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mission.tick_ms, 100);
        assert!(!cfg.mission.test_flight);
        let sc = cfg.satcom.unwrap();
        assert_eq!(sc.link.id_attempts, 3);
        assert_eq!(sc.link.id_timeout_ms, 1500);
        assert!(!sc.autodetect);
    }

    #[test]
    fn satcom_section_optional() {
        let cfg: Config = toml::from_str(
            r#"
            [mission]
            store_path = "m.json"
            geofence_path = "g.json"
            [gps]
            track = "t.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mission.tick_ms, 200);
        assert!(cfg.satcom.is_none());
        assert!(satcom_cfg(&cfg).is_err());
    }

    #[test]
    fn command_id_hex() {
        assert_eq!(parse_hex_byte("01").unwrap(), 0x01);
        assert_eq!(parse_hex_byte("0xFF").unwrap(), 0xFF);
        assert!(parse_hex_byte("zz").is_err());
    }
}
