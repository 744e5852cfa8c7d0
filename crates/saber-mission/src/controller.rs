//! Mission phase logic. Not a classic state machine: a handful of
//! orthogonal flags recomputed every tick from a millisecond counter.

use saber_geofence::GeofenceEngine;
use saber_proto::telemetry::{self, TelemetryFields};
use saber_satcom::clock::elapsed_ms;
use tracing::{debug, info, warn};

use crate::baseline::LaunchBaseline;
use crate::config::{ConfigError, KeyValueStore, MissionConfig};
use crate::downlink::TelemetryDownlink;
use crate::gps::{Environment, GpsFix};
use crate::status::StatusSink;
use crate::termination::Termination;

/// 100 ft above the launch baseline.
pub const FLIGHT_ALT_MARGIN_M: f64 = 30.48;
pub const TEST_MODE_SETTLE_MS: u32 = 1_000;
pub const CONFIG_REFRESH_MS: u32 = 3_000;
pub const DEFAULT_TELEMETRY_INTERVAL_S: u32 = 60;

pub const REASON_FORCED: &str = "forced geofence violation";
pub const REASON_TIMER: &str = "flight timer elapsed";

/// Collaborators the controller touches during one tick.
pub struct MissionIo<'a> {
    pub gps: &'a GpsFix,
    pub env: &'a Environment,
    pub geofence: &'a mut GeofenceEngine,
    pub termination: &'a mut dyn Termination,
    pub status: &'a mut dyn StatusSink,
    pub downlink: Option<&'a mut dyn TelemetryDownlink>,
}

pub struct MissionController<S> {
    store: S,
    baseline: LaunchBaseline,

    test_flight: bool,
    flight_mode: bool,
    above_launch: bool,
    timer_start_ms: Option<u32>,

    test_mode: bool,
    test_mode_requested_ms: Option<u32>,
    display_on: bool,

    time_kill_ms: u32,
    satcom_verified: bool,
    last_config_ms: Option<u32>,
    callsign: Option<String>,
    balloon_type: Option<String>,

    ready: Option<bool>,
    geo_shown: Option<(usize, bool)>,

    telemetry_interval_ms: u32,
    last_telemetry_ms: Option<u32>,

    now_ms: u32,
}

impl<S: KeyValueStore> MissionController<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            baseline: LaunchBaseline::default(),
            test_flight: false,
            flight_mode: false,
            above_launch: false,
            timer_start_ms: None,
            test_mode: false,
            test_mode_requested_ms: None,
            display_on: true,
            time_kill_ms: 0,
            satcom_verified: false,
            last_config_ms: None,
            callsign: None,
            balloon_type: None,
            ready: None,
            geo_shown: None,
            telemetry_interval_ms: DEFAULT_TELEMETRY_INTERVAL_S * 1000,
            last_telemetry_ms: None,
            now_ms: 0,
        }
    }

    /// Interval used until the store supplies `telemetry_interval_s`.
    pub fn with_telemetry_interval_s(mut self, secs: u32) -> Self {
        if secs > 0 {
            self.telemetry_interval_ms = secs.saturating_mul(1000);
        }
        self
    }

    /// Prepares the backing store.
    pub fn begin(&mut self) -> Result<(), ConfigError> {
        self.store.begin()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn set_test_flight_mode(&mut self, enabled: bool) {
        if enabled != self.test_flight {
            info!("mission: test-flight override {}", if enabled { "on" } else { "off" });
        }
        self.test_flight = enabled;
    }

    pub fn test_flight_mode(&self) -> bool {
        self.test_flight
    }

    /// Enabling takes effect after a settle delay; disabling is immediate.
    pub fn request_test_mode(&mut self, enabled: bool, now_ms: u32) {
        if enabled {
            if !self.test_mode && self.test_mode_requested_ms.is_none() {
                debug!("mission: test mode requested");
                self.test_mode_requested_ms = Some(now_ms);
            }
        } else {
            if self.test_mode {
                info!("mission: test mode off");
            }
            self.test_mode = false;
            self.test_mode_requested_ms = None;
        }
    }

    pub fn test_mode_active(&self) -> bool {
        self.test_mode
    }

    pub fn flight_mode_active(&self) -> bool {
        self.flight_mode
    }

    pub fn flight_timer_running(&self) -> bool {
        self.timer_start_ms.is_some()
    }

    pub fn flight_timer_elapsed_s(&self) -> u32 {
        self.timer_start_ms
            .map(|t0| elapsed_ms(self.now_ms, t0) / 1000)
            .unwrap_or(0)
    }

    pub fn launch_set(&self) -> bool {
        self.baseline.is_set()
    }

    pub fn launch_altitude_m(&self) -> Option<f64> {
        self.baseline.get().map(|b| b.altitude_m)
    }

    pub fn launch_location(&self) -> Option<(f64, f64)> {
        self.baseline.get().map(|b| (b.lat, b.lon))
    }

    pub fn is_ready(&self) -> bool {
        self.ready.unwrap_or(false)
    }

    pub fn display_on(&self) -> bool {
        self.display_on
    }

    pub fn time_kill_ms(&self) -> u32 {
        self.time_kill_ms
    }

    pub fn satcom_verified(&self) -> bool {
        self.satcom_verified
    }

    pub fn telemetry_interval_s(&self) -> u32 {
        self.telemetry_interval_ms / 1000
    }

    pub fn update(&mut self, now_ms: u32, io: &mut MissionIo<'_>) {
        self.now_ms = now_ms;

        self.refresh_config(now_ms, io.status);

        if let Some(b) = self.baseline.update(io.gps, now_ms) {
            let c = io.geofence.contained_at(b.lat, b.lon);
            if c.has_stay_in && !c.inside {
                warn!("mission: launch site is outside every stay-in zone");
            }
            io.status.set_contained_launch(c.inside);
        }

        self.update_flight_mode(now_ms, io);
        self.update_test_mode(now_ms);
        self.update_display(io.status);

        self.check_geofence(now_ms, io);

        if let Some(t0) = self.timer_start_ms {
            if self.time_kill_ms > 0 && !io.termination.triggered() {
                let elapsed = elapsed_ms(now_ms, t0);
                if elapsed >= self.time_kill_ms {
                    warn!("mission: flight timer {} ms >= kill {} ms", elapsed, self.time_kill_ms);
                    io.termination.trigger(REASON_TIMER);
                }
            }
        }

        self.update_readiness(io.gps, io.status);
        self.send_telemetry(now_ms, io);
    }

    fn refresh_config(&mut self, now_ms: u32, status: &mut dyn StatusSink) {
        if let Some(last) = self.last_config_ms {
            if elapsed_ms(now_ms, last) < CONFIG_REFRESH_MS {
                return;
            }
        }
        self.last_config_ms = Some(now_ms);

        let cfg = match self.store.load().and_then(|doc| MissionConfig::from_doc(&doc)) {
            Ok(cfg) => cfg,
            Err(e) => {
                if self.time_kill_ms != 0 || self.satcom_verified {
                    warn!("mission: config unreadable ({}), kill timer disabled", e);
                } else {
                    debug!("mission: config unreadable: {}", e);
                }
                self.time_kill_ms = 0;
                self.satcom_verified = false;
                return;
            }
        };

        let kill_ms = cfg.time_kill_ms();
        if kill_ms != self.time_kill_ms {
            info!("mission: kill timer {} min", cfg.time_kill_min);
        }
        self.time_kill_ms = kill_ms;
        self.satcom_verified = cfg.satcom_verified;
        if let Some(s) = cfg.telemetry_interval_s.filter(|s| *s > 0) {
            self.telemetry_interval_ms = s.saturating_mul(1000);
        }

        if cfg.callsign.is_some() && cfg.callsign != self.callsign {
            if let Some(cs) = &cfg.callsign {
                status.set_callsign(cs);
            }
            self.callsign = cfg.callsign;
        }
        if cfg.balloon_type.is_some() && cfg.balloon_type != self.balloon_type {
            if let Some(bt) = &cfg.balloon_type {
                status.set_balloon_type(bt);
            }
            self.balloon_type = cfg.balloon_type;
        }
    }

    fn update_flight_mode(&mut self, now_ms: u32, io: &mut MissionIo<'_>) {
        // no fix or no altitude keeps the last altitude verdict
        if let Some(b) = self.baseline.get() {
            if io.gps.fix && io.gps.alt_m.is_finite() {
                self.above_launch = io.gps.alt_m > b.altitude_m + FLIGHT_ALT_MARGIN_M;
            }
        }

        let next = self.test_flight || self.above_launch;
        if next == self.flight_mode {
            return;
        }
        self.flight_mode = next;

        if next {
            if self.timer_start_ms.is_none() {
                self.timer_start_ms = Some(now_ms);
            }
            info!(
                "mission: FLIGHT (override={}, above_launch={})",
                self.test_flight, self.above_launch
            );
            io.status.set_flight_state("FLIGHT");
        } else {
            self.timer_start_ms = None;
            info!("mission: GROUND");
            io.status.set_flight_state("GROUND");
        }
    }

    fn update_test_mode(&mut self, now_ms: u32) {
        if let Some(t0) = self.test_mode_requested_ms {
            if elapsed_ms(now_ms, t0) >= TEST_MODE_SETTLE_MS {
                self.test_mode = true;
                self.test_mode_requested_ms = None;
                info!("mission: test mode on");
            }
        }
    }

    fn update_display(&mut self, status: &mut dyn StatusSink) {
        let want = !self.flight_mode || self.test_mode;
        if want != self.display_on {
            self.display_on = want;
            debug!("mission: display {}", if want { "on" } else { "off" });
            status.set_display_power(want);
        }
    }

    fn check_geofence(&mut self, now_ms: u32, io: &mut MissionIo<'_>) {
        let violated = if io.gps.has_position() {
            io.geofence.evaluate(io.gps.lat, io.gps.lon, now_ms)
        } else {
            false
        };
        let count = io.geofence.rule_count();

        if io.geofence.is_forced() {
            self.show_geo(io.status, count, false);
            io.termination.trigger(REASON_FORCED);
            io.geofence.set_forced(false);
            return;
        }

        if violated {
            self.show_geo(io.status, count, false);
            if self.flight_mode {
                if let Some(v) = io.geofence.violation(0) {
                    io.termination.trigger(&format!("geofence violation: {}", v.rule_id));
                }
            }
        } else if io.gps.has_position() {
            self.show_geo(io.status, count, true);
        }
    }

    fn show_geo(&mut self, status: &mut dyn StatusSink, count: usize, ok: bool) {
        if self.geo_shown != Some((count, ok)) {
            self.geo_shown = Some((count, ok));
            status.set_geo_status(count, ok);
        }
    }

    fn update_readiness(&mut self, gps: &GpsFix, status: &mut dyn StatusSink) {
        let ready = self.baseline.is_set() && self.satcom_verified && gps.fix;
        if self.ready == Some(ready) {
            return;
        }
        self.ready = Some(ready);
        let text = if ready { "READY" } else { "HOLD" };
        info!(
            "mission: {} (launch_set={}, satcom_verified={}, fix={})",
            text,
            self.baseline.is_set(),
            self.satcom_verified,
            gps.fix
        );
        status.set_hold_state(text);
    }

    fn send_telemetry(&mut self, now_ms: u32, io: &mut MissionIo<'_>) {
        let Some(downlink) = io.downlink.as_deref_mut() else {
            return;
        };
        let last = *self.last_telemetry_ms.get_or_insert(now_ms);
        if elapsed_ms(now_ms, last) < self.telemetry_interval_ms {
            return;
        }
        self.last_telemetry_ms = Some(now_ms);

        let fields = telemetry_fields(io.gps, io.env);
        let frame = telemetry::encode(&fields);
        match downlink.send_frame(&frame) {
            Ok(()) => debug!("mission: telemetry frame sent"),
            Err(e) => warn!("mission: telemetry send failed: {}", e),
        }
        io.status.set_satcom_state(downlink.state_text());
    }
}

/// Position fields go out as sentinels while there is no fix.
pub fn telemetry_fields(gps: &GpsFix, env: &Environment) -> TelemetryFields {
    let (lat, lon, alt_m) = if gps.fix {
        (gps.lat, gps.lon, gps.alt_m)
    } else {
        (f64::NAN, f64::NAN, f64::NAN)
    };
    TelemetryFields {
        time_code: gps.time_code,
        lat,
        lon,
        alt_m,
        temp_k: env.temp_k,
        pressure_hpa: env.pressure_hpa,
    }
}
