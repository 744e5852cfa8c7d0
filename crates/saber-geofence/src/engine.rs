use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::geometry::{crossed_line, point_in_polygon};
use crate::rules::{Point, Rule, RuleKind, RuleSet, RuleSource};
use crate::GeofenceError;

/// How long a candidate violation must persist before it is reported.
pub const DEFAULT_SUSTAIN_MS: u32 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    KeepOut,
    StayIn,
    Line,
    Test,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::KeepOut => "keep_out",
            ViolationKind::StayIn => "stay_in",
            ViolationKind::Line => "line",
            ViolationKind::Test => "test",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule_id: String,
    pub kind: ViolationKind,
    pub detail: String,
}

impl Violation {
    fn for_rule(rule: &Rule, detail: &str) -> Self {
        let kind = match rule.kind {
            RuleKind::KeepOut { .. } => ViolationKind::KeepOut,
            RuleKind::StayIn { .. } => ViolationKind::StayIn,
            RuleKind::Line { .. } => ViolationKind::Line,
        };
        Self { rule_id: rule.id.clone(), kind, detail: detail.to_string() }
    }

    fn forced() -> Self {
        Self {
            rule_id: "force".into(),
            kind: ViolationKind::Test,
            detail: "forced geofence violation".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Containment {
    pub inside: bool,
    pub has_stay_in: bool,
}

/// Single shared sustain window across all rules.
#[derive(Debug, Clone)]
struct Debounce {
    window_ms: u32,
    pending_since: Option<u32>,
}

impl Debounce {
    /// Returns true when candidates should be surfaced this tick.
    fn admit(&mut self, any_candidate: bool, now_ms: u32) -> bool {
        if !any_candidate {
            if self.pending_since.take().is_some() {
                debug!("geofence: candidate cleared before sustain window");
            }
            return false;
        }
        match self.pending_since {
            None => {
                self.pending_since = Some(now_ms);
                info!("geofence: candidate violation, sustain window {} ms started", self.window_ms);
                false
            }
            Some(t0) => now_ms.wrapping_sub(t0) >= self.window_ms,
        }
    }

    fn reset(&mut self) {
        self.pending_since = None;
    }
}

pub struct GeofenceEngine {
    rules: RuleSet,
    loaded: bool,
    violations: Vec<Violation>,
    prev: Option<Point>,
    debounce: Debounce,
    forced: bool,
}

impl Default for GeofenceEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SUSTAIN_MS)
    }
}

impl GeofenceEngine {
    pub fn new(sustain_ms: u32) -> Self {
        Self {
            rules: Vec::new(),
            loaded: false,
            violations: Vec::new(),
            prev: None,
            debounce: Debounce { window_ms: sustain_ms, pending_since: None },
            forced: false,
        }
    }

    /// Replaces the rule set. The new set is built completely before it is
    /// swapped in, so evaluation never sees a partial reload.
    pub fn load(&mut self, source: RuleSource) -> usize {
        let rules = source.into_rules();
        self.install(rules);
        self.rules.len()
    }

    pub fn load_from_str(&mut self, json: &str) -> Result<usize, GeofenceError> {
        match serde_json::from_str::<RuleSource>(json) {
            Ok(src) => Ok(self.load(src)),
            Err(e) => {
                self.clear_rules();
                warn!("geofence: rule source rejected, running with no rules: {}", e);
                Err(e.into())
            }
        }
    }

    pub fn load_from_path(&mut self, path: impl AsRef<Path>) -> Result<usize, GeofenceError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                self.clear_rules();
                warn!("geofence: cannot read {}: {}; running with no rules", path.display(), e);
                return Err(GeofenceError::Io { path: path.display().to_string(), source: e });
            }
        };
        let n = self.load_from_str(&text)?;
        info!("geofence: loaded {} rules from {}", n, path.display());
        Ok(n)
    }

    fn install(&mut self, rules: RuleSet) {
        self.rules = rules;
        self.loaded = true;
        self.violations.clear();
        self.prev = None;
        self.debounce.reset();
    }

    fn clear_rules(&mut self) {
        self.rules.clear();
        self.loaded = false;
        self.violations.clear();
        self.prev = None;
        self.debounce.reset();
    }

    /// Evaluates a position. Returns true when a violation is reported
    /// after the sustain filter.
    pub fn evaluate(&mut self, lat: f64, lon: f64, now_ms: u32) -> bool {
        let cur = Point { lat, lon };
        self.violations.clear();

        if self.forced {
            self.violations.push(Violation::forced());
            self.prev = Some(cur);
            return true;
        }
        if !self.loaded {
            self.prev = Some(cur);
            return false;
        }

        let prev = self.prev;
        for rule in &mut self.rules {
            let detail = match &mut rule.kind {
                RuleKind::KeepOut { polygon } => {
                    point_in_polygon(polygon, lat, lon).then_some("entered keep-out")
                }
                RuleKind::StayIn { polygon, armed } => {
                    let inside = point_in_polygon(polygon, lat, lon);
                    if !*armed {
                        if inside {
                            *armed = true;
                            info!("geofence: stay-in '{}' armed", rule.id);
                        }
                        None
                    } else if inside {
                        None
                    } else {
                        Some("left stay-in")
                    }
                }
                RuleKind::Line { axis, value } => match prev {
                    Some(p) if crossed_line(*axis, *value, p, cur) => Some("crossed line"),
                    _ => None,
                },
            };
            if let Some(detail) = detail {
                self.violations.push(Violation::for_rule(rule, detail));
            }
        }

        if !self.debounce.admit(!self.violations.is_empty(), now_ms) {
            self.violations.clear();
        } else {
            for v in &self.violations {
                warn!("geofence: {} '{}' {}", v.kind, v.rule_id, v.detail);
            }
        }

        self.prev = Some(cur);
        !self.violations.is_empty()
    }

    /// Test hook. While enabled every evaluation reports one synthetic
    /// violation and bypasses the sustain window.
    pub fn set_forced(&mut self, enabled: bool) {
        self.forced = enabled;
        if !enabled {
            self.violations.clear();
        }
        self.debounce.reset();
        info!("geofence: forced violation {}", if enabled { "enabled" } else { "cleared" });
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Read-only stay-in containment query; touches neither arming nor
    /// history nor the sustain window.
    pub fn contained_at(&self, lat: f64, lon: f64) -> Containment {
        let mut has_stay_in = false;
        let mut inside = false;
        for rule in &self.rules {
            if let RuleKind::StayIn { polygon, .. } = &rule.kind {
                has_stay_in = true;
                if point_in_polygon(polygon, lat, lon) {
                    inside = true;
                    break;
                }
            }
        }
        Containment { inside: has_stay_in && inside, has_stay_in }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn violation(&self, idx: usize) -> Option<&Violation> {
        self.violations.get(idx)
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn clear_violations(&mut self) {
        self.violations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SUSTAIN: u32 = DEFAULT_SUSTAIN_MS;

    // 1x1 degree box around (40.5, -104.5)
    const BOX: &str = "[[40.0, -105.0], [40.0, -104.0], [41.0, -104.0], [41.0, -105.0]]";

    fn engine_with(json: &str) -> GeofenceEngine {
        let mut g = GeofenceEngine::default();
        g.load_from_str(json).unwrap();
        g
    }

    /// Runs `evaluate` until the sustain window has elapsed for a
    /// position that keeps asserting the same candidate.
    fn sustained(g: &mut GeofenceEngine, lat: f64, lon: f64, t0: u32) -> bool {
        assert!(!g.evaluate(lat, lon, t0));
        g.evaluate(lat, lon, t0.wrapping_add(SUSTAIN))
    }

    #[test]
    fn keep_out_reports_after_sustain() {
        let mut g = engine_with(&format!(r#"{{"keep_out": [{{"id": "ko", "polygon": {BOX}}}]}}"#));
        assert!(!g.evaluate(40.5, -104.5, 0));
        assert!(!g.evaluate(40.5, -104.5, SUSTAIN - 1));
        assert!(g.evaluate(40.5, -104.5, SUSTAIN));
        assert_eq!(g.violation_count(), 1);
        let v = g.violation(0).unwrap();
        assert_eq!(v.rule_id, "ko");
        assert_eq!(v.kind, ViolationKind::KeepOut);
        assert_eq!(v.detail, "entered keep-out");
        // keeps reporting every tick while asserted
        assert!(g.evaluate(40.5, -104.5, SUSTAIN + 100));
        assert!(g.evaluate(40.5, -104.5, SUSTAIN + 200));
    }

    #[test]
    fn interrupted_episode_never_reports() {
        let mut g = engine_with(&format!(r#"{{"keep_out": [{{"polygon": {BOX}}}]}}"#));
        assert!(!g.evaluate(40.5, -104.5, 0));
        assert!(!g.evaluate(40.5, -104.5, 29_000));
        assert!(!g.evaluate(45.0, -104.5, 29_500));
        // window restarts from zero
        assert!(!g.evaluate(40.5, -104.5, 30_000));
        assert!(!g.evaluate(40.5, -104.5, 59_999));
        assert!(g.evaluate(40.5, -104.5, 60_000));
    }

    #[test]
    fn clear_drops_reported_violations() {
        let mut g = engine_with(&format!(r#"{{"keep_out": [{{"polygon": {BOX}}}]}}"#));
        assert!(sustained(&mut g, 40.5, -104.5, 0));
        assert_eq!(g.violation_count(), 1);
        g.clear_violations();
        assert_eq!(g.violation_count(), 0);
        assert!(g.violations().is_empty());
    }

    #[test]
    fn sustain_window_survives_clock_wrap() {
        let mut g = engine_with(&format!(r#"{{"keep_out": [{{"polygon": {BOX}}}]}}"#));
        let t0 = u32::MAX - 1_000;
        assert!(!g.evaluate(40.5, -104.5, t0));
        assert!(!g.evaluate(40.5, -104.5, t0.wrapping_add(SUSTAIN - 1)));
        assert!(g.evaluate(40.5, -104.5, t0.wrapping_add(SUSTAIN)));
    }

    #[test]
    fn stay_in_arms_silently_then_reports_exit() {
        let mut g = engine_with(&format!(r#"{{"stay_in": [{{"id": "op", "polygon": {BOX}}}]}}"#));
        // outside before arming: nothing, even after a long time
        assert!(!g.evaluate(45.0, -104.5, 0));
        assert!(!g.evaluate(45.0, -104.5, 100_000));
        // first inside observation arms
        assert!(!g.evaluate(40.5, -104.5, 100_100));
        assert!(matches!(g.rules()[0].kind, RuleKind::StayIn { armed: true, .. }));
        // leave: candidate starts the window
        assert!(sustained(&mut g, 45.0, -104.5, 100_200));
        assert_eq!(g.violations()[0].detail, "left stay-in");
        // back inside: nothing
        assert!(!g.evaluate(40.5, -104.5, 200_000));
    }

    #[test]
    fn stay_in_exit_produces_one_candidate_per_exit() {
        let mut g = GeofenceEngine::new(0);
        g.load_from_str(&format!(r#"{{"stay_in": [{{"polygon": {BOX}}}]}}"#)).unwrap();
        assert!(!g.evaluate(40.5, -104.5, 0));
        // zero window: the first candidate tick only opens it
        assert!(!g.evaluate(45.0, -104.5, 1));
        assert!(g.evaluate(45.0, -104.5, 2));
        assert_eq!(g.violation_count(), 1);
        assert!(!g.evaluate(40.5, -104.5, 3));
        assert_eq!(g.violation_count(), 0);
    }

    #[test]
    fn line_needs_previous_sample() {
        let mut g = GeofenceEngine::new(0);
        g.load_from_str(r#"{"lines": [{"id": "ns", "axis": "N/S", "value": -105.0}]}"#).unwrap();
        // first sample after load has no history
        assert!(!g.evaluate(40.0, -104.0, 0));
        // crossing opens the (zero) window; the next tick still crossing reports
        assert!(!g.evaluate(40.0, -106.0, 1));
        assert!(g.evaluate(40.0, -104.0, 2));
        assert_eq!(g.violations()[0].kind, ViolationKind::Line);
        // same side: candidate gone, pending reset
        assert!(!g.evaluate(40.0, -103.0, 3));
    }

    #[test]
    fn reload_resets_line_history() {
        let json = r#"{"lines": [{"axis": "E/W", "value": 41.0}]}"#;
        let mut g = GeofenceEngine::new(0);
        g.load_from_str(json).unwrap();
        g.evaluate(40.0, 0.0, 0);
        g.load_from_str(json).unwrap();
        assert!(!g.evaluate(42.0, 0.0, 1));
        assert!(!g.evaluate(42.0, 0.0, 2));
    }

    #[test]
    fn forced_bypasses_rules_and_window() {
        let mut g = GeofenceEngine::default();
        g.set_forced(true);
        assert!(g.is_forced());
        assert!(g.evaluate(0.0, 0.0, 0));
        assert_eq!(g.violation_count(), 1);
        assert_eq!(g.violations()[0].kind, ViolationKind::Test);
        assert_eq!(g.violations()[0].rule_id, "force");
        g.set_forced(false);
        assert_eq!(g.violation_count(), 0);
        assert!(!g.evaluate(0.0, 0.0, 1));
    }

    #[test]
    fn forced_tick_moves_line_history() {
        let mut g = GeofenceEngine::new(0);
        g.load_from_str(r#"{"lines": [{"id": "ns", "axis": "N/S", "value": -104.5}]}"#).unwrap();
        assert!(!g.evaluate(40.5, -104.6, 0));
        g.set_forced(true);
        assert!(g.evaluate(40.5, -104.4, 1));
        assert_eq!(g.violations()[0].kind, ViolationKind::Test);
        g.set_forced(false);
        // the forced sample is the new previous position: east stays east
        for t in 2..5 {
            assert!(!g.evaluate(40.5, -104.4, t));
            assert!(g.violations().iter().all(|v| v.kind != ViolationKind::Line));
        }
        // a real crossing afterwards is still seen
        assert!(!g.evaluate(40.5, -104.6, 5));
        assert!(g.evaluate(40.5, -104.4, 6));
        assert_eq!(g.violations()[0].rule_id, "ns");
    }

    #[test]
    fn corrupt_source_fails_open() {
        let mut g = engine_with(&format!(r#"{{"keep_out": [{{"polygon": {BOX}}}]}}"#));
        assert_eq!(g.rule_count(), 1);
        assert!(g.load_from_str("{ not json").is_err());
        assert_eq!(g.rule_count(), 0);
        assert!(!g.evaluate(40.5, -104.5, 0));
        assert!(!g.evaluate(40.5, -104.5, SUSTAIN * 2));
    }

    #[test]
    fn missing_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = GeofenceEngine::default();
        let err = g.load_from_path(dir.path().join("geofence.json")).unwrap_err();
        assert!(matches!(err, GeofenceError::Io { .. }));
        assert_eq!(g.rule_count(), 0);
    }

    #[test]
    fn loads_rule_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"keep_out": [{{"polygon": {BOX}}}], "lines": [{{"axis": "N/S", "value": 0.0}}]}}"#
        )
        .unwrap();
        let mut g = GeofenceEngine::default();
        assert_eq!(g.load_from_path(f.path()).unwrap(), 2);
    }

    #[test]
    fn containment_query_is_side_effect_free() {
        let mut g = engine_with(&format!(r#"{{"stay_in": [{{"polygon": {BOX}}}]}}"#));
        let c = g.contained_at(40.5, -104.5);
        assert_eq!(c, Containment { inside: true, has_stay_in: true });
        // arming untouched
        assert!(matches!(g.rules()[0].kind, RuleKind::StayIn { armed: false, .. }));
        assert_eq!(
            g.contained_at(45.0, -104.5),
            Containment { inside: false, has_stay_in: true }
        );
        // debounce untouched: the first real candidate still opens a window
        g.evaluate(40.5, -104.5, 0);
        assert!(!g.evaluate(45.0, -104.5, 1));
    }

    #[test]
    fn containment_without_stay_in_rules() {
        let g = engine_with(&format!(r#"{{"keep_out": [{{"polygon": {BOX}}}]}}"#));
        assert_eq!(g.contained_at(40.5, -104.5), Containment { inside: false, has_stay_in: false });
    }
}
