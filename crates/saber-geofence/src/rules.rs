use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAxis {
    /// Line of constant longitude.
    NorthSouth,
    /// Line of constant latitude.
    EastWest,
}

impl LineAxis {
    /// "E/W" (any case) selects east-west; everything else is north-south.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("E/W") {
            LineAxis::EastWest
        } else {
            LineAxis::NorthSouth
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    KeepOut { polygon: Vec<Point> },
    /// `armed` latches the first time the position is seen inside.
    StayIn { polygon: Vec<Point>, armed: bool },
    Line { axis: LineAxis, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub detail: String,
    pub kind: RuleKind,
}

impl Rule {
    /// Vertices of a keep-out or stay-in rule; `None` for lines.
    pub fn polygon(&self) -> Option<&[Point]> {
        match &self.kind {
            RuleKind::KeepOut { polygon } | RuleKind::StayIn { polygon, .. } => Some(polygon),
            RuleKind::Line { .. } => None,
        }
    }
}

pub type RuleSet = Vec<Rule>;

// ----- JSON source schema -----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSource {
    #[serde(default)]
    pub keep_out: Vec<PolygonRuleCfg>,
    #[serde(default)]
    pub stay_in: Vec<PolygonRuleCfg>,
    #[serde(default)]
    pub lines: Vec<LineRuleCfg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonRuleCfg {
    #[serde(default = "default_rule_id")]
    pub id: String,
    /// `[lat, lon]` pairs in source order.
    #[serde(default)]
    pub polygon: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRuleCfg {
    #[serde(default = "default_line_id")]
    pub id: String,
    #[serde(default = "default_axis")]
    pub axis: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub detail: String,
}

fn default_rule_id() -> String { "rule".into() }
fn default_line_id() -> String { "line".into() }
fn default_axis() -> String { "N/S".into() }

fn to_points(raw: &[Vec<f64>]) -> Vec<Point> {
    raw.iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Point { lat: p[0], lon: p[1] })
        .collect()
}

impl RuleSource {
    /// Builds the rule set in source order: keep-out, stay-in, then lines.
    pub fn into_rules(self) -> RuleSet {
        let mut rules = Vec::with_capacity(self.keep_out.len() + self.stay_in.len() + self.lines.len());
        for r in self.keep_out {
            rules.push(Rule {
                kind: RuleKind::KeepOut { polygon: to_points(&r.polygon) },
                id: r.id,
                detail: String::new(),
            });
        }
        for r in self.stay_in {
            rules.push(Rule {
                kind: RuleKind::StayIn { polygon: to_points(&r.polygon), armed: false },
                id: r.id,
                detail: String::new(),
            });
        }
        for l in self.lines {
            rules.push(Rule {
                kind: RuleKind::Line { axis: LineAxis::parse(&l.axis), value: l.value },
                id: l.id,
                detail: l.detail,
            });
        }
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_schema() {
        let json = r#"{
            "keep_out": [{"id": "airport", "polygon": [[40.0, -105.0], [40.1, -105.0], [40.1, -104.9]]}],
            "stay_in": [{"polygon": [[39.0, -106.0], [41.0, -106.0], [41.0, -104.0], [39.0, -104.0]]}],
            "lines": [{"id": "border", "axis": "e/w", "value": 41.0, "detail": "state line"}]
        }"#;
        let src: RuleSource = serde_json::from_str(json).unwrap();
        let rules = src.into_rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].id, "airport");
        assert_eq!(rules[1].id, "rule");
        assert!(matches!(rules[1].kind, RuleKind::StayIn { armed: false, .. }));
        assert_eq!(rules[2].kind, RuleKind::Line { axis: LineAxis::EastWest, value: 41.0 });
        assert_eq!(rules[2].detail, "state line");
    }

    #[test]
    fn missing_sections_default_empty() {
        let src: RuleSource = serde_json::from_str("{}").unwrap();
        assert!(src.into_rules().is_empty());
    }

    #[test]
    fn short_points_are_skipped() {
        let json = r#"{"keep_out": [{"id": "k", "polygon": [[1.0], [1.0, 2.0], [3.0, 4.0], [5.0, 6.0, 7.0]]}]}"#;
        let rules = serde_json::from_str::<RuleSource>(json).unwrap().into_rules();
        assert_eq!(rules[0].polygon().map(<[Point]>::len), Some(3));
    }

    #[test]
    fn unknown_axis_is_north_south() {
        assert_eq!(LineAxis::parse("diagonal"), LineAxis::NorthSouth);
        assert_eq!(LineAxis::parse("N/S"), LineAxis::NorthSouth);
        assert_eq!(LineAxis::parse(" E/W "), LineAxis::EastWest);
    }
}
