use anyhow::Result;

use crate::rules::{Point, Rule, RuleKind};

fn coord_ok(p: &Point) -> bool {
    p.lat.abs() <= 90.0 && p.lon.abs() <= 180.0
}

/// Pre-flight sanity check of a loaded rule set.
pub fn check_rules(rules: &[Rule]) -> Result<()> {
    for r in rules {
        if let Some(polygon) = r.polygon() {
            anyhow::ensure!(polygon.len() >= 3, "rule '{}': polygon must have >= 3 points, has {}", r.id, polygon.len());
            anyhow::ensure!(polygon.iter().all(coord_ok), "rule '{}': polygon coordinates invalid", r.id);
        } else if let RuleKind::Line { value, .. } = &r.kind {
            anyhow::ensure!(value.is_finite() && value.abs() <= 180.0, "line '{}': value {} out of range", r.id, value);
        }
    }
    Ok(())
}

pub fn check_sustain(sustain_ms: u32) -> Result<()> {
    anyhow::ensure!(sustain_ms <= 300_000, "geofence sustain window should be <= 300 s");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleSource;

    fn rules(json: &str) -> Vec<Rule> {
        serde_json::from_str::<RuleSource>(json).unwrap().into_rules()
    }

    #[test]
    fn accepts_valid_rules() {
        let r = rules(r#"{"stay_in": [{"polygon": [[0,0],[0,1],[1,1]]}], "lines": [{"value": -105.0}]}"#);
        assert!(check_rules(&r).is_ok());
    }

    #[test]
    fn flags_short_polygon() {
        let r = rules(r#"{"keep_out": [{"id": "tiny", "polygon": [[0,0],[0,1]]}]}"#);
        let err = check_rules(&r).unwrap_err().to_string();
        assert!(err.contains("tiny"));
    }

    #[test]
    fn flags_out_of_range_coordinates() {
        let r = rules(r#"{"keep_out": [{"polygon": [[95,0],[0,1],[1,1]]}]}"#);
        assert!(check_rules(&r).is_err());
    }
}
