//! Layout coordinate and parasitics report extraction.
//!
//! The coordinate report holds one net per line, `<label> : X = {<x>, Y = <y>}`.
//! The parasitics report maps numeric node ids to labels in its `*NAME_MAP`
//! section and lists per-node capacitances in the `*CAP` sub-section of each
//! `*D_NET`. Missing or unreadable files are logged, never fatal.

use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Pin suffixes tried when the bare node id has no capacitance.
const PIN_SUFFIXES: &[&str] = &[":A", ":Q", ":Z", ":Y", ":CK"];

/// One extracted net.
#[derive(Debug, Clone, PartialEq)]
pub struct NetRecord {
    pub label: String,
    pub x: f64,
    pub y: f64,
    /// 0.0 when the label could not be resolved in the parasitics report
    pub capacitance: f64,
}

/// Label-to-id mapping and per-node capacitances of a parasitics report.
#[derive(Debug, Clone, Default)]
pub struct Parasitics {
    label_to_id: HashMap<String, String>,
    capacitances: HashMap<String, f64>,
}

impl Parasitics {
    pub fn parse(text: &str) -> Self {
        let mut parasitics = Parasitics::default();
        let mut in_name_map = false;
        let mut in_cap_section = false;

        for line in text.lines() {
            let line = line.trim();
            let mut parts = line.split_whitespace();
            let Some(head) = parts.next() else {
                continue;
            };

            match head {
                "*NAME_MAP" => {
                    in_name_map = true;
                    continue;
                }
                "*D_NET" => {
                    in_name_map = false;
                    in_cap_section = false;
                    continue;
                }
                "*CAP" => {
                    in_cap_section = true;
                    continue;
                }
                "*RES" | "*END" => {
                    in_cap_section = false;
                    continue;
                }
                // pin-connection lines: *I <id> <label> ...
                "*I" | "*P" => {
                    let fields: Vec<&str> = parts.collect();
                    if fields.len() >= 3 {
                        parasitics
                            .label_to_id
                            .entry(fields[1].to_string())
                            .or_insert_with(|| fields[0].to_string());
                    }
                    continue;
                }
                _ => {}
            }

            if in_name_map {
                if is_node_id(head) {
                    if let Some(label) = parts.next() {
                        parasitics
                            .label_to_id
                            .insert(label.to_string(), head.to_string());
                    }
                } else if head.starts_with('*') {
                    in_name_map = false;
                }
            } else if in_cap_section {
                // <index> <node> <value>; coupling lines fail to parse and are skipped
                if let (Some(node), Some(value)) = (parts.next(), parts.next()) {
                    if let Ok(cap) = value.parse::<f64>() {
                        parasitics.capacitances.insert(node.to_string(), cap);
                    }
                }
            }
        }

        parasitics
    }

    /// Capacitance of the node `label` maps to, or 0.0 when unresolved.
    pub fn capacitance_of(&self, label: &str) -> f64 {
        let Some(id) = self.label_to_id.get(label) else {
            return 0.0;
        };
        match self.capacitances.get(id) {
            Some(&cap) if cap != 0.0 => cap,
            _ => PIN_SUFFIXES
                .iter()
                .find_map(|suffix| self.capacitances.get(&format!("{}{}", id, suffix)))
                .copied()
                .unwrap_or(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.label_to_id.is_empty() && self.capacitances.is_empty()
    }
}

fn is_node_id(token: &str) -> bool {
    token
        .strip_prefix('*')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// Parse every `<label> : X = {<x>, Y = <y>}` line; other lines are ignored.
pub fn parse_coordinates(text: &str) -> Vec<(String, f64, f64)> {
    text.lines().filter_map(parse_coordinate_line).collect()
}

fn parse_coordinate_line(line: &str) -> Option<(String, f64, f64)> {
    line.match_indices(':').find_map(|(pos, _)| {
        let label = line[..pos].trim();
        if label.is_empty() {
            return None;
        }
        let rest = token(&line[pos + 1..], "X")?;
        let rest = token(rest, "=")?;
        let rest = token(rest, "{")?;
        let (x, rest) = rest.split_once(',')?;
        let rest = token(rest, "Y")?;
        let rest = token(rest, "=")?;
        let (y, _) = rest.split_once('}')?;
        Some((
            label.to_string(),
            x.trim().parse().ok()?,
            y.trim().parse().ok()?,
        ))
    })
}

fn token<'a>(s: &'a str, expected: &str) -> Option<&'a str> {
    s.trim_start().strip_prefix(expected)
}

/// Read both reports and join coordinates with capacitances.
///
/// A missing coordinate report yields an empty result. A missing parasitics
/// report leaves every capacitance at 0.0.
pub fn extract_records(
    coord_path: impl AsRef<Path>,
    parasitics_path: impl AsRef<Path>,
) -> Vec<NetRecord> {
    let coord_path = coord_path.as_ref();
    let parasitics_path = parasitics_path.as_ref();

    let parasitics = match std::fs::read_to_string(parasitics_path) {
        Ok(text) => {
            let parsed = Parasitics::parse(&text);
            if parsed.is_empty() {
                warn!(path = %parasitics_path.display(), "Parasitics report has no name map or capacitances");
            }
            parsed
        }
        Err(e) => {
            warn!(path = %parasitics_path.display(), error = %e, "Cannot read parasitics report");
            Parasitics::default()
        }
    };

    let text = match std::fs::read_to_string(coord_path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %coord_path.display(), error = %e, "Cannot read coordinate report");
            return Vec::new();
        }
    };

    let records: Vec<NetRecord> = parse_coordinates(&text)
        .into_iter()
        .map(|(label, x, y)| NetRecord {
            capacitance: parasitics.capacitance_of(&label),
            label,
            x,
            y,
        })
        .collect();

    let resolved = records.iter().filter(|r| r.capacitance != 0.0).count();
    info!(records = records.len(), resolved, "Extracted layout coordinates");
    records
}

/// Points as an `N x 2` matrix and capacitances as a length-N vector.
pub fn records_to_arrays(records: &[NetRecord]) -> (Array2<f64>, Array1<f64>) {
    let points = Array2::from_shape_fn((records.len(), 2), |(i, j)| {
        if j == 0 {
            records[i].x
        } else {
            records[i].y
        }
    });
    let capacitances = records.iter().map(|r| r.capacitance).collect();
    (points, capacitances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SPEF: &str = "\
*SPEF \"IEEE 1481-1998\"
*DESIGN \"core\"
*INDUCTANCE_UNIT 1 HENRY

*NAME_MAP
*10559 IF_ID_Pipeline_PC_Out_reg[10]
*10560 net_b
*10561 net_c
*10562 net_d

*D_NET *10559 0.52
*CONN
*I *10559:Q O *D DFF
*CAP
1 *10559 0.25
2 *10559 *10560 0.01
*RES
1 *10559 *10559:Q 1.5
*END

*D_NET *10560 0.3
*CAP
1 *10560:Q 0.75
*END

*D_NET *10561 0.1
*CAP
1 *10561 0.0
2 *10561:CK 0.125
*END
";

    const COORDS: &str = "\
IF_ID_Pipeline_PC_Out_reg[10] : X = {12.5, Y = 40.25}
net_b: X = {1.0, Y = 2.0}
garbage line
net_c :X={3,Y=4}
net_d : X = {5.5, Y = 6.5}
net_e : X = {7.0, Y = 8.0}
";

    #[test]
    fn test_parse_coordinates() {
        let parsed = parse_coordinates(COORDS);
        assert_eq!(parsed.len(), 5);
        assert_eq!(
            parsed[0],
            ("IF_ID_Pipeline_PC_Out_reg[10]".to_string(), 12.5, 40.25)
        );
        assert_eq!(parsed[2], ("net_c".to_string(), 3.0, 4.0));
    }

    #[test]
    fn test_coordinate_line_rejects_malformed() {
        assert!(parse_coordinate_line(": X = {1, Y = 2}").is_none());
        assert!(parse_coordinate_line("a : X = {1 Y = 2}").is_none());
        assert!(parse_coordinate_line("a : X = {one, Y = 2}").is_none());
    }

    #[test]
    fn test_capacitance_resolution() {
        let parasitics = Parasitics::parse(SPEF);
        // bare id
        assert_eq!(parasitics.capacitance_of("IF_ID_Pipeline_PC_Out_reg[10]"), 0.25);
        // bare id absent, :Q variant present
        assert_eq!(parasitics.capacitance_of("net_b"), 0.75);
        // bare id zero, :CK variant present
        assert_eq!(parasitics.capacitance_of("net_c"), 0.125);
        // mapped but no capacitance entry
        assert_eq!(parasitics.capacitance_of("net_d"), 0.0);
        // unmapped
        assert_eq!(parasitics.capacitance_of("net_e"), 0.0);
    }

    #[test]
    fn test_extract_records() {
        let dir = tempfile::tempdir().unwrap();
        let coords = dir.path().join("coords.txt");
        let spef = dir.path().join("design.spef");
        fs::write(&coords, COORDS).unwrap();
        fs::write(&spef, SPEF).unwrap();

        let records = extract_records(&coords, &spef);
        assert_eq!(records.len(), 5);
        assert_eq!(records[1].label, "net_b");
        assert_eq!(records[1].capacitance, 0.75);

        let (points, caps) = records_to_arrays(&records);
        assert_eq!(points.dim(), (5, 2));
        assert_eq!(points[[0, 1]], 40.25);
        assert_eq!(caps[2], 0.125);
    }

    #[test]
    fn test_missing_files_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let coords = dir.path().join("coords.txt");
        fs::write(&coords, COORDS).unwrap();

        let records = extract_records(&coords, dir.path().join("missing.spef"));
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.capacitance == 0.0));

        let none = extract_records(
            dir.path().join("missing.txt"),
            dir.path().join("missing.spef"),
        );
        assert!(none.is_empty());
    }
}
