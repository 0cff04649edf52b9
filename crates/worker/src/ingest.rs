use anyhow::Context;
use finadvice_core::domain::profile::ProfileInput;
use std::path::Path;

/// Reads a batch of profile records: either one JSON array or one JSON object per line.
pub fn load_profile_records(path: &Path) -> anyhow::Result<Vec<ProfileInput>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read profiles file {} failed", path.display()))?;
    let records = parse_records(&raw)
        .with_context(|| format!("parse profiles file {} failed", path.display()))?;

    tracing::info!(path = %path.display(), records = records.len(), "profile records loaded");
    Ok(records)
}

pub fn parse_records(raw: &str) -> anyhow::Result<Vec<ProfileInput>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }

    let mut out = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .with_context(|| format!("line {} is not a profile object", i + 1))?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        let records = parse_records(r#"[{"age": 30, "income": 1}, {"age": 40}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].age, Some(40.0));
        assert_eq!(records[1].income, None);
    }

    #[test]
    fn parses_json_lines_and_skips_blank_lines() {
        let raw = "{\"age\": 30}\n\n{\"age\": 41, \"risk_tolerance\": \"low\"}\n";
        let records = parse_records(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].risk_tolerance.as_deref(), Some("low"));
    }

    #[test]
    fn reports_the_bad_line() {
        let err = parse_records("{\"age\": 30}\nnot json\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
