use anyhow::{Context, Result};
use std::path::Path;

fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse a newline-delimited numeric channel; missing markers become NaN.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (line_no, line) in data_lines(text) {
        let val = super::recording::parse_sample(line)
            .with_context(|| format!("line {line_no} is not a sample: {line}"))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no samples found");
    }
    Ok(out)
}

/// Read a newline-delimited channel from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Parse newline-delimited sample indices (e.g. R-peaks).
pub fn parse_indices(text: &str) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for (line_no, line) in data_lines(text) {
        let val: usize = line
            .parse()
            .with_context(|| format!("line {line_no} is not a sample index: {line}"))?;
        out.push(val);
    }
    Ok(out)
}

pub fn read_indices(path: &Path) -> Result<Vec<usize>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_indices(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_skipped() {
        let series = parse_f64_series("# photo\n1.0\n\nnan\n0.5\n").unwrap();
        assert_eq!(series.len(), 3);
        assert!(series[1].is_nan());
        assert_eq!(parse_indices("10\n# x\n250\n").unwrap(), vec![10, 250]);
    }

    #[test]
    fn bad_line_reports_position() {
        let err = parse_indices("1\n2.5\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        assert!(parse_f64_series("# only comments\n").is_err());
    }
}
