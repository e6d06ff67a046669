use crate::error::Result;
use crate::report::SegmentReport;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn segment_report_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("seg_{index:05}.json"))
}

pub fn segment_misses_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("seg_{index:05}_misses.txt"))
}

pub fn window_report_path(dir: &Path, n_start: u64, window_evens: u64) -> PathBuf {
    dir.join(format!("window_{n_start}_{window_evens}.json"))
}

pub fn window_misses_path(dir: &Path, n_start: u64, window_evens: u64) -> PathBuf {
    dir.join(format!("window_{n_start}_{window_evens}_misses.txt"))
}

/// Write bytes to `path` atomically: temp file in the same directory, then
/// rename. A torn write can never satisfy a later resume probe.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn write_report(path: &Path, report: &SegmentReport) -> Result<()> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
}

/// Resume probe. Absent, unreadable, or corrupt audit files all read as
/// "not checkpointed" and the segment is recomputed.
pub fn load_report(path: &Path) -> Option<SegmentReport> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// One decimal even per line.
pub fn write_miss_list(path: &Path, misses: &[u64]) -> Result<()> {
    let mut body = String::with_capacity(misses.len() * 12);
    for n in misses {
        body.push_str(&n.to_string());
        body.push('\n');
    }
    write_atomic(path, body.as_bytes())
}

/// Cross-segment run summary, one CSV row per completed segment.
pub fn write_summary(dir: &Path, reports: &[Option<SegmentReport>]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut writer = csv::Writer::from_path(dir.join("summary.csv"))?;
    for report in reports.iter().flatten() {
        writer.serialize(report)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(index: usize) -> SegmentReport {
        SegmentReport {
            index,
            n_start: 2,
            n_end: 64,
            covered: 30,
            total_evens: 30,
            pct: 100.0,
            seconds: 0.125,
        }
    }

    #[test]
    fn test_audit_paths() {
        let dir = Path::new("out");
        assert_eq!(segment_report_path(dir, 7), Path::new("out/seg_00007.json"));
        assert_eq!(
            segment_misses_path(dir, 12345),
            Path::new("out/seg_12345_misses.txt")
        );
        assert_eq!(
            window_report_path(dir, 1_000_000_000_000, 1000),
            Path::new("out/window_1000000000000_1000.json")
        );
        assert_eq!(
            window_misses_path(dir, 10, 4),
            Path::new("out/window_10_4_misses.txt")
        );
    }

    #[test]
    fn test_report_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_report_path(dir.path(), 0);
        let report = sample(0);
        write_report(&path, &report).unwrap();
        assert_eq!(load_report(&path), Some(report));
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_report_path(dir.path(), 3);
        assert_eq!(load_report(&path), None);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_report(&path), None);
    }

    #[test]
    fn test_miss_list_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_misses_path(dir.path(), 0);
        write_miss_list(&path, &[94, 1_000_000]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "94\n1000000\n");
    }

    #[test]
    fn test_summary_skips_failed_segments() {
        let dir = tempfile::tempdir().unwrap();
        write_summary(dir.path(), &[Some(sample(0)), None, Some(sample(2))]).unwrap();
        let body = fs::read_to_string(dir.path().join("summary.csv")).unwrap();
        let mut lines = body.lines();
        assert_eq!(
            lines.next(),
            Some("Index,NStart,NEnd,Covered,TotalEvens,Pct,Seconds")
        );
        assert_eq!(body.lines().count(), 3); // header + two rows
    }
}
