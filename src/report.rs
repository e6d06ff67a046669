use serde::{Deserialize, Serialize};

/// One completed segment or window, exactly the on-disk audit schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    #[serde(rename = "Index")]
    pub index: usize,
    #[serde(rename = "NStart")]
    pub n_start: u64,
    #[serde(rename = "NEnd")]
    pub n_end: u64,
    #[serde(rename = "Covered")]
    pub covered: u64,
    #[serde(rename = "TotalEvens")]
    pub total_evens: u64,
    #[serde(rename = "Pct")]
    pub pct: f64,
    #[serde(rename = "Seconds")]
    pub seconds: f64,
}

impl SegmentReport {
    pub fn coverage_pct(covered: u64, total_evens: u64) -> f64 {
        if total_evens == 0 {
            100.0
        } else {
            covered as f64 * 100.0 / total_evens as f64
        }
    }
}

/// Aggregate over completed segments. Null (failed) segments contribute
/// nothing; the orchestrator reports them separately.
#[derive(Debug, Default)]
pub struct RunTotals {
    pub covered: u64,
    pub total_evens: u64,
    pub segments: usize,
}

impl RunTotals {
    pub fn absorb(&mut self, report: &SegmentReport) {
        self.covered += report.covered;
        self.total_evens += report.total_evens;
        self.segments += 1;
    }

    pub fn pct(&self) -> f64 {
        SegmentReport::coverage_pct(self.covered, self.total_evens)
    }
}
