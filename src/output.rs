//! Result types of a generation run.

use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};

/// Everything a one-shot generation produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelOutput {
    /// The encoded PDF. Skipped when serialising run reports.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// Suggested download name.
    pub file_name: String,
    pub pages: Vec<PageSummary>,
    pub stats: GenerationStats,
}

/// What ended up on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-indexed page number.
    pub page_num: usize,
    pub identifier: Identifier,
    /// Caption lines, top to bottom.
    pub captions: Vec<String>,
}

/// Timing and size figures for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub page_count: usize,
    pub byte_len: usize,
    pub render_duration_ms: u64,
    pub capture_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}
