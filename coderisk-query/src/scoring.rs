//! Risk-scoring formula (spec §4.6):
//!
//! ```text
//! risk_score = 10 * incident_count
//!            + 2 * coupling_partners
//!            + 0.5 * min(staleness_days, 365) / 30
//!            + type_bonus
//! ```
//!
//! plus a recency bonus when the caller opts into `prioritize_recent` and
//! the block was touched in the last 30 days.

use coderisk_core::types::BlockType;

const STALENESS_CAP_DAYS: f64 = 365.0;
const RECENCY_WINDOW_DAYS: f64 = 30.0;
const RECENCY_BONUS_MAX: f64 = 5.0;

pub fn risk_score(
    incident_count: u32,
    coupling_partners: usize,
    staleness_days: f64,
    block_type: BlockType,
    prioritize_recent: bool,
) -> f64 {
    let mut score = 10.0 * incident_count as f64
        + 2.0 * coupling_partners as f64
        + 0.5 * staleness_days.min(STALENESS_CAP_DAYS) / 30.0
        + block_type.type_bonus();

    if prioritize_recent && staleness_days < RECENCY_WINDOW_DAYS {
        score += (RECENCY_WINDOW_DAYS - staleness_days) / RECENCY_WINDOW_DAYS * RECENCY_BONUS_MAX;
    }

    score
}
