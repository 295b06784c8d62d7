//! Predictive Scheduler (spec.md §4.9): a pure heuristic time-of-day
//! capacity plan. Grounded on
//! `original_source/core/orchestration/predictive_scheduler.py`'s
//! `predict_plan`, rearchitected per SPEC_FULL.md §4.9 to take the hour as
//! an injected parameter instead of calling `time.strftime("%H")` directly,
//! so it is testable without mocking the wall clock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePlan {
    pub allocate: HashMap<String, u32>,
    pub preload_models: Vec<String>,
    pub notes: Vec<String>,
    pub explain: ScheduleExplain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleExplain {
    pub qps_pred: u32,
}

/// Peak windows: `8..11 ∪ 14..17`, inclusive on both ends per the source.
fn is_peak(hour: u32) -> bool {
    (8..=11).contains(&hour) || (14..=17).contains(&hour)
}

/// `predict(hour)`: deterministic given `hour` (local wall-clock hour,
/// `0..=23`).
pub fn predict(hour: u32) -> SchedulePlan {
    let peak = is_peak(hour);

    let mut allocate = HashMap::new();
    allocate.insert("analyst".to_string(), if peak { 2 } else { 1 });
    allocate.insert("researcher".to_string(), if peak { 2 } else { 1 });
    allocate.insert("conductor".to_string(), 1);
    allocate.insert("coder".to_string(), if peak { 1 } else { 0 });

    let mut preload = vec!["llama3.2:3b-instruct-q4_K_M".to_string()];
    if peak {
        preload.push("mistral:7b-instruct-q4".to_string());
    }

    SchedulePlan {
        allocate,
        preload_models: preload,
        notes: vec!["heuristics-v1".to_string(), format!("peak={peak}"), format!("hour={hour}")],
        explain: ScheduleExplain { qps_pred: if peak { 5 } else { 1 } },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_hour_allocates_more_capacity() {
        let plan = predict(9);
        assert_eq!(plan.allocate["analyst"], 2);
        assert_eq!(plan.allocate["coder"], 1);
        assert_eq!(plan.explain.qps_pred, 5);
        assert!(plan.preload_models.contains(&"mistral:7b-instruct-q4".to_string()));
    }

    #[test]
    fn off_peak_hour_allocates_baseline_capacity() {
        let plan = predict(3);
        assert_eq!(plan.allocate["analyst"], 1);
        assert_eq!(plan.allocate["coder"], 0);
        assert_eq!(plan.explain.qps_pred, 1);
        assert!(!plan.preload_models.contains(&"mistral:7b-instruct-q4".to_string()));
    }

    #[test]
    fn boundary_hours_are_inclusive() {
        assert!(is_peak(8));
        assert!(is_peak(11));
        assert!(is_peak(14));
        assert!(is_peak(17));
        assert!(!is_peak(12));
        assert!(!is_peak(18));
    }

    #[test]
    fn deterministic_for_same_hour() {
        let a = predict(10);
        let b = predict(10);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
