//! JSON output

use crate::summary::RunSummary;

/// Serialize a run summary as pretty-printed JSON
pub fn generate_json_summary(summary: &RunSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeit_stats::compute_summary;

    #[test]
    fn test_json_shape() {
        let summary = RunSummary {
            name: "compress".to_string(),
            args: "()".to_string(),
            runs: 4,
            workers: 2,
            completed: 4,
            timed_out: 0,
            cancelled: 0,
            failed: 0,
            statistics: Some(compute_summary(&[1.0, 2.0, 3.0, 4.0])),
        };
        let json = generate_json_summary(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["name"], "compress");
        assert_eq!(value["workers"], 2);
        assert_eq!(value["statistics"]["median"], 2.5);
        assert_eq!(value["statistics"]["total"], 10.0);
    }

    #[test]
    fn test_missing_statistics_is_null() {
        let summary = RunSummary {
            name: "idle".to_string(),
            args: "()".to_string(),
            runs: 1,
            workers: 1,
            completed: 0,
            timed_out: 0,
            cancelled: 1,
            failed: 0,
            statistics: None,
        };
        let value: serde_json::Value =
            serde_json::from_str(&generate_json_summary(&summary).unwrap()).unwrap();
        assert!(value["statistics"].is_null());
    }
}
