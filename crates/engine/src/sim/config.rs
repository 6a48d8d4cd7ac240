use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::grid::SearchLimits;
use crate::world::TeamId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub update_frequency_ms: u64,
    pub max_ticks_per_advance: u32,
    pub max_frame_delta_ms: u64,
    pub max_cells_to_search: usize,
    pub max_cells_to_search_when_unreachable: usize,
    pub max_stack_height: usize,
    pub starting_gold: u32,
    pub teams: Vec<TeamId>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            update_frequency_ms: 100,
            max_ticks_per_advance: 5,
            max_frame_delta_ms: 250,
            max_cells_to_search: 5000,
            max_cells_to_search_when_unreachable: 200,
            max_stack_height: 4,
            starting_gold: 100,
            teams: vec![TeamId(1), TeamId(2)],
        }
    }
}

impl SimConfig {
    pub fn update_frequency(&self) -> Duration {
        normalize_non_zero_duration(
            Duration::from_millis(self.update_frequency_ms),
            Duration::from_millis(100),
        )
    }

    pub fn max_frame_delta(&self) -> Duration {
        normalize_non_zero_duration(
            Duration::from_millis(self.max_frame_delta_ms),
            Duration::from_millis(250),
        )
    }

    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            max_cells_to_search: self.max_cells_to_search,
            max_cells_to_search_when_unreachable: self.max_cells_to_search_when_unreachable,
        }
    }
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_intervals_fall_back_to_defaults() {
        let config = SimConfig {
            update_frequency_ms: 0,
            max_frame_delta_ms: 0,
            ..SimConfig::default()
        };
        assert_eq!(config.update_frequency(), Duration::from_millis(100));
        assert_eq!(config.max_frame_delta(), Duration::from_millis(250));
    }

    #[test]
    fn partial_json_keeps_defaults_and_rejects_unknown_fields() {
        let config: SimConfig =
            serde_json::from_str(r#"{"starting_gold": 40}"#).expect("partial config");
        assert_eq!(config.starting_gold, 40);
        assert_eq!(config.max_cells_to_search, 5000);

        assert!(serde_json::from_str::<SimConfig>(r#"{"tick_rate": 1}"#).is_err());
    }
}
