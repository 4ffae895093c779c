//! Backend selection policy per loop iteration.

use serde::{Deserialize, Serialize};

/// How the loop picks an agent for each iteration. Iterations are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Schedule {
    /// The same agent every iteration.
    Fixed { agent: String },
    /// Odd iterations run `odd`, even iterations run `even`.
    Alternate { odd: String, even: String },
    /// Agents indexed by `(iteration - 1) % len`.
    RoundRobin { agents: Vec<String> },
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Fixed {
            agent: "codex".to_string(),
        }
    }
}

impl Schedule {
    pub fn agent_for(&self, iteration: u32) -> &str {
        match self {
            Schedule::Fixed { agent } => agent,
            Schedule::Alternate { odd, even } => {
                if iteration % 2 == 1 {
                    odd
                } else {
                    even
                }
            }
            Schedule::RoundRobin { agents } => {
                let index = iteration.saturating_sub(1) as usize % agents.len().max(1);
                agents.get(index).map(String::as_str).unwrap_or_default()
            }
        }
    }

    /// Every agent name the schedule can produce, for config validation.
    pub fn agent_names(&self) -> Vec<&str> {
        match self {
            Schedule::Fixed { agent } => vec![agent],
            Schedule::Alternate { odd, even } => vec![odd, even],
            Schedule::RoundRobin { agents } => agents.iter().map(String::as_str).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_always_returns_the_same_agent() {
        let schedule = Schedule::Fixed {
            agent: "codex".to_string(),
        };
        assert_eq!(schedule.agent_for(1), "codex");
        assert_eq!(schedule.agent_for(17), "codex");
    }

    #[test]
    fn alternate_splits_odd_and_even() {
        let schedule = Schedule::Alternate {
            odd: "codex".to_string(),
            even: "claude".to_string(),
        };
        assert_eq!(schedule.agent_for(1), "codex");
        assert_eq!(schedule.agent_for(2), "claude");
        assert_eq!(schedule.agent_for(3), "codex");
    }

    #[test]
    fn round_robin_wraps_from_iteration_one() {
        let schedule = Schedule::RoundRobin {
            agents: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert_eq!(schedule.agent_for(1), "a");
        assert_eq!(schedule.agent_for(2), "b");
        assert_eq!(schedule.agent_for(3), "c");
        assert_eq!(schedule.agent_for(4), "a");
    }

    #[test]
    fn parses_from_tagged_toml() {
        let schedule: Schedule =
            toml::from_str("mode = \"alternate\"\nodd = \"codex\"\neven = \"claude\"")
                .expect("parse");
        assert_eq!(
            schedule,
            Schedule::Alternate {
                odd: "codex".to_string(),
                even: "claude".to_string()
            }
        );
    }
}
