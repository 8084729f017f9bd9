//! Tri-state health shared by probes, services and history entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate health across repeated checks or sub-resources.
///
/// Serialized with the tokens the status page reads: `all`, `none`, `part`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Health {
    /// Every check succeeded.
    #[serde(rename = "all")]
    Up,
    /// No check succeeded.
    #[serde(rename = "none")]
    Down,
    /// Mixed outcome.
    #[serde(rename = "part")]
    Partial,
}

impl Health {
    /// Merge a set of statuses into one.
    ///
    /// Empty input is `Down`. Any `Down` with no `Up` is `Down`, any `Up`
    /// with no `Down` is `Up`; `Partial` values do not change either case.
    /// Otherwise the result is `Partial`.
    pub fn merge<I>(statuses: I) -> Health
    where
        I: IntoIterator<Item = Health>,
    {
        let mut seen_any = false;
        let mut has_up = false;
        let mut has_down = false;

        for status in statuses {
            seen_any = true;
            match status {
                Health::Up => has_up = true,
                Health::Down => has_down = true,
                Health::Partial => {}
            }
        }

        if !seen_any {
            return Health::Down;
        }

        match (has_up, has_down) {
            (false, true) => Health::Down,
            (true, false) => Health::Up,
            _ => Health::Partial,
        }
    }

    /// The stable token written to the log store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Up => "all",
            Health::Down => "none",
            Health::Partial => "part",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_single() {
        assert_eq!(Health::merge([Health::Up]), Health::Up);
        assert_eq!(Health::merge([Health::Down]), Health::Down);
        assert_eq!(Health::merge([Health::Partial]), Health::Partial);
    }

    #[test]
    fn test_merge_empty_is_down() {
        assert_eq!(Health::merge(Vec::new()), Health::Down);
    }

    #[test]
    fn test_merge_mixed() {
        assert_eq!(Health::merge([Health::Up, Health::Down]), Health::Partial);
        assert_eq!(Health::merge([Health::Up, Health::Down, Health::Partial]), Health::Partial);
        assert_eq!(Health::merge([Health::Up, Health::Up, Health::Up]), Health::Up);
        assert_eq!(Health::merge([Health::Down, Health::Down]), Health::Down);
    }

    #[test]
    fn test_merge_partial_follows_up_or_down() {
        // Partial alone does not tip an all-Up or all-Down set
        assert_eq!(Health::merge([Health::Up, Health::Partial]), Health::Up);
        assert_eq!(Health::merge([Health::Partial, Health::Down]), Health::Down);
        assert_eq!(Health::merge([Health::Partial, Health::Partial]), Health::Partial);
    }

    #[test]
    fn test_merge_order_invariant() {
        let inputs = [
            vec![Health::Up, Health::Down, Health::Up],
            vec![Health::Down, Health::Up, Health::Up],
            vec![Health::Up, Health::Up, Health::Down],
        ];
        for input in inputs {
            assert_eq!(Health::merge(input), Health::Partial);
        }
    }

    #[test]
    fn test_merge_nested_matches_flat() {
        let left = Health::merge([Health::Up, Health::Up]);
        let right = Health::merge([Health::Down]);
        assert_eq!(
            Health::merge([left, right]),
            Health::merge([Health::Up, Health::Up, Health::Down])
        );
    }

    #[test]
    fn test_tokens() {
        assert_eq!(serde_json::to_string(&Health::Up).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&Health::Down).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&Health::Partial).unwrap(), "\"part\"");
        let parsed: Health = serde_json::from_str("\"part\"").unwrap();
        assert_eq!(parsed, Health::Partial);
        assert_eq!(Health::Up.to_string(), "all");
    }
}
