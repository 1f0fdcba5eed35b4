//! Classifier output for a single conversational turn.
//!
//! The classifier itself lives outside this crate; only its three-valued
//! verdict crosses the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BondError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Negative => "NEGATIVE",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = BondError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Ok(Sentiment::Positive),
            "NEUTRAL" => Ok(Sentiment::Neutral),
            "NEGATIVE" => Ok(Sentiment::Negative),
            "" => Err(BondError::validation("sentiment", "is required")),
            other => Err(BondError::validation(
                "sentiment",
                format!("must be POSITIVE, NEUTRAL, or NEGATIVE (got {other:?})"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_values() {
        assert_eq!("POSITIVE".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" neutral ".parse::<Sentiment>().unwrap(), Sentiment::Neutral);
        assert_eq!("Negative".parse::<Sentiment>().unwrap(), Sentiment::Negative);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "HAPPY".parse::<Sentiment>().unwrap_err();
        assert_eq!(err.field(), Some("sentiment"));
        assert!(err.to_string().contains("HAPPY"));

        let err = "".parse::<Sentiment>().unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_serde_uses_upper_case() {
        let json = serde_json::to_string(&Sentiment::Negative).unwrap();
        assert_eq!(json, "\"NEGATIVE\"");
        let parsed: Sentiment = serde_json::from_str("\"POSITIVE\"").unwrap();
        assert_eq!(parsed, Sentiment::Positive);
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for s in Sentiment::ALL {
            assert_eq!(s.to_string().parse::<Sentiment>().unwrap(), s);
        }
    }
}
