use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Paid-tier trial a namespace may start. Serialized as the portal's wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialType {
    Free,
    Premium,
    DuoPro,
    DuoEnterprise,
}

impl TrialType {
    pub const ALL: [TrialType; 4] = [
        TrialType::Free,
        TrialType::Premium,
        TrialType::DuoPro,
        TrialType::DuoEnterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialType::Free => "free",
            TrialType::Premium => "premium",
            TrialType::DuoPro => "duo_pro",
            TrialType::DuoEnterprise => "duo_enterprise",
        }
    }

    /// Parse a list of wire tags, skipping ones this build does not know.
    pub fn parse_tags<I, S>(tags: I) -> Vec<TrialType>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter()
            .filter_map(|t| t.as_ref().parse().ok())
            .collect()
    }
}

impl fmt::Display for TrialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrialType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown trial type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_skips_unknown() {
        let parsed = TrialType::parse_tags(["free", "gold", "duo_pro"]);
        assert_eq!(parsed, vec![TrialType::Free, TrialType::DuoPro]);
    }

    #[test]
    fn test_serde_uses_wire_tags() {
        let json = serde_json::to_string(&TrialType::DuoEnterprise).unwrap();
        assert_eq!(json, "\"duo_enterprise\"");
    }
}
