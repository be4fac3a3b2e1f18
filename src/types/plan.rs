use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Billing plan of a root namespace.
///
/// # Plan Capabilities
/// | Plan           | Paid | Trial | Free-user cap | Trial eligible |
/// |----------------|------|-------|---------------|----------------|
/// | Default        | -    | -     | ✓             | ✓              |
/// | Free           | -    | -     | ✓             | ✓              |
/// | Premium        | ✓    | -     | -             | ✓              |
/// | Ultimate       | ✓    | -     | -             | -              |
/// | PremiumTrial   | -    | ✓     | -             | -              |
/// | UltimateTrial  | -    | ✓     | -             | -              |
/// | Opensource     | ✓    | -     | -             | -              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Default,
    Free,
    Premium,
    Ultimate,
    PremiumTrial,
    UltimateTrial,
    Opensource,
}

/// Plans a namespace may start a trial from.
pub const PLANS_ELIGIBLE_FOR_TRIAL: &[Plan] = &[Plan::Default, Plan::Free, Plan::Premium];

impl Plan {
    pub const ALL: [Plan; 7] = [
        Plan::Default,
        Plan::Free,
        Plan::Premium,
        Plan::Ultimate,
        Plan::PremiumTrial,
        Plan::UltimateTrial,
        Plan::Opensource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Default => "default",
            Plan::Free => "free",
            Plan::Premium => "premium",
            Plan::Ultimate => "ultimate",
            Plan::PremiumTrial => "premium_trial",
            Plan::UltimateTrial => "ultimate_trial",
            Plan::Opensource => "opensource",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Plan::Premium | Plan::Ultimate | Plan::Opensource)
    }

    pub fn is_trial(&self) -> bool {
        matches!(self, Plan::PremiumTrial | Plan::UltimateTrial)
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Plan::Default | Plan::Free)
    }

    pub fn eligible_for_trial(&self) -> bool {
        PLANS_ELIGIBLE_FOR_TRIAL.contains(self)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown plan: {s}"))
    }
}
