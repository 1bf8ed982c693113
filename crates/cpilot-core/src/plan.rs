//! Subscription plans and the product ceilings they impose on catalog sync.

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Trial,
    Starter,
    Premium,
}

impl SubscriptionPlan {
    /// Maximum number of products a sync will store for this plan.
    ///
    /// Sync truncates to this ceiling rather than failing when the remote
    /// catalog is larger.
    #[must_use]
    pub fn product_limit(self) -> usize {
        match self {
            SubscriptionPlan::Trial => 5,
            SubscriptionPlan::Starter => 100,
            SubscriptionPlan::Premium => 1000,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionPlan::Trial => "trial",
            SubscriptionPlan::Starter => "starter",
            SubscriptionPlan::Premium => "premium",
        }
    }

    /// Lenient parse for values read back from the database.
    ///
    /// Unknown values fall back to [`SubscriptionPlan::Trial`], the most
    /// restrictive ceiling, rather than failing the sync.
    #[must_use]
    pub fn from_db(s: &str) -> Self {
        s.parse().unwrap_or(SubscriptionPlan::Trial)
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionPlan {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(SubscriptionPlan::Trial),
            "starter" => Ok(SubscriptionPlan::Starter),
            "premium" => Ok(SubscriptionPlan::Premium),
            other => Err(CoreError::UnknownPlan(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_limits_are_ordered() {
        assert_eq!(SubscriptionPlan::Trial.product_limit(), 5);
        assert!(
            SubscriptionPlan::Starter.product_limit() < SubscriptionPlan::Premium.product_limit()
        );
    }

    #[test]
    fn string_round_trip() {
        for plan in [
            SubscriptionPlan::Trial,
            SubscriptionPlan::Starter,
            SubscriptionPlan::Premium,
        ] {
            assert_eq!(plan.as_str().parse::<SubscriptionPlan>().unwrap(), plan);
        }
    }

    #[test]
    fn from_db_falls_back_to_trial() {
        assert_eq!(SubscriptionPlan::from_db("premium"), SubscriptionPlan::Premium);
        assert_eq!(SubscriptionPlan::from_db("enterprise"), SubscriptionPlan::Trial);
        assert_eq!(SubscriptionPlan::from_db(""), SubscriptionPlan::Trial);
    }

    #[test]
    fn unknown_plan_is_a_parse_error() {
        let err = "gold".parse::<SubscriptionPlan>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownPlan(ref p) if p == "gold"));
    }
}
