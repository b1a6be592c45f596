use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{LoanError, Result};
use crate::underwriting::UnderwritingPolicy;

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub underwriting: UnderwritingPolicy,
    #[serde(default)]
    pub limits: ApplicationLimits,
    /// credit the full principal to the borrower account on approval
    #[serde(default = "default_disburse_on_approval")]
    pub disburse_on_approval: bool,
    /// seed for the review-band draw; entropy when absent
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

/// request-level bounds for loan applications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationLimits {
    pub min_interest_rate: Rate,
    pub max_interest_rate: Rate,
    pub min_term_months: u32,
    pub max_term_months: u32,
}

fn default_disburse_on_approval() -> bool {
    true
}

impl Default for ApplicationLimits {
    fn default() -> Self {
        Self {
            min_interest_rate: Rate::from_percent_decimal(dec!(0.1)),
            max_interest_rate: Rate::from_percentage(30),
            min_term_months: 1,
            max_term_months: 480,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl EngineConfig {
    /// simulator defaults: 700 auto-approve, 600-699 coin flip
    pub fn standard() -> Self {
        Self {
            underwriting: UnderwritingPolicy::default(),
            limits: ApplicationLimits::default(),
            disburse_on_approval: true,
            rng_seed: None,
        }
    }

    /// review band never approves
    pub fn strict() -> Self {
        Self {
            underwriting: UnderwritingPolicy::strict(),
            ..Self::standard()
        }
    }

    /// fix the review-band draw for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| LoanError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.underwriting.validate()?;

        if self.limits.min_interest_rate > self.limits.max_interest_rate {
            return Err(LoanError::InvalidConfiguration {
                message: "minimum interest rate above maximum".to_string(),
            });
        }
        if self.limits.min_term_months == 0 || self.limits.min_term_months > self.limits.max_term_months {
            return Err(LoanError::InvalidConfiguration {
                message: format!(
                    "term bounds [{}, {}] are not usable",
                    self.limits.min_term_months, self.limits.max_term_months
                ),
            });
        }
        Ok(())
    }
}
