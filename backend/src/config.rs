use anyhow::{bail, Context, Result};
use std::env;

use crate::actions::{OverlapPolicy, WorkflowConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub database_pool_size: usize,
    pub overlap_policy: OverlapPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            database_pool_size: env::var("DATABASE_POOL_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DATABASE_POOL_SIZE must be a valid number")?,
            overlap_policy: parse_overlap_policy(
                &env::var("HOME_DAY_OVERLAP_POLICY").unwrap_or_else(|_| "allow".to_string()),
            )?,
        })
    }

    pub fn workflow(&self) -> WorkflowConfig {
        WorkflowConfig {
            overlap_policy: self.overlap_policy,
        }
    }
}

fn parse_overlap_policy(value: &str) -> Result<OverlapPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "allow" => Ok(OverlapPolicy::Allow),
        "reject_confirmed" => Ok(OverlapPolicy::RejectConfirmed),
        other => bail!(
            "HOME_DAY_OVERLAP_POLICY must be 'allow' or 'reject_confirmed', got '{}'",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_policy_names() {
        assert_eq!(parse_overlap_policy("allow").unwrap(), OverlapPolicy::Allow);
        assert_eq!(
            parse_overlap_policy(" Reject_Confirmed ").unwrap(),
            OverlapPolicy::RejectConfirmed
        );
        assert!(parse_overlap_policy("strict").is_err());
    }
}
