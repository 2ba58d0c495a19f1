use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::engine::payroll::{OvertimeCapMode, PayrollSettings};

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    // Payroll engine
    pub payroll_max_concurrency: usize,
    pub overtime_cap_mode: OvertimeCapMode,
    pub incomplete_as_absent: bool,
    pub contributions_reduce_taxable: bool,
    pub config_cache_ttl: Duration,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key} has an invalid value `{raw}`")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let overtime_cap_mode = match env::var("PAYROLL_OVERTIME_CAP_MODE") {
            Ok(raw) => raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("PAYROLL_OVERTIME_CAP_MODE")?,
            Err(_) => OvertimeCapMode::default(),
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,

            payroll_max_concurrency: or_default("PAYROLL_MAX_CONCURRENCY", 8)?,
            overtime_cap_mode,
            incomplete_as_absent: or_default("PAYROLL_INCOMPLETE_AS_ABSENT", false)?,
            contributions_reduce_taxable: or_default("PAYROLL_CONTRIBUTIONS_REDUCE_TAXABLE", false)?,
            config_cache_ttl: Duration::from_secs(or_default("PAYROLL_CONFIG_CACHE_TTL_SECS", 300)?),
        })
    }

    pub fn payroll_settings(&self) -> PayrollSettings {
        PayrollSettings {
            overtime_cap_mode: self.overtime_cap_mode,
            incomplete_as_absent: self.incomplete_as_absent,
            contributions_reduce_taxable: self.contributions_reduce_taxable,
        }
    }
}
