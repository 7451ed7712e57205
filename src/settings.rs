use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::parser::category::Precedence;

pub const DEFAULT_BASE_URL: &str =
    "https://li-public.fmcsa.dot.gov/LIVIEW/PKG_register.prc_reg_detail";

/// Runtime settings: defaults, then `fmcsa_register.toml` (optional), then `FMCSA_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub base_url: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub precedence: Precedence,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("db_path", "data/fmcsa_register.sqlite")?
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("timeout_secs", 120_i64)?
            .set_default("concurrency", 4_i64)?
            .set_default("max_retries", 3_i64)?
            .set_default("backoff_ms", 2000_i64)?
            .set_default("precedence", "declared")?
            .add_source(File::with_name("fmcsa_register").required(false))
            .add_source(Environment::with_prefix("FMCSA").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
