use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::FixedOffset;
use dotenvy::dotenv;

use crate::attendance::office_hours::OfficeHours;
use crate::geo::sampler::SamplerOptions;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Bootstrap admin, created on startup when absent
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    pub office_start_hour: u32,
    pub office_end_hour: u32,
    pub utc_offset_minutes: i32,

    pub sample_timeout_ms: u64,
    pub sample_max_age_ms: u64,
    pub watch_max_age_ms: u64,

    pub session_idle_secs: u64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} is invalid ({raw:?}): {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 900)?, // default 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", 604_800)?, // default 7 days

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parsed("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),

            office_start_hour: parsed("OFFICE_HOURS_START", 9)?,
            office_end_hour: parsed("OFFICE_HOURS_END", 18)?,
            utc_offset_minutes: parsed("UTC_OFFSET_MINUTES", 0)?,

            sample_timeout_ms: parsed("SAMPLE_TIMEOUT_MS", 10_000)?,
            sample_max_age_ms: parsed("SAMPLE_MAX_AGE_MS", 60_000)?,
            watch_max_age_ms: parsed("WATCH_MAX_AGE_MS", 30_000)?,

            session_idle_secs: parsed("SESSION_IDLE_SECS", 86_400)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.office_start_hour > 23 || self.office_end_hour > 24 {
            return Err(anyhow!(
                "office hours must be within a day, got {}..{}",
                self.office_start_hour,
                self.office_end_hour
            ));
        }
        self.utc_offset()?;
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {}", self.utc_offset_minutes))
    }

    pub fn office_hours(&self) -> Result<OfficeHours> {
        Ok(OfficeHours {
            start_hour: self.office_start_hour,
            end_hour: self.office_end_hour,
            utc_offset: self.utc_offset()?,
        })
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            timeout: Duration::from_millis(self.sample_timeout_ms),
            one_shot_max_age: Duration::from_millis(self.sample_max_age_ms),
            watch_max_age: Duration::from_millis(self.watch_max_age_ms),
        }
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 604_800,
            rate_login_per_min: 60,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            admin_username: None,
            admin_password: None,
            office_start_hour: 9,
            office_end_hour: 18,
            utc_offset_minutes: 0,
            sample_timeout_ms: 10_000,
            sample_max_age_ms: 60_000,
            watch_max_age_ms: 30_000,
            session_idle_secs: 86_400,
        }
    }
}
