use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Per-connection buffer of the push channel.
    pub event_buffer_size: usize,
    pub offer_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub location_freshness_secs: i64,
    pub location_history_limit: usize,
    pub delivery_base_fee: f64,
    pub delivery_fee_per_km: f64,
    pub service_fee_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            offer_ttl_secs: 900,
            sweep_interval_secs: 15,
            location_freshness_secs: 30,
            location_history_limit: 5000,
            delivery_base_fee: 5.0,
            delivery_fee_per_km: 1.2,
            service_fee_rate: 0.05,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            offer_ttl_secs: parse_or_default("OFFER_TTL_SECS", defaults.offer_ttl_secs)?,
            sweep_interval_secs: parse_or_default(
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            location_freshness_secs: parse_or_default(
                "LOCATION_FRESHNESS_SECS",
                defaults.location_freshness_secs,
            )?,
            location_history_limit: parse_or_default(
                "LOCATION_HISTORY_LIMIT",
                defaults.location_history_limit,
            )?,
            delivery_base_fee: parse_or_default("DELIVERY_BASE_FEE", defaults.delivery_base_fee)?,
            delivery_fee_per_km: parse_or_default(
                "DELIVERY_FEE_PER_KM",
                defaults.delivery_fee_per_km,
            )?,
            service_fee_rate: parse_or_default("SERVICE_FEE_RATE", defaults.service_fee_rate)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal("EVENT_BUFFER_SIZE must be > 0".to_string()));
        }
        if self.offer_ttl_secs <= 0 {
            return Err(AppError::Internal("OFFER_TTL_SECS must be > 0".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(AppError::Internal("SWEEP_INTERVAL_SECS must be > 0".to_string()));
        }
        if self.location_freshness_secs <= 0 {
            return Err(AppError::Internal(
                "LOCATION_FRESHNESS_SECS must be > 0".to_string(),
            ));
        }
        if self.location_history_limit == 0 {
            return Err(AppError::Internal(
                "LOCATION_HISTORY_LIMIT must be > 0".to_string(),
            ));
        }
        if self.delivery_base_fee < 0.0
            || self.delivery_fee_per_km < 0.0
            || !(0.0..=1.0).contains(&self.service_fee_rate)
        {
            return Err(AppError::Internal("invalid pricing configuration".to_string()));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn service_fee_rate_above_one_is_rejected() {
        let config = Config {
            service_fee_rate: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
