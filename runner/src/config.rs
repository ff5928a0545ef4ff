use std::{env, time::Duration};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_BASE_URL: &str = "https://api.piapi.ai";
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_MAX_WAIT_SECS: u64 = 600;

/// Dónde y cómo hablar con el API de tareas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Ej: "https://api.piapi.ai" (sin "/api/v1")
    pub base_url: String,
    /// Header donde va la API key en cada request
    pub api_key_header: String,
    /// Timeout de cada request individual (no de la espera completa)
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Cadencia y presupuesto del poller. Son dos perillas independientes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.interval.is_zero() {
            return Err(CoreError::config("el intervalo de polling debe ser > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreConfig {
    pub api: ApiConfig,
    pub poll: PollConfig,
}

impl CoreConfig {
    /// Lee la configuración de variables de entorno:
    /// - PIAPI_BASE_URL (default https://api.piapi.ai)
    /// - PIAPI_API_KEY_HEADER (default x-api-key)
    /// - PIAPI_REQUEST_TIMEOUT_SECS, PIAPI_POLL_INTERVAL_MS, PIAPI_MAX_WAIT_SECS
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = CoreConfig::default();

        if let Some(url) = lookup("PIAPI_BASE_URL").filter(|s| !s.trim().is_empty()) {
            cfg.api.base_url = url.trim().to_string();
        }
        if let Some(header) = lookup("PIAPI_API_KEY_HEADER").filter(|s| !s.trim().is_empty()) {
            cfg.api.api_key_header = header.trim().to_string();
        }
        if let Some(secs) = parse_u64(&lookup, "PIAPI_REQUEST_TIMEOUT_SECS")? {
            cfg.api.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "PIAPI_POLL_INTERVAL_MS")? {
            cfg.poll.interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "PIAPI_MAX_WAIT_SECS")? {
            cfg.poll.max_wait = Duration::from_secs(secs);
        }

        cfg.poll.validate()?;
        Ok(cfg)
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> CoreResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| CoreError::config(format!("{key} no es un número válido: {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn sin_variables_usa_defaults() {
        let cfg = CoreConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg, CoreConfig::default());
        assert_eq!(cfg.api.base_url, "https://api.piapi.ai");
        assert_eq!(cfg.api.api_key_header, "x-api-key");
        assert_eq!(cfg.poll.interval, Duration::from_secs(3));
    }

    #[test]
    fn variables_sobrescriben_defaults() {
        let cfg = CoreConfig::from_lookup(lookup_from(&[
            ("PIAPI_BASE_URL", "http://localhost:8080"),
            ("PIAPI_POLL_INTERVAL_MS", "250"),
            ("PIAPI_MAX_WAIT_SECS", "10"),
            ("PIAPI_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:8080");
        assert_eq!(cfg.poll, PollConfig::new(Duration::from_millis(250), Duration::from_secs(10)));
        assert_eq!(cfg.api.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn numero_invalido_es_error_de_config() {
        let err = CoreConfig::from_lookup(lookup_from(&[("PIAPI_MAX_WAIT_SECS", "diez")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("PIAPI_MAX_WAIT_SECS"));
    }

    #[test]
    fn intervalo_cero_se_rechaza() {
        let err = CoreConfig::from_lookup(lookup_from(&[("PIAPI_POLL_INTERVAL_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
