use std::{env, fmt};

use crate::error::{CoreError, CoreResult};

pub const API_KEY_ENV: &str = "PIAPI_API_KEY";

/// Secreto opaco; nunca se imprime completo.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Quien nos da la API key. El núcleo no sabe de dónde sale.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> CoreResult<ApiKey>;
}

#[derive(Debug, Clone)]
pub struct StaticCredentials(ApiKey);

impl StaticCredentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self(ApiKey::new(key))
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> CoreResult<ApiKey> {
        Ok(self.0.clone())
    }
}

/// Lee la key del entorno en cada llamada (permite rotarla sin reiniciar).
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(API_KEY_ENV)
    }
}

impl CredentialProvider for EnvCredentials {
    fn api_key(&self) -> CoreResult<ApiKey> {
        match env::var(&self.var) {
            Ok(key) if !key.trim().is_empty() => Ok(ApiKey::new(key.trim())),
            _ => Err(CoreError::config(format!("falta la API key en ${}", self.var))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_no_filtra_la_key() {
        let key = ApiKey::new("sk-super-secreta");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        let creds = StaticCredentials::new("sk-super-secreta");
        assert!(!format!("{creds:?}").contains("super"));
    }

    #[test]
    fn env_credentials_sin_variable_es_error_de_config() {
        let creds = EnvCredentials::new("PIAPI_TEST_VAR_QUE_NO_EXISTE_123");
        let err = creds.api_key().unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
