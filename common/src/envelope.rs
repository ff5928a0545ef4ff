use serde::{Deserialize, Serialize};

/// Código que el API remoto usa para indicar éxito dentro del envelope.
pub const SUCCESS_CODE: i64 = 200;

/// Envoltorio uniforme de todas las respuestas: `{ code, message, data }`.
/// Un HTTP 200 con `code != 200` sigue siendo un error de aplicación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}
