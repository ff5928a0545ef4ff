//! Taxonomía única de fallos del núcleo.
//!
//! Todo lo que sale de `RequestClient`, `TaskPoller` y `TaskRunner` es un
//! [`CoreError`]; nunca un `reqwest::Error` suelto ni un panic.

use common::{TaskId, TaskStatus};
use std::time::Duration;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// DNS, conexión rechazada, reset, timeout de la petición...
    #[error("error de red llamando a {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} en {path}: {body}")]
    HttpStatus {
        path: String,
        status: u16,
        body: String,
    },

    /// HTTP 2xx pero el envelope trae `code != 200`.
    #[error("el API respondió code={code} en {path}: {message}")]
    Application {
        path: String,
        code: i64,
        message: String,
    },

    /// La tarea llegó a `failed` en el servicio remoto.
    #[error("la tarea {task_id} falló: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    /// Se agotó la espera; la tarea puede terminar igual del lado remoto.
    #[error("la tarea {task_id} no terminó en {waited:?} (último estado: {last_status})")]
    Timeout {
        task_id: TaskId,
        waited: Duration,
        last_status: TaskStatus,
    },

    #[error("espera de la tarea {task_id} cancelada")]
    Cancelled { task_id: TaskId },

    #[error("respuesta inválida de {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error("configuración inválida: {0}")]
    Config(String),
}

/// Categorías que ve quien llama, sin importar el detalle del variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    HttpStatus,
    Application,
    Timeout,
    Cancelled,
    InvalidResponse,
    Config,
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_response(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Transport { .. } => ErrorKind::Transport,
            CoreError::HttpStatus { .. } => ErrorKind::HttpStatus,
            CoreError::Application { .. } | CoreError::TaskFailed { .. } => {
                ErrorKind::Application
            }
            CoreError::Timeout { .. } => ErrorKind::Timeout,
            CoreError::Cancelled { .. } => ErrorKind::Cancelled,
            CoreError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            CoreError::Config(_) => ErrorKind::Config,
        }
    }

    /// ¿Vale la pena volver a consultar el estado? Solo aplica a polls;
    /// la creación de tareas nunca se reintenta.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CoreError::Transport { .. } => true,
            CoreError::HttpStatus { status, .. } => transient_code(i64::from(*status)),
            // el envelope repite el código HTTP aunque venga con 200
            CoreError::Application { code, .. } => transient_code(*code),
            // un body roto detrás de un proxy puede ser pasajero
            CoreError::InvalidResponse { .. } => true,
            _ => false,
        }
    }

    /// Mensaje remoto, si el fallo lo trae.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            CoreError::Application { message, .. } | CoreError::TaskFailed { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

fn transient_code(code: i64) -> bool {
    code >= 500 || code == 408 || code == 429
}
