use serde::{Deserialize, Serialize};
use std::fmt;

/// Estado canónico de una tarea remota.
///
/// El servicio remoto no documenta un vocabulario cerrado, así que todo lo
/// que no aparece en [`STATUS_ALIASES`] cae en `Unknown` en vez de romper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Unknown,
}

/// Tabla única de sinónimos remotos -> estado canónico.
/// Para soportar un estado nuevo basta con agregar una fila aquí.
pub const STATUS_ALIASES: &[(&str, TaskStatus)] = &[
    ("pending", TaskStatus::Pending),
    ("staged", TaskStatus::Pending),
    ("queued", TaskStatus::Pending),
    ("submitted", TaskStatus::Pending),
    ("waiting", TaskStatus::Pending),
    ("created", TaskStatus::Pending),
    ("processing", TaskStatus::Processing),
    ("running", TaskStatus::Processing),
    ("in_progress", TaskStatus::Processing),
    ("started", TaskStatus::Processing),
    ("completed", TaskStatus::Completed),
    ("succeeded", TaskStatus::Completed),
    ("success", TaskStatus::Completed),
    ("finished", TaskStatus::Completed),
    ("done", TaskStatus::Completed),
    ("failed", TaskStatus::Failed),
    ("failure", TaskStatus::Failed),
    ("error", TaskStatus::Failed),
    ("cancelled", TaskStatus::Failed),
    ("canceled", TaskStatus::Failed),
    ("aborted", TaskStatus::Failed),
];

impl TaskStatus {
    /// Normaliza el string remoto (sin distinguir mayúsculas ni espacios).
    pub fn from_remote(raw: &str) -> Self {
        let needle = raw.trim();
        STATUS_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(needle))
            .map(|(_, status)| *status)
            .unwrap_or(TaskStatus::Unknown)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Posición en la secuencia pending -> processing -> terminal.
    /// `Unknown` no tiene rango: no avanza ni retrocede nada.
    pub fn rank(self) -> Option<u8> {
        match self {
            TaskStatus::Pending => Some(0),
            TaskStatus::Processing => Some(1),
            TaskStatus::Completed | TaskStatus::Failed => Some(2),
            TaskStatus::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
