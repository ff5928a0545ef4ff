use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::remote::RemoteTask;
use crate::status::TaskStatus;

pub type TaskId = String;

/// Mensaje cuando el API marca la tarea como fallida sin decir por qué.
pub const MISSING_ERROR_DETAIL: &str = "la tarea falló sin detalle del servicio remoto";

/// Última foto conocida de una tarea remota.
///
/// La copia autoritativa vive en el servicio; aquí solo guardamos lo último
/// que vimos. `result` solo existe si `status == Completed` y `error_detail`
/// solo si `status == Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub model: String,
    pub task_type: String,
    pub status: TaskStatus,

    /// Estado tal cual vino del API (para diagnóstico)
    pub raw_status: String,

    pub result: Option<Map<String, Value>>,
    pub error_detail: Option<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub last_polled_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn from_remote(remote: RemoteTask) -> Self {
        // una respuesta de creación puede venir sin status: recién creada
        let status = if remote.status.trim().is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::from_remote(&remote.status)
        };

        let result = match status {
            TaskStatus::Completed => Some(normalize_output(remote.output)),
            _ => None,
        };

        let error_detail = match status {
            TaskStatus::Failed => Some(
                remote
                    .error
                    .as_ref()
                    .and_then(|e| e.detail())
                    .unwrap_or_else(|| MISSING_ERROR_DETAIL.to_string()),
            ),
            _ => None,
        };

        let created_at = remote
            .meta
            .as_ref()
            .and_then(|m| m.created_at.as_deref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        Self {
            id: remote.task_id,
            model: remote.model,
            task_type: remote.task_type,
            status,
            raw_status: remote.status,
            result,
            error_detail,
            created_at,
            last_polled_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Siempre devolvemos un mapa: objeto tal cual, null/ausente como mapa
/// vacío y cualquier otro valor envuelto en `{"value": ...}`.
pub fn normalize_output(output: Option<Value>) -> Map<String, Value> {
    match output {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
