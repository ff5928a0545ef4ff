use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskId;

/* --------- Cuerpo de creación: POST /api/v1/task --------- */

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTaskRequest {
    pub model: String,
    pub task_type: String,

    /// Parámetros propios de cada capacidad (ya validados por el adaptador)
    pub input: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TaskConfig>,
}

impl CreateTaskRequest {
    pub fn new(model: impl Into<String>, task_type: impl Into<String>, input: Value) -> Self {
        Self {
            model: model.into(),
            task_type: task_type.into(),
            input,
            config: None,
        }
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    /// "public" o "private" según el plan de la cuenta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_config: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/* --------- Registro de tarea tal como lo devuelve el API --------- */

/// `data` de las respuestas de creación y consulta. Todo menos `task_id`
/// es opcional: cada modelo devuelve un subconjunto distinto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTask {
    pub task_id: TaskId,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RemoteMeta>,
}

/// El campo `error` llega a veces como objeto y a veces como texto plano.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteError {
    Detailed {
        #[serde(default)]
        code: i64,
        #[serde(default)]
        message: String,
        #[serde(default)]
        raw_message: String,
        #[serde(default)]
        detail: Option<Value>,
    },
    Text(String),
}

impl RemoteError {
    /// Primer mensaje no vacío; `None` si el error viene "vacío"
    /// (el API manda `{code: 0, message: ""}` incluso en tareas exitosas).
    pub fn detail(&self) -> Option<String> {
        match self {
            RemoteError::Text(text) => non_empty(text),
            RemoteError::Detailed {
                message,
                raw_message,
                detail,
                ..
            } => non_empty(message)
                .or_else(|| non_empty(raw_message))
                .or_else(|| match detail {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => non_empty(s),
                    Some(other) => Some(other.to_string()),
                }),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_omite_config_si_no_hay() {
        let req = CreateTaskRequest::new("kling", "video_generation", json!({"prompt": "gato"}));
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({"model": "kling", "task_type": "video_generation", "input": {"prompt": "gato"}})
        );
    }

    #[test]
    fn create_request_serializa_webhook() {
        let req = CreateTaskRequest::new("suno", "music", json!({})).with_config(TaskConfig {
            service_mode: Some("public".into()),
            webhook_config: Some(WebhookConfig {
                endpoint: "https://hook.example/x".into(),
                secret: None,
            }),
        });
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body["config"],
            json!({"service_mode": "public", "webhook_config": {"endpoint": "https://hook.example/x"}})
        );
    }

    #[test]
    fn remote_task_tolera_campos_faltantes() {
        let t: RemoteTask = serde_json::from_value(json!({"task_id": "abc123"})).unwrap();
        assert_eq!(t.task_id, "abc123");
        assert_eq!(t.status, "");
        assert!(t.output.is_none() && t.error.is_none());
    }

    #[test]
    fn error_vacio_no_cuenta_como_detalle() {
        let e: RemoteError = serde_json::from_value(json!({"code": 0, "message": ""})).unwrap();
        assert_eq!(e.detail(), None);
    }

    #[test]
    fn error_detalle_prioriza_message_luego_raw_message() {
        let e: RemoteError =
            serde_json::from_value(json!({"code": 10000, "message": "", "raw_message": "nsfw"}))
                .unwrap();
        assert_eq!(e.detail().as_deref(), Some("nsfw"));

        let e: RemoteError = serde_json::from_value(json!("quota exceeded")).unwrap();
        assert_eq!(e.detail().as_deref(), Some("quota exceeded"));

        let e: RemoteError =
            serde_json::from_value(json!({"detail": {"reason": "bad prompt"}})).unwrap();
        assert_eq!(e.detail().as_deref(), Some(r#"{"reason":"bad prompt"}"#));
    }
}
