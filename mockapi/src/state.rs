// mockapi/src/state.rs

use chrono::{DateTime, Utc};
use common::TaskId;
use serde_json::Value;
use std::{
    collections::HashMap,
    env,
    sync::{Arc, Mutex},
};

/// Cómo se comporta el mock.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Si está, cada request debe traer `x-api-key` con este valor
    pub api_key: Option<String>,
    /// Consultas que la tarea pasa en "pending"
    pub pending_polls: u32,
    /// Consultas que pasa en "processing" antes de terminar
    pub processing_polls: u32,
    /// Modelos aceptados; vacío = cualquiera
    pub models: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            pending_polls: 1,
            processing_polls: 2,
            models: Vec::new(),
        }
    }
}

impl MockConfig {
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// MOCK_API_KEY, MOCK_PENDING_POLLS, MOCK_PROCESSING_POLLS,
    /// MOCK_MODELS (separados por coma)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.api_key = env::var("MOCK_API_KEY").ok().filter(|k| !k.is_empty());
        if let Some(n) = env::var("MOCK_PENDING_POLLS").ok().and_then(|s| s.parse().ok()) {
            cfg.pending_polls = n;
        }
        if let Some(n) = env::var("MOCK_PROCESSING_POLLS").ok().and_then(|s| s.parse().ok()) {
            cfg.processing_polls = n;
        }
        if let Ok(models) = env::var("MOCK_MODELS") {
            cfg.models = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        cfg
    }

    pub fn accepts_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }
}

/// Lo que el "cliente" pidió que le pase a la tarea (viene en `input`).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Complete(Value),
    Fail(String),
    /// Nunca termina: sirve para probar timeouts
    Stuck,
}

#[derive(Debug, Clone)]
pub struct MockTask {
    pub id: TaskId,
    pub model: String,
    pub task_type: String,
    pub input: Value,
    pub outcome: Outcome,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    // Métricas
    /// GETs recibidos (incluye los que devolvieron 503)
    pub polls: u32,
    /// GETs que sí avanzaron la tarea
    pub progress: u32,
    /// 503s que quedan por devolver
    pub flaky_left: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MockConfig>,
    pub tasks: Arc<Mutex<HashMap<TaskId, MockTask>>>,
}

impl AppState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config: Arc::new(config),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
