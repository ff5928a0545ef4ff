//! Mock local del API de tareas (`POST /api/v1/task`, `GET /api/v1/task/:id`).
//! Sirve para probar el núcleo sin tocar el servicio real.

pub mod handlers;
pub mod state;

pub use handlers::{build_router, API_KEY_HEADER};
pub use state::{AppState, MockConfig, MockTask, Outcome};

use std::net::SocketAddr;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::warn;

/// Mock levantado en un puerto efímero; se apaga al hacer drop.
pub struct MockServer {
    addr: SocketAddr,
    state: AppState,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn task_count(&self) -> usize {
        self.state.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// GETs recibidos para una tarea (0 si no existe)
    pub fn polls(&self, task_id: &str) -> u32 {
        self.state
            .tasks
            .lock()
            .ok()
            .and_then(|t| t.get(task_id).map(|task| task.polls))
            .unwrap_or(0)
    }

    pub fn total_polls(&self) -> u32 {
        self.state
            .tasks
            .lock()
            .map(|t| t.values().map(|task| task.polls).sum())
            .unwrap_or(0)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn(config: MockConfig) -> std::io::Result<MockServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = AppState::new(config);
    let app = build_router(state.clone());

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("mock detenido con error: {:?}", e);
        }
    });

    Ok(MockServer {
        addr,
        state,
        handle,
    })
}
