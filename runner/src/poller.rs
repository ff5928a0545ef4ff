//! Espera activa de una tarea remota hasta que llegue a un estado terminal.
//!
//! El loop tiene dos puntos de suspensión (la consulta HTTP y el sleep entre
//! consultas) y ambos compiten contra el mismo `CancellationToken`.

use std::time::Duration;

use async_trait::async_trait;
use common::{TaskId, TaskSnapshot, TaskStatus};
use serde_json::{Map, Value};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::error::{CoreError, CoreResult};
use crate::request_client::RequestClient;

/// De dónde sale el estado de una tarea. Debe ser de solo lectura.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_task(&self, task_id: &str) -> CoreResult<TaskSnapshot>;
}

#[async_trait]
impl TaskSource for RequestClient {
    async fn fetch_task(&self, task_id: &str) -> CoreResult<TaskSnapshot> {
        self.get_task(task_id).await
    }
}

/// Estados del loop de espera. `TimedOut` lo impone el poller, no el API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Completed | PollState::Failed | PollState::TimedOut
        )
    }

    /// Incorpora un estado observado sin retroceder nunca.
    pub fn observe(self, status: TaskStatus) -> PollState {
        if self.is_terminal() {
            return self;
        }
        let (Some(next_rank), Some(current_rank)) = (status.rank(), self.as_status().rank()) else {
            return self;
        };
        if next_rank < current_rank {
            return self;
        }
        match status {
            TaskStatus::Pending => PollState::Pending,
            TaskStatus::Processing => PollState::Processing,
            TaskStatus::Completed => PollState::Completed,
            TaskStatus::Failed => PollState::Failed,
            TaskStatus::Unknown => self,
        }
    }

    fn as_status(self) -> TaskStatus {
        match self {
            PollState::Pending => TaskStatus::Pending,
            PollState::Processing => TaskStatus::Processing,
            PollState::Completed => TaskStatus::Completed,
            PollState::Failed => TaskStatus::Failed,
            PollState::TimedOut => TaskStatus::Unknown,
        }
    }
}

/// Resultado de una espera exitosa.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTask {
    pub task_id: TaskId,
    pub result: Map<String, Value>,
    /// Consultas hechas (solo informativo)
    pub attempts: u32,
    pub elapsed: Duration,
    pub snapshot: TaskSnapshot,
}

#[derive(Debug, Clone)]
pub struct TaskPoller<S> {
    source: S,
    config: PollConfig,
}

impl<S: TaskSource> TaskPoller<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn wait(&self, task_id: &str, cancel: &CancellationToken) -> CoreResult<CompletedTask> {
        self.wait_with(task_id, self.config, cancel).await
    }

    /// Igual que `wait` pero con intervalo/presupuesto elegidos por quien llama.
    pub async fn wait_with(
        &self,
        task_id: &str,
        config: PollConfig,
        cancel: &CancellationToken,
    ) -> CoreResult<CompletedTask> {
        config.validate()?;

        let started = Instant::now();
        // un max_wait absurdo no debe desbordar el Instant
        let deadline = started
            .checked_add(config.max_wait)
            .unwrap_or_else(|| started + Duration::from_secs(60 * 60 * 24 * 365));
        let mut state = PollState::Pending;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(task_id, attempts)),
                r = self.source.fetch_task(task_id) => r,
                // una consulta lenta no estira el presupuesto
                _ = sleep_until(deadline) => {
                    return Err(timed_out(task_id, &mut state, attempts, started.elapsed()));
                }
            };

            match fetched {
                Ok(snapshot) => {
                    if snapshot.status == TaskStatus::Unknown {
                        warn!(
                            task_id = %task_id,
                            raw_status = %snapshot.raw_status,
                            "estado remoto desconocido, sigo esperando"
                        );
                    }

                    let next = state.observe(snapshot.status);
                    if next != state {
                        debug!(task_id = %task_id, from = ?state, to = ?next, "cambio de estado");
                    }
                    state = next;

                    match state {
                        PollState::Completed => {
                            let elapsed = started.elapsed();
                            info!(
                                task_id = %task_id,
                                attempts,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "tarea completada"
                            );
                            return Ok(CompletedTask {
                                task_id: task_id.to_string(),
                                result: snapshot.result.clone().unwrap_or_default(),
                                attempts,
                                elapsed,
                                snapshot,
                            });
                        }
                        PollState::Failed => {
                            let message = snapshot
                                .error_detail
                                .unwrap_or_else(|| common::MISSING_ERROR_DETAIL.to_string());
                            warn!(task_id = %task_id, attempts, error = %message, "tarea fallida");
                            return Err(CoreError::TaskFailed {
                                task_id: task_id.to_string(),
                                message,
                            });
                        }
                        _ => {}
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!(task_id = %task_id, attempts, error = %e, "consulta fallida, reintento");
                }
                Err(e) => {
                    warn!(task_id = %task_id, attempts, error = %e, "error no recuperable, abandono la espera");
                    return Err(e);
                }
            }

            // presupuesto antes de dormir
            let elapsed = started.elapsed();
            if elapsed >= config.max_wait {
                return Err(timed_out(task_id, &mut state, attempts, elapsed));
            }

            let nap = config.interval.min(config.max_wait - elapsed);
            debug!(task_id = %task_id, state = ?state, nap_ms = nap.as_millis() as u64, "esperando siguiente consulta");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(task_id, attempts)),
                _ = sleep(nap) => {}
            }
        }
    }
}

/// Pasa el loop a `TimedOut` y arma el error con el último estado visto.
fn timed_out(task_id: &str, state: &mut PollState, attempts: u32, elapsed: Duration) -> CoreError {
    let last_status = state.as_status();
    *state = PollState::TimedOut;
    debug!(task_id = %task_id, to = ?*state, "cambio de estado");
    warn!(
        task_id = %task_id,
        attempts,
        last_status = %last_status,
        waited_ms = elapsed.as_millis() as u64,
        "se agotó la espera"
    );
    CoreError::Timeout {
        task_id: task_id.to_string(),
        waited: elapsed,
        last_status,
    }
}

fn cancelled(task_id: &str, attempts: u32) -> CoreError {
    info!(task_id = %task_id, attempts, "espera cancelada");
    CoreError::Cancelled {
        task_id: task_id.to_string(),
    }
}
