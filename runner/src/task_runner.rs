use std::sync::Arc;

use common::{CreateTaskRequest, TaskSnapshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{CoreConfig, PollConfig};
use crate::credentials::CredentialProvider;
use crate::error::CoreResult;
use crate::poller::{CompletedTask, TaskPoller};
use crate::request_client::{OutboundRequest, RequestClient};

/// Qué hacer después de crear la tarea.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Esperar a que la tarea termine antes de devolver
    pub wait: bool,
    /// Intervalo/presupuesto propio; `None` usa el del runner
    pub poll: Option<PollConfig>,
}

impl SubmitOptions {
    pub fn fire_and_forget() -> Self {
        Self::default()
    }

    pub fn wait() -> Self {
        Self {
            wait: true,
            poll: None,
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = Some(poll);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Creada, sin esperar (el id sirve para consultar después)
    Queued(TaskSnapshot),
    Finished(CompletedTask),
}

impl Submission {
    pub fn task_id(&self) -> &str {
        match self {
            Submission::Queued(snapshot) => &snapshot.id,
            Submission::Finished(done) => &done.task_id,
        }
    }
}

/// Crear + (opcionalmente) esperar, que es lo que hace cada adaptador.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    poller: TaskPoller<RequestClient>,
}

impl TaskRunner {
    pub fn new(client: RequestClient, poll: PollConfig) -> Self {
        Self {
            poller: TaskPoller::new(client, poll),
        }
    }

    pub fn from_config(
        config: &CoreConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> CoreResult<Self> {
        config.poll.validate()?;
        let client = RequestClient::new(config.api.clone(), credentials)?;
        Ok(Self::new(client, config.poll))
    }

    pub fn client(&self) -> &RequestClient {
        self.poller.source()
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poller.config()
    }

    pub async fn run(
        &self,
        req: &CreateTaskRequest,
        opts: SubmitOptions,
        cancel: &CancellationToken,
    ) -> CoreResult<Submission> {
        let created = self.client().create_task(req).await?;
        self.finish(created, opts, cancel).await
    }

    /// Igual que `run` pero con el triple `(method, path, body)` del adaptador.
    pub async fn run_raw(
        &self,
        req: OutboundRequest,
        opts: SubmitOptions,
        cancel: &CancellationToken,
    ) -> CoreResult<Submission> {
        let created = self.client().submit(req).await?;
        self.finish(created, opts, cancel).await
    }

    pub async fn status(&self, task_id: &str) -> CoreResult<TaskSnapshot> {
        self.client().get_task(task_id).await
    }

    pub async fn wait(
        &self,
        task_id: &str,
        poll: Option<PollConfig>,
        cancel: &CancellationToken,
    ) -> CoreResult<CompletedTask> {
        let poll = poll.unwrap_or_else(|| self.poller.config());
        self.poller.wait_with(task_id, poll, cancel).await
    }

    async fn finish(
        &self,
        created: TaskSnapshot,
        opts: SubmitOptions,
        cancel: &CancellationToken,
    ) -> CoreResult<Submission> {
        if !opts.wait {
            return Ok(Submission::Queued(created));
        }

        debug!(task_id = %created.id, "esperando a que la tarea termine");
        let done = self.wait(&created.id, opts.poll, cancel).await?;
        Ok(Submission::Finished(done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::credentials::StaticCredentials;
    use crate::error::{CoreError, ErrorKind};
    use common::TaskStatus;
    use mockapi::MockConfig;
    use serde_json::json;
    use std::time::Duration;

    const KEY: &str = "test-key";

    fn fast_poll() -> PollConfig {
        PollConfig::new(Duration::from_millis(10), Duration::from_secs(5))
    }

    async fn runner_with(config: MockConfig) -> (mockapi::MockServer, TaskRunner) {
        let server = mockapi::spawn(config).await.unwrap();
        let client = RequestClient::new(
            ApiConfig::default().with_base_url(server.base_url()),
            Arc::new(StaticCredentials::new(KEY)),
        )
        .unwrap();
        (server, TaskRunner::new(client, fast_poll()))
    }

    fn mock_config() -> MockConfig {
        let mut config = MockConfig::with_api_key(KEY);
        config.pending_polls = 1;
        config.processing_polls = 1;
        config
    }

    #[tokio::test]
    async fn sin_wait_devuelve_la_tarea_encolada() {
        let (server, runner) = runner_with(mock_config()).await;
        let req = CreateTaskRequest::new("kling", "video_generation", json!({"prompt": "mar"}));

        let sub = runner
            .run(&req, SubmitOptions::fire_and_forget(), &CancellationToken::new())
            .await
            .unwrap();

        match sub {
            Submission::Queued(ref snap) => assert_eq!(snap.status, TaskStatus::Pending),
            ref other => panic!("esperaba Queued, llegó {other:?}"),
        }
        assert_eq!(server.polls(sub.task_id()), 0);
    }

    #[tokio::test]
    async fn con_wait_llega_hasta_completed() {
        let (server, runner) = runner_with(mock_config()).await;
        let req = CreateTaskRequest::new(
            "kling",
            "video_generation",
            json!({"mock_output": {"url": "https://x/y.mp4"}}),
        );

        let sub = runner
            .run(&req, SubmitOptions::wait(), &CancellationToken::new())
            .await
            .unwrap();

        let Submission::Finished(done) = sub else {
            panic!("esperaba Finished");
        };
        assert_eq!(done.result["url"], "https://x/y.mp4");
        assert_eq!(done.snapshot.status, TaskStatus::Completed);
        // pending, processing, completed
        assert_eq!(server.polls(&done.task_id), 3);
    }

    #[tokio::test]
    async fn creacion_fallida_no_hace_polls() {
        let mut config = mock_config();
        config.models = vec!["kling".to_string()];
        let (server, runner) = runner_with(config).await;
        let req = CreateTaskRequest::new("inexistente", "video_generation", json!({}));

        let err = runner
            .run(&req, SubmitOptions::wait(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Application);
        assert_eq!(err.remote_message(), Some("invalid model"));
        assert_eq!(server.task_count(), 0);
        assert_eq!(server.total_polls(), 0);
    }

    #[tokio::test]
    async fn tarea_fallida_remota_es_task_failed() {
        let (_server, runner) = runner_with(mock_config()).await;
        let req = CreateTaskRequest::new(
            "midjourney",
            "imagine",
            json!({"mock_outcome": "fail", "mock_error": "prompt bloqueado"}),
        );

        let err = runner
            .run(&req, SubmitOptions::wait(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            CoreError::TaskFailed { ref message, .. } => assert_eq!(message, "prompt bloqueado"),
            other => panic!("esperaba TaskFailed, llegó {other:?}"),
        }
    }

    #[tokio::test]
    async fn polls_con_503_se_toleran_hasta_terminar() {
        let (server, runner) = runner_with(mock_config()).await;
        let req = CreateTaskRequest::new("kling", "video_generation", json!({"mock_flaky_polls": 2}));

        let sub = runner
            .run(&req, SubmitOptions::wait(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(sub, Submission::Finished(_)));
        // 2 fallidos + pending + processing + completed
        assert_eq!(server.polls(sub.task_id()), 5);
    }

    #[tokio::test]
    async fn tarea_atascada_termina_en_timeout() {
        let (_server, runner) = runner_with(mock_config()).await;
        let req = CreateTaskRequest::new("kling", "video_generation", json!({"mock_outcome": "stuck"}));
        let opts = SubmitOptions::wait()
            .with_poll(PollConfig::new(Duration::from_millis(20), Duration::from_millis(200)));

        let started = std::time::Instant::now();
        let err = runner
            .run(&req, opts, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn status_y_wait_por_id() {
        let (_server, runner) = runner_with(mock_config()).await;
        let req = CreateTaskRequest::new("suno", "music", json!({"mock_output": {"clip": "a.mp3"}}));
        let cancel = CancellationToken::new();

        let sub = runner.run(&req, SubmitOptions::default(), &cancel).await.unwrap();
        let id = sub.task_id().to_string();

        let snap = runner.status(&id).await.unwrap();
        assert_eq!(snap.id, id);

        let done = runner.wait(&id, None, &cancel).await.unwrap();
        assert_eq!(done.result["clip"], "a.mp3");

        // otra espera sobre la misma tarea terminal da lo mismo
        let again = runner.wait(&id, None, &cancel).await.unwrap();
        assert_eq!(again.result, done.result);
        assert_eq!(again.attempts, 1);
    }

    #[test]
    fn from_config_rechaza_intervalo_cero() {
        let mut config = CoreConfig::default();
        config.poll.interval = Duration::ZERO;
        let err = TaskRunner::from_config(&config, Arc::new(StaticCredentials::new(KEY)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
