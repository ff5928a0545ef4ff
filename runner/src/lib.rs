//! Núcleo de envío y espera de tareas contra el API de generación de medios.
//!
//! - [`RequestClient`]: una llamada autenticada, errores tipados.
//! - [`TaskPoller`]: consulta el estado hasta que la tarea termina, se
//!   agota el presupuesto o se cancela.
//! - [`TaskRunner`]: crear + esperar, que es lo que usan los adaptadores.
//! - [`batch::run_batch`]: varios items con "continuar ante fallos".

pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod poller;
pub mod request_client;
pub mod task_runner;

pub use batch::{run_batch, BatchError, BatchPolicy, ItemOutcome};
pub use config::{ApiConfig, CoreConfig, PollConfig};
pub use credentials::{ApiKey, CredentialProvider, EnvCredentials, StaticCredentials};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use poller::{CompletedTask, PollState, TaskPoller, TaskSource};
pub use request_client::{OutboundRequest, RequestClient, TASK_PATH};
pub use task_runner::{SubmitOptions, Submission, TaskRunner};

pub use tokio_util::sync::CancellationToken;
