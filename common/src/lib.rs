pub mod envelope;
pub mod remote;
pub mod status;
pub mod task;

pub use envelope::{Envelope, SUCCESS_CODE};
pub use remote::{CreateTaskRequest, RemoteError, RemoteMeta, RemoteTask, TaskConfig, WebhookConfig};
pub use status::{TaskStatus, STATUS_ALIASES};
pub use task::{normalize_output, TaskId, TaskSnapshot, MISSING_ERROR_DETAIL};
