use std::{fmt, sync::Arc};

use common::{CreateTaskRequest, Envelope, RemoteTask, TaskSnapshot};
use reqwest::{
    header::{HeaderName, HeaderValue},
    Client, Method, Url,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ApiConfig;
use crate::credentials::CredentialProvider;
use crate::error::{CoreError, CoreResult};

pub const TASK_PATH: &str = "/api/v1/task";

/// Un request hacia el API, armado de cero en cada llamada.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path, Some(body))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Cliente HTTP autenticado contra el API de tareas.
///
/// Hace exactamente una llamada por método: los reintentos, si los hay,
/// son cosa del poller. El `reqwest::Client` interno mantiene el pool de
/// conexiones, así que clonar esto es barato y se comparte entre flujos.
#[derive(Clone)]
pub struct RequestClient {
    http: Client,
    base_url: String,
    api_key_header: HeaderName,
    credentials: Arc<dyn CredentialProvider>,
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.base_url)
            .field("api_key_header", &self.api_key_header)
            .finish()
    }
}

impl RequestClient {
    pub fn new(config: ApiConfig, credentials: Arc<dyn CredentialProvider>) -> CoreResult<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| CoreError::config(format!("base_url inválida {base_url:?}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(CoreError::config(format!(
                "base_url no puede usarse como base: {base_url:?}"
            )));
        }

        let api_key_header = HeaderName::from_bytes(config.api_key_header.as_bytes())
            .map_err(|e| CoreError::config(format!("header de API key inválido: {e}")))?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("runner/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::config(format!("no se pudo crear el cliente HTTP: {e}")))?;

        debug!(
            base_url = %base_url,
            timeout_ms = config.request_timeout.as_millis() as u64,
            "cliente de tareas creado"
        );

        Ok(Self {
            http,
            base_url,
            api_key_header,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> CoreResult<Url> {
        let joined = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&joined).map_err(|e| CoreError::config(format!("path inválido {path:?}: {e}")))
    }

    /// `{base}/api/v1/task/{id}` con el id como un único segmento codificado.
    fn task_url(&self, task_id: &str) -> CoreResult<Url> {
        if matches!(task_id.trim(), "" | "." | "..") {
            return Err(CoreError::config(format!("task_id inválido: {task_id:?}")));
        }
        let mut url = self.url_for(TASK_PATH)?;
        url.path_segments_mut()
            .map_err(|_| CoreError::config("base_url no admite segmentos de path"))?
            .push(task_id);
        Ok(url)
    }

    /// Una llamada autenticada. Devuelve `data` del envelope (o `null`).
    pub async fn send(&self, req: OutboundRequest) -> CoreResult<Value> {
        let url = self.url_for(&req.path)?;
        self.send_to(url, req).await
    }

    async fn send_to(&self, url: Url, req: OutboundRequest) -> CoreResult<Value> {
        let OutboundRequest {
            method,
            path,
            body,
            headers,
        } = req;

        let key = self.credentials.api_key()?;
        let mut key_value = HeaderValue::from_str(key.expose())
            .map_err(|_| CoreError::config("la API key tiene caracteres no válidos en un header"))?;
        key_value.set_sensitive(true);

        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(self.api_key_header.clone(), key_value);

        for (name, value) in &headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CoreError::config(format!("header inválido {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CoreError::config(format!("valor de header inválido: {e}")))?;
            builder = builder.header(name, value);
        }

        if let Some(body) = &body {
            builder = builder.json(body);
        }

        debug!(method = %method, path = %path, "llamando al API de tareas");

        let resp = builder.send().await.map_err(|source| CoreError::Transport {
            path: path.clone(),
            source,
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|source| CoreError::Transport {
            path: path.clone(),
            source,
        })?;

        if !status.is_success() {
            debug!(path = %path, status = status.as_u16(), "respuesta HTTP no exitosa");
            return Err(CoreError::HttpStatus {
                path,
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: Envelope<Value> = serde_json::from_str(&text).map_err(|e| {
            CoreError::invalid_response(&path, format!("envelope ilegible: {e}"))
        })?;

        if !envelope.is_success() {
            return Err(CoreError::Application {
                path,
                code: envelope.code,
                message: envelope.message,
            });
        }

        Ok(envelope.data.unwrap_or(Value::Null))
    }

    /// Llamada de creación arbitraria `(method, path, body)` de un adaptador.
    /// Nunca se reintenta: duplicaría un job que se cobra.
    pub async fn submit(&self, req: OutboundRequest) -> CoreResult<TaskSnapshot> {
        let path = req.path.clone();
        let data = self.send(req).await?;
        let snapshot = parse_task(&path, data)?;

        info!(
            task_id = %snapshot.id,
            model = %snapshot.model,
            task_type = %snapshot.task_type,
            "tarea creada"
        );
        Ok(snapshot)
    }

    /// POST /api/v1/task
    pub async fn create_task(&self, req: &CreateTaskRequest) -> CoreResult<TaskSnapshot> {
        let body = serde_json::to_value(req)
            .map_err(|e| CoreError::config(format!("no se pudo serializar la tarea: {e}")))?;
        self.submit(OutboundRequest::post(TASK_PATH, body)).await
    }

    /// GET /api/v1/task/{id}. Solo lectura: se puede repetir sin problema.
    pub async fn get_task(&self, task_id: &str) -> CoreResult<TaskSnapshot> {
        let url = self.task_url(task_id)?;
        let path = format!("{TASK_PATH}/{task_id}");

        match self.send_to(url, OutboundRequest::get(&path)).await {
            // tarea inexistente: no tiene sentido seguir consultando
            Err(CoreError::HttpStatus {
                path,
                status: 404,
                body,
            }) => Err(CoreError::Application {
                path,
                code: 404,
                message: message_from_body(&body).unwrap_or_else(|| "task not found".to_string()),
            }),
            Err(e) => Err(e),
            Ok(data) => parse_task(&path, data),
        }
    }
}

fn parse_task(path: &str, data: Value) -> CoreResult<TaskSnapshot> {
    let remote: RemoteTask = serde_json::from_value(data)
        .map_err(|e| CoreError::invalid_response(path, format!("data sin tarea válida: {e}")))?;

    if remote.task_id.trim().is_empty() {
        return Err(CoreError::invalid_response(path, "task_id vacío"));
    }

    Ok(TaskSnapshot::from_remote(remote))
}

fn message_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<Envelope<Value>>(body)
        .ok()
        .map(|env| env.message)
        .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::error::ErrorKind;
    use common::TaskStatus;
    use mockapi::MockConfig;
    use serde_json::json;

    const KEY: &str = "test-key";

    fn client_for(base_url: &str, key: &str) -> RequestClient {
        RequestClient::new(
            ApiConfig::default().with_base_url(base_url),
            Arc::new(StaticCredentials::new(key)),
        )
        .unwrap()
    }

    fn kling(input: Value) -> CreateTaskRequest {
        CreateTaskRequest::new("kling", "video_generation", input)
    }

    #[test]
    fn base_url_invalida_es_error_de_config() {
        let err = RequestClient::new(
            ApiConfig::default().with_base_url("no es una url"),
            Arc::new(StaticCredentials::new(KEY)),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn url_for_respeta_prefijo_de_la_base() {
        let client = client_for("http://proxy.local/piapi/", KEY);
        let url = client.url_for("/api/v1/task/abc").unwrap();
        assert_eq!(url.as_str(), "http://proxy.local/piapi/api/v1/task/abc");
    }

    #[test]
    fn task_url_codifica_el_id_como_un_solo_segmento() {
        let client = client_for("http://proxy.local/piapi", KEY);
        let url = client.task_url("a/b?c#d").unwrap();
        assert_eq!(url.path(), "/piapi/api/v1/task/a%2Fb%3Fc%23d");
        assert_eq!(url.query(), None);

        for bad in ["", " ", ".", ".."] {
            let err = client.task_url(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
        }
    }

    #[test]
    fn outbound_request_post_lleva_body() {
        let req = OutboundRequest::post(TASK_PATH, json!({"model": "x"})).with_header("x-trace", "1");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.body, Some(json!({"model": "x"})));
        assert_eq!(req.headers, vec![("x-trace".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn create_task_devuelve_id_estable() {
        let server = mockapi::spawn(MockConfig::with_api_key(KEY)).await.unwrap();
        let client = client_for(&server.base_url(), KEY);

        let created = client.create_task(&kling(json!({"prompt": "un gato"}))).await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(created.model, "kling");

        let fetched = client.get_task(&created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn code_distinto_de_200_es_application_error() {
        let mut config = MockConfig::with_api_key(KEY);
        config.models = vec!["kling".to_string()];
        let server = mockapi::spawn(config).await.unwrap();
        let client = client_for(&server.base_url(), KEY);

        let req = CreateTaskRequest::new("modelo-raro", "video_generation", json!({}));
        let err = client.create_task(&req).await.unwrap_err();

        match err {
            CoreError::Application { code, ref message, ref path } => {
                assert_eq!(code, 500);
                assert_eq!(message, "invalid model");
                assert_eq!(path, TASK_PATH);
            }
            other => panic!("esperaba Application, llegó {other:?}"),
        }
        assert_eq!(server.task_count(), 0);
    }

    #[tokio::test]
    async fn key_incorrecta_es_http_status_error() {
        let server = mockapi::spawn(MockConfig::with_api_key(KEY)).await.unwrap();
        let client = client_for(&server.base_url(), "otra-key");

        let err = client.create_task(&kling(json!({}))).await.unwrap_err();
        match err {
            CoreError::HttpStatus { status, ref body, .. } => {
                assert_eq!(status, 401);
                assert!(body.contains("unauthorized"));
            }
            other => panic!("esperaba HttpStatus, llegó {other:?}"),
        }
        assert!(!err_is_recoverable(401));
    }

    fn err_is_recoverable(status: u16) -> bool {
        CoreError::HttpStatus {
            path: TASK_PATH.into(),
            status,
            body: String::new(),
        }
        .is_recoverable()
    }

    #[tokio::test]
    async fn tarea_inexistente_es_application_404() {
        let server = mockapi::spawn(MockConfig::with_api_key(KEY)).await.unwrap();
        let client = client_for(&server.base_url(), KEY);

        let err = client.get_task("no-existe").await.unwrap_err();
        match err {
            CoreError::Application { code, ref message, .. } => {
                assert_eq!(code, 404);
                assert_eq!(message, "task not found");
            }
            other => panic!("esperaba Application, llegó {other:?}"),
        }
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn id_con_barras_no_cambia_el_endpoint() {
        let server = mockapi::spawn(MockConfig::with_api_key(KEY)).await.unwrap();
        let client = client_for(&server.base_url(), KEY);
        let created = client.create_task(&kling(json!({}))).await.unwrap();

        // "../<id>" no debe terminar consultando la tarea real
        let err = client.get_task(&format!("../{}", created.id)).await.unwrap_err();
        assert!(matches!(err, CoreError::Application { code: 404, .. }));
        assert_eq!(server.polls(&created.id), 0);
    }

    #[tokio::test]
    async fn sin_servidor_es_transport_error() {
        // nada escucha en el puerto 1
        let client = client_for("http://127.0.0.1:1", KEY);
        let err = client.get_task("abc").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("/api/v1/task/abc"));
    }

    #[tokio::test]
    async fn submit_acepta_triple_crudo_del_adaptador() {
        let server = mockapi::spawn(MockConfig::with_api_key(KEY)).await.unwrap();
        let client = client_for(&server.base_url(), KEY);

        let body = json!({"model": "suno", "task_type": "music", "input": {"prompt": "jazz"}});
        let created = client
            .submit(OutboundRequest::new(Method::POST, TASK_PATH, Some(body)))
            .await
            .unwrap();
        assert_eq!(created.model, "suno");
        assert_eq!(server.task_count(), 1);
    }

    #[test]
    fn parse_task_sin_task_id_es_respuesta_invalida() {
        let err = parse_task(TASK_PATH, json!({"status": "pending"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);

        let err = parse_task(TASK_PATH, json!({"task_id": "  "})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }
}
