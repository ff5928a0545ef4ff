use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{CreateTaskRequest, TaskConfig, TaskSnapshot};
use runner::{
    batch::DEFAULT_BATCH_CONCURRENCY, run_batch, BatchPolicy, CancellationToken, CompletedTask,
    CoreConfig, CoreError, CredentialProvider, EnvCredentials, ItemOutcome, PollConfig,
    StaticCredentials, SubmitOptions, Submission, TaskRunner, TASK_PATH,
};
use serde_json::{json, Value};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para crear tareas en el API de generación de medios y esperar su resultado")]
struct Cli {
    /// URL base del API (si no, PIAPI_BASE_URL o https://api.piapi.ai)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// API key (si no, se lee de PIAPI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy, Default)]
struct PollArgs {
    /// Intervalo entre consultas de estado
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Tiempo máximo de espera
    #[arg(long)]
    max_wait_secs: Option<u64>,
}

impl PollArgs {
    fn apply(self, base: PollConfig) -> PollConfig {
        PollConfig {
            interval: self
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(base.interval),
            max_wait: self
                .max_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(base.max_wait),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Crea una tarea (y opcionalmente espera a que termine)
    Submit {
        #[arg(long)]
        model: String,

        #[arg(long)]
        task_type: String,

        /// Objeto JSON con los parámetros del modelo
        #[arg(long, default_value = "{}")]
        input: String,

        /// Objeto JSON con service_mode / webhook_config
        #[arg(long)]
        config: Option<String>,

        /// Esperar el resultado en vez de devolver solo el id
        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Consulta el estado de una tarea (una sola vez)
    Status {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Espera a que una tarea ya creada termine
    Wait {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Crea y espera una tarea por cada línea (objeto JSON de input) del archivo
    Batch {
        #[arg(long)]
        model: String,

        #[arg(long)]
        task_type: String,

        /// Archivo JSONL: un `input` por línea
        #[arg(long, value_name = "JSONL")]
        file: PathBuf,

        #[arg(long, default_value_t = DEFAULT_BATCH_CONCURRENCY)]
        concurrency: usize,

        /// Un item fallido no corta el resto; el error queda en su línea
        #[arg(long)]
        continue_on_failure: bool,

        #[command(flatten)]
        poll: PollArgs,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CoreConfig::from_env()?;
    if let Some(url) = cli.base_url {
        config.api.base_url = url;
    }

    let credentials: Arc<dyn CredentialProvider> = match cli.api_key {
        Some(key) => Arc::new(StaticCredentials::new(key)),
        None => Arc::new(EnvCredentials::default()),
    };

    let runner = TaskRunner::from_config(&config, credentials)?;

    // Ctrl-C corta cualquier espera en curso
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C recibido, cancelando...");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Submit {
            model,
            task_type,
            input,
            config,
            wait,
            poll,
        } => {
            let input = parse_json_object(&input, "--input")?;
            let mut req = CreateTaskRequest::new(model, task_type, input);
            if let Some(raw) = config {
                let task_config: TaskConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("--config no es un TaskConfig válido: {raw}"))?;
                req = req.with_config(task_config);
            }

            let opts = SubmitOptions {
                wait,
                poll: Some(poll.apply(runner.poll_config())),
            };

            match runner.run(&req, opts, &cancel).await? {
                Submission::Queued(snapshot) => {
                    println!("Tarea creada:");
                    print_snapshot(&snapshot);
                }
                Submission::Finished(done) => print_completed(&done)?,
            }
        }

        Commands::Status { task_id } => {
            let snapshot = runner.status(&task_id).await?;
            println!("Tarea:");
            print_snapshot(&snapshot);
            if let Some(result) = &snapshot.result {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }

        Commands::Wait { task_id, poll } => {
            let poll = poll.apply(runner.poll_config());
            let done = runner.wait(&task_id, Some(poll), &cancel).await?;
            print_completed(&done)?;
        }

        Commands::Batch {
            model,
            task_type,
            file,
            concurrency,
            continue_on_failure,
            poll,
        } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("no se pudo leer {}", file.display()))?;
            let inputs = parse_jsonl(&raw)?;
            info!("lote de {} items desde {}", inputs.len(), file.display());

            let opts = SubmitOptions::wait().with_poll(poll.apply(runner.poll_config()));
            let policy = BatchPolicy {
                concurrency,
                continue_on_failure,
            };

            let runner = &runner;
            let (model, task_type) = (&model, &task_type);
            let outcomes = run_batch(inputs, policy, &cancel, |_, input, token| {
                let req = CreateTaskRequest::new(model.as_str(), task_type.as_str(), input);
                async move {
                    match runner.run(&req, opts, &token).await? {
                        Submission::Finished(done) => Ok(done),
                        // con wait=true siempre termina en Finished
                        Submission::Queued(snapshot) => Err(CoreError::invalid_response(
                            TASK_PATH,
                            format!("la tarea {} quedó sin esperar", snapshot.id),
                        )),
                    }
                }
            })
            .await?;

            let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
            for outcome in &outcomes {
                println!("{}", outcome_line(outcome));
            }
            if failed > 0 {
                warn!("{} de {} items fallaron", failed, outcomes.len());
            }
        }
    }

    Ok(())
}

fn parse_json_object(raw: &str, flag: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{flag} no es JSON válido"))?;
    if !value.is_object() {
        bail!("{flag} debe ser un objeto JSON");
    }
    Ok(value)
}

fn parse_jsonl(raw: &str) -> Result<Vec<Value>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| parse_json_object(line, &format!("línea {}", n + 1)))
        .collect()
}

/// Una línea JSON por item: resultado o error, siempre con su índice.
fn outcome_line(outcome: &ItemOutcome<CompletedTask>) -> Value {
    match &outcome.result {
        Ok(done) => json!({
            "index": outcome.index,
            "task_id": done.task_id,
            "result": done.result,
        }),
        Err(e) => json!({
            "index": outcome.index,
            "error": e.to_string(),
            "kind": format!("{:?}", e.kind()),
        }),
    }
}

fn print_snapshot(snapshot: &TaskSnapshot) {
    println!("  id: {}", snapshot.id);
    println!("  modelo: {}", snapshot.model);
    println!("  tipo: {}", snapshot.task_type);
    println!("  estado: {} ({})", snapshot.status, snapshot.raw_status);
    if let Some(created) = snapshot.created_at {
        println!("  creada: {}", created);
    }
    if let Some(err) = &snapshot.error_detail {
        println!("  error: {}", err);
    }
}

fn print_completed(done: &CompletedTask) -> Result<()> {
    println!("Tarea {} completada:", done.task_id);
    println!("  consultas: {}", done.attempts);
    println!("  espera: {:.1}s", done.elapsed.as_secs_f64());
    println!("{}", serde_json::to_string_pretty(&done.result)?);
    Ok(())
}
