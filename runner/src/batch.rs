//! Procesa varios items (uno por entrada del adaptador) con concurrencia
//! acotada. "Continuar ante fallos" es política de quien llama: el núcleo
//! siempre devuelve el error, aquí solo decidimos si se anota o si corta.

use std::future::Future;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub concurrency: usize,
    pub continue_on_failure: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            continue_on_failure: false,
        }
    }
}

/// Resultado de un item, en la misma posición que su entrada.
#[derive(Debug)]
pub struct ItemOutcome<R> {
    pub index: usize,
    pub result: CoreResult<R>,
}

impl<R> ItemOutcome<R> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Error)]
#[error("el item {index} falló: {source}")]
pub struct BatchError {
    pub index: usize,
    #[source]
    pub source: CoreError,
}

/// Corre `f(index, item, token)` para cada item, como mucho `concurrency`
/// a la vez, y devuelve los resultados en el orden de entrada.
///
/// Sin `continue_on_failure`, el primer fallo (en orden de entrada) cancela
/// el token hijo y descarta los items que quedaban en vuelo.
pub async fn run_batch<T, R, F, Fut>(
    items: Vec<T>,
    policy: BatchPolicy,
    cancel: &CancellationToken,
    f: F,
) -> Result<Vec<ItemOutcome<R>>, BatchError>
where
    F: Fn(usize, T, CancellationToken) -> Fut,
    Fut: Future<Output = CoreResult<R>>,
{
    let total = items.len();
    let child = cancel.child_token();
    let concurrency = policy.concurrency.max(1);

    let mut results = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = f(index, item, child.clone());
            async move { (index, fut.await) }
        })
        .buffered(concurrency);

    let mut outcomes = Vec::with_capacity(total);
    let mut failed = 0usize;

    while let Some((index, result)) = results.next().await {
        match result {
            Err(source) if !policy.continue_on_failure => {
                warn!(index, error = %source, "item fallido, corto el lote");
                child.cancel();
                return Err(BatchError { index, source });
            }
            Err(ref e) => {
                failed += 1;
                warn!(index, error = %e, "item fallido, sigo con el resto");
            }
            Ok(_) => {}
        }
        outcomes.push(ItemOutcome { index, result });
    }

    info!(total, failed, "lote terminado");
    Ok(outcomes)
}
