use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransactionError};

pub(crate) fn ensure_not_aborted(abort: Option<&CancellationToken>) -> Result<()> {
    match abort {
        Some(token) if token.is_cancelled() => Err(TransactionError::Aborted),
        _ => Ok(()),
    }
}

/// Awaits `future` unless `abort` fires first. The token is checked again once the
/// future resolves so no further work starts after cancellation.
pub(crate) async fn abortable<F, T, E>(abort: Option<&CancellationToken>, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<TransactionError>,
{
    ensure_not_aborted(abort)?;
    let result = match abort {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TransactionError::Aborted),
            result = future => result,
        },
        None => future.await,
    };
    let value = result.map_err(Into::into)?;
    ensure_not_aborted(abort)?;
    Ok(value)
}
