use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// Run a future, converting a panic inside it into an `Err` with the panic message.
///
/// Background tasks wrap their body in this so a panic is reported as an
/// event instead of silently killing the task.
pub async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic payload".to_string()
            }
        })
}
