//! Spawning and joining node tasks.

use std::future::Future;
use std::pin::Pin;

use arbor_core::ProtocolError;
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinError, JoinHandle, JoinSet};

/// Boxed `Send` future, used for recursive node operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Spawn `fut` on the current tokio runtime.
///
/// Fails with [`ProtocolError::RuntimeShutDown`] when called outside a
/// runtime.
pub fn spawn<F>(fut: F) -> Result<JoinHandle<F::Output>, ProtocolError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = Handle::try_current().map_err(|_| ProtocolError::RuntimeShutDown)?;
    Ok(handle.spawn(fut))
}

fn task_failed(err: JoinError) -> ProtocolError {
    let reason = if err.is_cancelled() {
        String::from("cancelled")
    } else {
        err.to_string()
    };
    ProtocolError::TaskFailed { reason }
}

/// Await one spawned task, folding a panic or cancellation into `E`.
pub async fn join_one<T, E>(handle: JoinHandle<Result<T, E>>) -> Result<T, E>
where
    E: From<ProtocolError>,
{
    match handle.await {
        Ok(result) => result,
        Err(err) => Err(task_failed(err).into()),
    }
}

/// Aborts the tracked tasks when dropped. Aborting a finished task is a
/// no-op.
struct AbortOnDrop(Vec<AbortHandle>);

impl AbortOnDrop {
    fn track<T>(handles: &[JoinHandle<T>]) -> Self {
        Self(handles.iter().map(JoinHandle::abort_handle).collect())
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Await every task and return their results in order, or the first error
/// to arrive.
///
/// Tasks are joined in completion order. On the first failure every task
/// still running is aborted: a sibling may be parked on a channel only the
/// failed task would have filled.
pub async fn join_all<T, E>(handles: Vec<JoinHandle<Result<T, E>>>) -> Result<Vec<T>, E>
where
    T: Send + 'static,
    E: From<ProtocolError> + Send + 'static,
{
    let _guard = AbortOnDrop::track(&handles);
    let mut out: Vec<Option<T>> = std::iter::repeat_with(|| None)
        .take(handles.len())
        .collect();
    let mut set = JoinSet::new();
    for (i, handle) in handles.into_iter().enumerate() {
        set.spawn(async move { (i, join_one(handle).await) });
    }
    while let Some(joined) = set.join_next().await {
        let (i, result) = joined.map_err(|e| E::from(task_failed(e)))?;
        out[i] = Some(result?);
    }
    Ok(out.into_iter().flatten().collect())
}

/// Run a node's own share of a phase alongside its children's tasks.
///
/// Both sides are polled together; the first error from either wins and
/// every child still running is aborted.
pub async fn join_or_abort<L, T, E, F>(
    local: F,
    handles: Vec<JoinHandle<Result<T, E>>>,
) -> Result<(L, Vec<T>), E>
where
    F: Future<Output = Result<L, E>>,
    T: Send + 'static,
    E: From<ProtocolError> + Send + 'static,
{
    let _guard = AbortOnDrop::track(&handles);
    tokio::try_join!(local, join_all(handles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_all_preserves_order() {
        let handles = (0..5u32)
            .map(|i| spawn(async move { Ok::<_, ProtocolError>(i * 2) }).unwrap())
            .collect();
        assert_eq!(join_all(handles).await.unwrap(), vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn join_all_reports_first_error() {
        let handles = vec![
            spawn(async { Ok(1) }).unwrap(),
            spawn(async {
                Err(ProtocolError::InconsistentTopology {
                    reason: "first".into(),
                })
            })
            .unwrap(),
            spawn(async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Err(ProtocolError::InconsistentTopology {
                    reason: "second".into(),
                })
            })
            .unwrap(),
        ];
        let err = join_all(handles).await.unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InconsistentTopology {
                reason: "first".into()
            }
        );
    }

    #[tokio::test]
    async fn panic_becomes_task_failed() {
        let h = spawn(async {
            if true {
                panic!("boom");
            }
            Ok::<u8, ProtocolError>(0)
        })
        .unwrap();
        assert!(matches!(
            join_one(h).await,
            Err(ProtocolError::TaskFailed { .. })
        ));
    }

    #[tokio::test]
    async fn failed_caller_aborts_parked_tasks() {
        let parked = spawn(async {
            std::future::pending::<()>().await;
            Ok::<u8, ProtocolError>(0)
        })
        .unwrap();
        let local = std::future::ready(Err::<(), _>(ProtocolError::RuntimeShutDown));
        let err = join_or_abort(local, vec![parked]).await.unwrap_err();
        assert_eq!(err, ProtocolError::RuntimeShutDown);
    }

    #[tokio::test]
    async fn failed_task_aborts_parked_siblings() {
        let parked = spawn(async {
            std::future::pending::<()>().await;
            Ok::<u8, ProtocolError>(0)
        })
        .unwrap();
        let probe = parked.abort_handle();
        let failing = spawn(async { Err(ProtocolError::RuntimeShutDown) }).unwrap();
        let err = join_all(vec![parked, failing]).await.unwrap_err();
        assert_eq!(err, ProtocolError::RuntimeShutDown);
        for _ in 0..100 {
            if probe.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(probe.is_finished());
    }

    #[tokio::test]
    async fn local_share_runs_alongside_children() {
        let ch = std::sync::Arc::new(crate::Channel::new());
        let tx = std::sync::Arc::clone(&ch);
        let child = spawn(async move {
            tx.set(7u8).map_err(|_| ProtocolError::RuntimeShutDown)?;
            Ok::<_, ProtocolError>(1u8)
        })
        .unwrap();
        let local = async { Ok::<_, ProtocolError>(ch.get().await) };
        let (got, kids) = join_or_abort(local, vec![child]).await.unwrap();
        assert_eq!((got, kids), (7, vec![1]));
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let r = spawn(async {});
        assert!(matches!(r, Err(ProtocolError::RuntimeShutDown)));
    }
}
