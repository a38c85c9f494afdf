//! Checkpoint save/load driven through the tree, plus output collection.
//!
//! Save is strictly sequential and pre-order: a node appends its own record,
//! then saves each child in octant order. Load is the mirror, except that
//! children are loaded concurrently since every child's record index is
//! stored in its parent's header.
//!
//! File I/O runs on tokio's blocking pool.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arbor_checkpoint::{
    append_record, child_record_indices, CheckpointError, CheckpointReader, Record, RecordFlag,
    RecordHeader, Trailer,
};
use arbor_core::{
    LocalityId, NodeHandle, Octant, OutputList, ProtocolError, RunConfig, SubgridError, NCHILD,
};
use arbor_runtime::sync::lock;
use arbor_runtime::{join_all, join_one, BoxFuture};
use tracing::{error, trace};

use crate::error::EngineError;
use crate::node::{Clock, Node, TreeState};

/// Where a save writes and how large each record is.
#[derive(Clone, Debug)]
pub struct SaveTarget {
    /// Checkpoint file. Truncated by the record at index 0.
    pub path: PathBuf,
    /// Byte length of every record.
    pub record_size: u64,
}

/// Shared state of one tree-wide load.
pub struct LoadContext {
    reader: Mutex<CheckpointReader<BufReader<File>>>,
    total: u64,
    do_output: bool,
}

impl LoadContext {
    /// Open `path` and read its trailer.
    pub fn open(path: &Path, do_output: bool) -> Result<Self, CheckpointError> {
        let reader = CheckpointReader::open_path(path)?;
        Ok(Self {
            total: reader.record_count(),
            reader: Mutex::new(reader),
            do_output,
        })
    }

    /// The file's global scalars.
    pub fn trailer(&self) -> Trailer {
        *lock(&self.reader).trailer()
    }

    /// Number of records in the file.
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("total", &self.total)
            .field("do_output", &self.do_output)
            .finish()
    }
}

/// Result of loading one subtree.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Record index just past the subtree.
    pub next: u64,
    /// Output of the subtree's leaves in octant order, if requested.
    pub output: OutputList,
}

/// Run checkpoint I/O on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CheckpointError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => Ok(result?),
        Err(err) => Err(ProtocolError::TaskFailed {
            reason: err.to_string(),
        }
        .into()),
    }
}

/// Whether `err` means the checkpoint contents cannot be trusted, as opposed
/// to the file being unreachable.
pub(crate) fn is_corruption(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::Checkpoint(
            CheckpointError::CorruptFlag { .. }
                | CheckpointError::CorruptOffsets { .. }
                | CheckpointError::Truncated { .. }
                | CheckpointError::RecordSizeMismatch { .. }
                | CheckpointError::InvalidRecordSize { .. }
        ) | EngineError::Subgrid(SubgridError::Decode { .. })
    )
}

/// Report unrecoverable checkpoint corruption: log, wait out the grace
/// period, then abort the process unless the run opted out.
pub(crate) async fn fatal(config: &RunConfig, err: EngineError) -> EngineError {
    error!(%err, grace = ?config.fatal_grace, "corrupt checkpoint");
    tokio::time::sleep(config.fatal_grace).await;
    if config.abort_on_fatal {
        std::process::abort();
    }
    err
}

/// Pass `result` through, escalating corruption via [`fatal`].
pub(crate) async fn screen<T>(
    config: &RunConfig,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    match result {
        Err(err) if is_corruption(&err) => Err(fatal(config, err).await),
        other => other,
    }
}

impl Node {
    // ── Save ────────────────────────────────────────────────────

    /// Write this subtree starting at record `index`. Returns the index
    /// after the subtree's last record.
    pub(crate) fn save(
        self: Arc<Self>,
        index: u64,
        target: Arc<SaveTarget>,
    ) -> BoxFuture<'static, Result<u64, EngineError>> {
        Box::pin(async move {
            let tree = *lock(&self.tree);
            let clock = self.clock();
            let (flag, child_records) = match tree.children {
                Some(_) => (
                    RecordFlag::Refined,
                    child_record_indices(index, &tree.child_descendant_count),
                ),
                None => (RecordFlag::Leaf, [index + 1; NCHILD]),
            };
            let record = Record {
                header: RecordHeader {
                    flag,
                    child_records,
                    step_num: clock.step_num,
                    current_time: clock.current_time,
                    rotational_time: clock.rotational_time,
                },
                payload: self.grid().encode(),
            };
            let t = Arc::clone(&target);
            blocking(move || append_record(&t.path, index, t.record_size, &record)).await?;

            let mut next = index + 1;
            if let Some(kids) = tree.children {
                for (child, expected) in kids.into_iter().zip(child_records) {
                    if next != expected {
                        return Err(ProtocolError::InconsistentTopology {
                            reason: format!(
                                "{}: child record {next} but header says {expected}",
                                self.handle
                            ),
                        }
                        .into());
                    }
                    next = join_one(self.client(child)?.save(next, Arc::clone(&target))?).await?;
                }
            }
            Ok(next)
        })
    }

    // ── Load ────────────────────────────────────────────────────

    /// Rebuild this subtree from record `index`.
    ///
    /// The node itself must already be registered; its children are
    /// created here, on the locality their record index maps to.
    pub(crate) fn load(
        self: Arc<Self>,
        index: u64,
        ctx: Arc<LoadContext>,
    ) -> BoxFuture<'static, Result<LoadOutcome, EngineError>> {
        Box::pin(async move {
            let reader = Arc::clone(&ctx);
            let read = blocking(move || lock(&reader.reader).read_record(index)).await;
            let record = screen(&self.config, read).await?;
            let header = record.header;
            let decoded = self
                .factory
                .decode(&self.location(), &record.payload)
                .map_err(EngineError::from);
            let grid = screen(&self.config, decoded).await?;
            *self.grid() = grid;
            *lock(&self.clock) = Clock {
                current_time: header.current_time,
                rotational_time: header.rotational_time,
                step_num: header.step_num,
            };

            if header.flag == RecordFlag::Leaf {
                *lock(&self.tree) = TreeState::default();
                self.grid().set_leaf(true);
                let output = if ctx.do_output {
                    vec![self.grid().output()]
                } else {
                    Vec::new()
                };
                return Ok(LoadOutcome {
                    next: index + 1,
                    output,
                });
            }

            let checked = header
                .check_child_records(index, ctx.total)
                .map_err(EngineError::from);
            screen(&self.config, checked).await?;

            let kids = self.spawn_loaded_children(&header, ctx.total)?;
            let mut calls = Vec::with_capacity(NCHILD);
            for (kid, start) in kids.iter().zip(header.child_records) {
                calls.push(self.client(*kid)?.load(start, Arc::clone(&ctx))?);
            }
            let outcomes = join_all(calls).await?;

            let mut counts = [0u64; NCHILD];
            let mut expected = index + 1;
            let mut output = OutputList::new();
            for (ci, outcome) in outcomes.into_iter().enumerate() {
                let start = header.child_records[ci];
                if start != expected {
                    let err = CheckpointError::CorruptOffsets {
                        record: index,
                        detail: format!("child {ci} starts at {start}, expected {expected}"),
                    };
                    return Err(fatal(&self.config, err.into()).await);
                }
                counts[ci] = outcome.next - start;
                expected = outcome.next;
                output.extend(outcome.output);
            }

            *lock(&self.tree) = TreeState {
                children: Some(kids),
                child_descendant_count: counts,
            };
            self.grid().set_leaf(false);
            Ok(LoadOutcome {
                next: expected,
                output,
            })
        })
    }

    fn spawn_loaded_children(
        &self,
        header: &RecordHeader,
        total: u64,
    ) -> Result<[NodeHandle; NCHILD], EngineError> {
        let cluster = self.cluster()?;
        let localities = cluster.num_localities();
        let mut handles = Vec::with_capacity(NCHILD);
        for (octant, &start) in Octant::ALL.iter().zip(&header.child_records) {
            let location = self.location().get_child(*octant)?;
            let target = LocalityId::for_index(start, total, localities);
            let seed = self.seed(
                self.factory.create(&location),
                TreeState::default(),
                Clock::default(),
            );
            let (handle, _) = cluster.spawn(target, location, |h| Node::from_seed(h, seed))?;
            handles.push(handle);
        }
        handles.try_into().map_err(|_| {
            ProtocolError::InconsistentTopology {
                reason: format!("{} loaded fewer than 8 children", self.handle),
            }
            .into()
        })
    }

    // ── Output ──────────────────────────────────────────────────

    /// Output chunks of this subtree's leaves, in octant order.
    pub(crate) fn output(self: Arc<Self>) -> BoxFuture<'static, Result<OutputList, EngineError>> {
        Box::pin(async move {
            let Some(kids) = self.children() else {
                return Ok(vec![self.grid().output()]);
            };
            let mut calls = Vec::with_capacity(NCHILD);
            for child in kids {
                calls.push(self.client(child)?.output()?);
            }
            let lists = join_all(calls).await?;
            trace!(node = %self.handle, "output gathered");
            Ok(lists.into_iter().flatten().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_is_told_apart_from_io() {
        let offsets = CheckpointError::CorruptOffsets {
            record: 2,
            detail: String::new(),
        };
        assert!(is_corruption(&offsets.into()));
        let decode = SubgridError::Decode {
            reason: String::new(),
        };
        assert!(is_corruption(&decode.into()));
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(!is_corruption(&CheckpointError::from(missing).into()));
        assert!(!is_corruption(&ProtocolError::RuntimeShutDown.into()));
    }
}
