//! The DAG fetch worker pool.
//!
//! When a remote block references blocks we do not hold, the missing CIDs
//! become jobs for a fixed-size pool of workers (default 5). Each worker
//! fetches the block through the block exchange and applies it; causal
//! parents are applied with the original tip threaded through as the walk
//! root, while named sub-deltas root their own walk. A de-duplicating set
//! guarantees each CID is enqueued at most once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cid::Cid;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use oxbow_crdt::{MissingLink, RemoteApply};
use oxbow_db::Db;
use oxbow_types::{DocId, SchemaRoot};

use crate::transport::BlockExchange;

/// The default number of DAG fetch workers.
pub const DEFAULT_DAG_WORKERS: usize = 5;

/// One missing block to fetch and apply.
#[derive(Clone, Debug)]
pub struct DagJob {
    pub doc_id: DocId,
    pub schema_root: SchemaRoot,
    /// The tip of the walk this job belongs to.
    pub root_cid: Cid,
    pub root_priority: u64,
    /// The missing block to fetch.
    pub cid: Cid,
}

impl DagJob {
    /// Derive the follow-up job for a block referenced by `self`'s block.
    fn child(&self, link: MissingLink) -> DagJob {
        if link.is_parent {
            // Same walk: the tip stays the root.
            DagJob {
                cid: link.cid,
                ..self.clone()
            }
        } else {
            // A sub-delta roots its own walk; its priority is read from the
            // block itself once fetched.
            DagJob {
                root_cid: link.cid,
                root_priority: 0,
                cid: link.cid,
                ..self.clone()
            }
        }
    }
}

/// Bounded worker pool draining missing-block jobs.
pub struct DagSyncer {
    job_tx: mpsc::Sender<DagJob>,
    queued: Arc<Mutex<HashSet<Cid>>>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DagSyncer {
    /// Start `workers` tasks fetching through `exchange` and applying into
    /// `db`. The pool stops when `cancel` fires, draining in-flight jobs.
    pub fn start(
        db: Arc<Db>,
        exchange: Arc<dyn BlockExchange>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (job_tx, job_rx) = mpsc::channel(workers.max(1));
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let queued = Arc::new(Mutex::new(HashSet::new()));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let db = Arc::clone(&db);
                let exchange = Arc::clone(&exchange);
                let job_rx = Arc::clone(&job_rx);
                let job_tx = job_tx.clone();
                let queued = Arc::clone(&queued);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = job_rx.lock().await;
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                job = rx.recv() => match job {
                                    Some(job) => job,
                                    None => break,
                                },
                            }
                        };
                        process_job(&db, exchange.as_ref(), &job_tx, &queued, job).await;
                    }
                    debug!(worker, "dag worker stopped");
                })
            })
            .collect();

        Self {
            job_tx,
            queued,
            cancel,
            workers: Mutex::new(handles),
        }
    }

    /// Enqueue a missing block. Returns `false` if the CID is already
    /// queued or in flight.
    pub async fn enqueue(&self, job: DagJob) -> bool {
        {
            let mut queued = self.queued.lock().expect("lock poisoned");
            if !queued.insert(job.cid) {
                return false;
            }
        }
        if self.job_tx.send(job).await.is_err() {
            return false;
        }
        true
    }

    /// Enqueue the follow-ups for every missing link of an applied block.
    pub async fn enqueue_missing(&self, base: &DagJob, missing: Vec<MissingLink>) {
        for link in missing {
            let _ = self.enqueue(base.child(link)).await;
        }
    }

    /// Cancel the pool and wait for the workers to drain. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().expect("lock poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn process_job(
    db: &Db,
    exchange: &dyn BlockExchange,
    job_tx: &mpsc::Sender<DagJob>,
    queued: &Arc<Mutex<HashSet<Cid>>>,
    job: DagJob,
) {
    let result = exchange.get_block(&job.cid).await;
    let outcome = match result {
        Ok(block) => db.apply_fetched_block(
            &job.doc_id,
            &job.schema_root,
            &job.root_cid,
            job.root_priority,
            &block,
        ),
        Err(e) => {
            // Retryable: the block stays pending and a future delivery or
            // catch-up walk re-enqueues it.
            warn!(cid = %job.cid, error = %e, "block fetch failed");
            queued.lock().expect("lock poisoned").remove(&job.cid);
            return;
        }
    };
    queued.lock().expect("lock poisoned").remove(&job.cid);

    match outcome {
        Ok(RemoteApply::Applied { priority, missing, .. }) => {
            // A job that rooted its own walk learns its true priority from
            // the applied block; children must inherit the resolved value.
            let mut base = job;
            if base.root_priority == 0 {
                base.root_priority = priority;
            }
            for link in missing {
                let child = base.child(link);
                let fresh = {
                    let mut queued = queued.lock().expect("lock poisoned");
                    queued.insert(child.cid)
                };
                if fresh {
                    // Detached so a full queue can never wedge the whole
                    // pool with every worker stuck on a send.
                    let tx = job_tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(child).await;
                    });
                }
            }
        }
        Ok(RemoteApply::AlreadyApplied { .. }) => {}
        Err(e) => {
            // Malformed blocks are permanent: logged and dropped, never
            // crashing the apply loop.
            warn!(cid = %job.cid, error = %e, "dropping block");
        }
    }
}
