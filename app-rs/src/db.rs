use std::{io, sync::Arc, time::Duration};

use anyhow::Context;
use prepd_tokio::{notify, notify_once::NotifyOnce, task::PdTask};
use serde::{de, Deserialize, Serialize};
use tracing::{error, info};

use crate::ffs::Ffs;

/// A generic write-back database for the app.
///
/// Persistence is done asynchronously out-of-band: [`WritebackDb::update`]
/// only modifies the in-memory state, and the [`DbPersister`] finishes
/// writing the data to durable storage later (by at most 500ms).
pub(crate) struct WritebackDb<D> {
    /// The current in-memory db data.
    db: Arc<std::sync::Mutex<D>>,
    /// Notify the [`DbPersister`] to persist the db data.
    persist_tx: notify::Sender,
    /// Handle to spawned [`DbPersister`].
    persist_task: Option<PdTask<()>>,
    /// Trigger shutdown of [`DbPersister`].
    shutdown: NotifyOnce,
}

impl<D> WritebackDb<D>
where
    D: Sized
        + Serialize
        + for<'de> de::Deserialize<'de>
        + Default
        + Send
        + Clone
        + Update
        + 'static,
{
    pub(crate) fn load<F: Ffs + Send + 'static>(
        ffs: F,
        filename: &str,
        task_name: &str,
    ) -> Self {
        let db =
            Arc::new(std::sync::Mutex::new(DbPersister::load(&ffs, filename)));
        let (persist_tx, persist_rx) = notify::channel();
        let shutdown = NotifyOnce::new();

        // Spawn a task that we can notify to write updates to durable
        // storage.
        let persister = DbPersister::new(
            ffs,
            filename.to_owned(),
            db.clone(),
            persist_rx,
            shutdown.clone(),
        );
        let persist_task =
            Some(PdTask::spawn(task_name.to_owned(), persister.run()));

        Self {
            db,
            persist_tx,
            persist_task,
            shutdown,
        }
    }

    /// Shutdown the [`WritebackDb`]. Flushes any pending writes to disk.
    pub(crate) async fn shutdown(&mut self) -> anyhow::Result<()> {
        // Trigger task to shutdown.
        self.shutdown.send();

        // Wait for task to finish (with timeout).
        let persist_task =
            self.persist_task.take().context("Called shutdown twice")?;
        tokio::time::timeout(Duration::from_secs(1), persist_task)
            .await
            .context("db persister failed to shutdown in time")?
            .context("db persister panicked")
    }

    /// Return a clone of the current in-memory `D` value.
    pub(crate) fn read(&self) -> D {
        self.db.lock().unwrap().clone()
    }

    /// Reset the in-memory `D` to its default value and notify the
    /// [`DbPersister`].
    pub(crate) fn reset(&self) {
        *self.db.lock().unwrap() = D::default();
        self.persist_tx.send();
    }

    /// Update the in-memory `D` by merging in any `Some` fields in `update`,
    /// then notify the [`DbPersister`] that we need to save, without waiting
    /// for the actual persist.
    pub(crate) fn update(&self, update: D) -> anyhow::Result<()> {
        self.db.lock().unwrap().update(update)?;
        self.persist_tx.send();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn db(&self) -> &Arc<std::sync::Mutex<D>> {
        &self.db
    }
}

/// Persists data asynchronously when notified by the [`WritebackDb`].
struct DbPersister<F, D> {
    /// Data flat file store.
    ffs: F,
    /// Filename to persist to.
    filename: String,
    /// The current in-memory db data.
    db: Arc<std::sync::Mutex<D>>,
    /// Receives notifications when the db has updated.
    persist_rx: notify::Receiver,
    /// Receives shutdown signal.
    shutdown: NotifyOnce,
}

impl<F, D> DbPersister<F, D>
where
    F: Ffs,
    D: Sized + Serialize + for<'de> de::Deserialize<'de> + Default,
{
    fn new(
        ffs: F,
        filename: String,
        db: Arc<std::sync::Mutex<D>>,
        persist_rx: notify::Receiver,
        shutdown: NotifyOnce,
    ) -> Self {
        Self {
            ffs,
            filename,
            db,
            persist_rx,
            shutdown,
        }
    }

    async fn run(mut self) {
        loop {
            // Wait for persist notification (or shutdown).
            tokio::select! {
                () = self.persist_rx.recv() => (),
                () = self.shutdown.recv() => break,
            }

            // Read and serialize the current db, then write to ffs.
            self.do_persist().await;

            // Rate-limit persists to at-most once per 500ms
            if let Ok(()) = tokio::time::timeout(
                Duration::from_millis(500),
                self.shutdown.recv(),
            )
            .await
            {
                // Ok => "shutdown.recv()" before timeout
                break;
            }
        }

        // Do a final flush on shutdown if there's any work to be done.
        if self.persist_rx.try_recv() {
            self.do_persist().await;
        }

        info!("persister {}: complete", self.filename);
    }

    async fn do_persist(&mut self) {
        if let Err(err) = self.do_persist_inner().await {
            // Just log the error
            error!("Error persisting {}: {err:#}", self.filename);
        }
    }

    async fn do_persist_inner(&mut self) -> anyhow::Result<()> {
        // Only hold the lock long enough to serialize
        let db_json_bytes = {
            let db = self.db.lock().unwrap();
            serde_json::to_vec_pretty(&*db)
                .context("Failed to serialize db")?
        };
        self.ffs
            .write(self.filename.as_str(), &db_json_bytes)
            .with_context(|| {
                format!("Failed to write {} file", self.filename)
            })?;

        Ok(())
    }

    /// Load data from the json file. Resets to default db data if something
    /// goes wrong.
    fn load(ffs: &F, filename: &str) -> D {
        match Self::load_from_file(ffs, filename) {
            Ok(Some(db)) => db,
            Ok(None) => D::default(),
            Err(err) => {
                error!("db {filename}: failed to load: {err:#}");
                D::default()
            }
        }
    }

    fn load_from_file(ffs: &F, filename: &str) -> anyhow::Result<Option<D>> {
        let buf = match ffs.read(filename) {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::NotFound =>
                return Ok(None),
            Err(err) =>
                return Err(err)
                    .with_context(|| format!("Failed to read {filename}")),
        };
        let data = serde_json::from_slice(&buf)
            .with_context(|| format!("Failed to deserialize {filename}"))?;
        Ok(Some(data))
    }
}

/// Trait for merging updates into a database.
pub(crate) trait Update: Sized {
    /// Merge updated db data from `update` into `self`.
    fn update(&mut self, update: Self) -> anyhow::Result<()> {
        // Default impl for "atom" types, where an update just replaces
        // `self` and doesn't traverse.
        *self = update;
        Ok(())
    }
}
impl Update for String {}
impl Update for bool {}

impl<T: Update> Update for Option<T> {
    fn update(&mut self, update: Self) -> anyhow::Result<()> {
        match update {
            None => {}
            Some(u) => match self {
                None => *self = Some(u),
                Some(s) => s.update(u)?,
            },
        }
        Ok(())
    }
}

/// General db schema version. Used to determine whether to run migrations.
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(Debug))]
#[serde(transparent)]
pub(crate) struct SchemaVersion(pub u32);

impl SchemaVersion {
    pub(crate) fn ensure_matches(self, other: Self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self == other,
            "Schema version mismatch (persisted={}, update={}). \
             Somehow migrations didn't run?",
            self.0,
            other.0,
        );
        Ok(())
    }
}

#[cfg(test)]
mod arb {
    use proptest::{
        arbitrary::Arbitrary,
        strategy::{BoxedStrategy, Just, Strategy},
    };

    use super::*;

    impl Arbitrary for SchemaVersion {
        type Strategy = BoxedStrategy<Self>;
        type Parameters = ();
        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            proptest::prop_oneof![
                10 => Just(Self(1)),
                1 => (0_u32..10).prop_map(Self),
            ]
            .boxed()
        }
    }
}
