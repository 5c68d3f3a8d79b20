//! App settings db, serialization, and persistence.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    db::{SchemaVersion, Update, WritebackDb},
    ffs::Ffs,
};

const SETTINGS_JSON: &str = "settings.json";

/// The app settings DB. Responsible for managing access to the settings.
pub(crate) struct SettingsDb(WritebackDb<Settings>);

/// In-memory app settings state.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[cfg_attr(test, derive(Debug))]
pub struct Settings {
    /// Settings schema version.
    pub(crate) schema: SchemaVersion,
    /// Preferred locale, e.g. "en-IN".
    pub locale: Option<String>,
    /// Preferred exam subject, pinned to the top of the exams list.
    pub preferred_subject: Option<String>,
}

impl SettingsDb {
    pub(crate) fn load<F: Ffs + Send + 'static>(ffs: F) -> Self {
        Self(WritebackDb::load(ffs, SETTINGS_JSON, "settings_persist"))
    }

    pub(crate) async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.0.shutdown().await
    }

    pub(crate) fn read(&self) -> Settings {
        self.0.read()
    }

    pub(crate) fn reset(&self) {
        self.0.reset()
    }

    /// Update the in-memory settings by merging in any `Some` fields in
    /// `update`, then notify the persister. Doesn't wait for the actual
    /// persist.
    pub(crate) fn update(&self, update: Settings) -> anyhow::Result<()> {
        self.0.update(update)
    }

    #[cfg(test)]
    pub(crate) fn db(&self) -> &std::sync::Arc<std::sync::Mutex<Settings>> {
        self.0.db()
    }
}

impl Settings {
    pub(crate) const CURRENT_SCHEMA: SchemaVersion = SchemaVersion(1);
}

impl Update for Settings {
    /// Merge updated settings from `update` into `self`.
    fn update(&mut self, update: Self) -> anyhow::Result<()> {
        self.schema
            .ensure_matches(update.schema)
            .context("Settings schema version mismatch")?;
        self.locale.update(update.locale)?;
        self.preferred_subject.update(update.preferred_subject)?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema: Settings::CURRENT_SCHEMA,
            locale: None,
            preferred_subject: None,
        }
    }
}

#[cfg(test)]
mod test {
    use std::ops::Deref;

    use super::*;
    use crate::ffs::test::MockFfs;

    #[tokio::test]
    async fn test_load_shutdown_load() {
        prepd_logger::init_for_testing();

        let ffs = MockFfs::new();
        {
            let mut db = SettingsDb::load(ffs.clone());
            assert_eq!(db.db().lock().unwrap().deref(), &Settings::default());

            // update: locale=en-IN
            db.update(Settings {
                locale: Some("en-IN".to_owned()),
                ..Default::default()
            })
            .unwrap();

            // update: preferred_subject=physics
            db.update(Settings {
                preferred_subject: Some("physics".to_owned()),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(
                db.db().lock().unwrap().deref(),
                &Settings {
                    locale: Some("en-IN".to_owned()),
                    preferred_subject: Some("physics".to_owned()),
                    ..Default::default()
                }
            );

            db.shutdown().await.unwrap();
        }

        {
            // Updates survive a restart.
            let mut db = SettingsDb::load(ffs.clone());
            assert_eq!(
                db.db().lock().unwrap().deref(),
                &Settings {
                    locale: Some("en-IN".to_owned()),
                    preferred_subject: Some("physics".to_owned()),
                    ..Default::default()
                }
            );
            db.shutdown().await.unwrap();
        }
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let ffs = MockFfs::new();
        let mut db = SettingsDb::load(ffs);
        db.update(Settings {
            locale: Some("en-IN".to_owned()),
            ..Default::default()
        })
        .unwrap();

        db.reset();
        assert_eq!(db.read(), Settings::default());
        db.shutdown().await.unwrap();
    }
}
