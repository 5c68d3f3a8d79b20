//! App state database.
//!
//! Caches display data (profile, wallet balance) so cold starts can render
//! instantly while fresh data is fetched in the background.

use anyhow::Context;
use prepd_api_core::types::{amount::Amount, user::UserProfile};
use serde::{Deserialize, Serialize};

use crate::{
    db::{SchemaVersion, Update, WritebackDb},
    ffs::Ffs,
};

const APP_JSON: &str = "app.json";

/// In-memory app state.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(Debug))]
pub(crate) struct AppData {
    /// AppData schema version.
    pub schema: SchemaVersion,
    /// The signed-in user's profile.
    pub profile: Option<UserProfile>,
    /// The last wallet balance we saw, in minor units.
    pub wallet_balance: Option<Amount>,
}

impl AppData {
    pub(crate) fn load<F: Ffs + Send + 'static>(
        ffs: F,
    ) -> WritebackDb<AppData> {
        WritebackDb::<AppData>::load(ffs, APP_JSON, "app_data_persist")
    }

    pub(crate) const CURRENT_SCHEMA: SchemaVersion = SchemaVersion(1);
}

impl Update for AppData {
    /// Merge updated state from `update` into `self`.
    fn update(&mut self, update: Self) -> anyhow::Result<()> {
        self.schema
            .ensure_matches(update.schema)
            .context("AppData schema version mismatch")?;
        self.profile.update(update.profile)?;
        self.wallet_balance.update(update.wallet_balance)?;
        Ok(())
    }
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            schema: AppData::CURRENT_SCHEMA,
            profile: None,
            wallet_balance: None,
        }
    }
}

impl Update for UserProfile {}
impl Update for Amount {}

#[cfg(test)]
mod test {
    use std::ops::Deref;

    use prepd_api_core::types::user::UserId;

    use super::*;
    use crate::ffs::test::MockFfs;

    fn load_db(ffs: MockFfs) -> WritebackDb<AppData> {
        WritebackDb::<AppData>::load(ffs, APP_JSON, "test")
    }

    fn dummy_profile() -> UserProfile {
        UserProfile {
            id: UserId(1),
            display_name: "Asha".to_owned(),
            email: "asha@example.com".to_owned(),
            avatar_url: None,
            following: vec![UserId(2)],
        }
    }

    #[tokio::test]
    async fn test_load_shutdown_load() {
        prepd_logger::init_for_testing();

        let ffs = MockFfs::new();
        let balance = Amount::from_whole(150);
        {
            let mut db = load_db(ffs.clone());
            assert_eq!(db.db().lock().unwrap().deref(), &AppData::default());

            // update: profile
            db.update(AppData {
                profile: Some(dummy_profile()),
                ..Default::default()
            })
            .unwrap();

            // update: wallet_balance
            db.update(AppData {
                wallet_balance: Some(balance),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(
                db.db().lock().unwrap().deref(),
                &AppData {
                    profile: Some(dummy_profile()),
                    wallet_balance: Some(balance),
                    ..Default::default()
                }
            );

            db.shutdown().await.unwrap();
        }

        {
            let mut db = load_db(ffs.clone());
            assert_eq!(
                db.db().lock().unwrap().deref(),
                &AppData {
                    profile: Some(dummy_profile()),
                    wallet_balance: Some(balance),
                    ..Default::default()
                }
            );
            db.shutdown().await.unwrap();
        }
    }
}
