//! The top-level `App` state: session lifecycle (signup / login / load /
//! logout) and ownership of the clients, local dbs, and chat store.

use std::{fmt, path::PathBuf, str::FromStr, sync::Arc, time::SystemTime};

use anyhow::Context;
use prepd_api::{auth::BearerAuthenticator, ws};
use prepd_api_core::{
    def::{AppAuthApi, StudentWalletApi},
    error::BackendApiError,
    models::{AuthResponse, LoginRequest, SignupRequest},
    types::{
        amount::Amount,
        user::{UserId, UserProfile},
        wallet::WalletData,
    },
};
use prepd_tokio::{notify_once::NotifyOnce, task::PdTask};
use secrecy::{ExposeSecret, Secret};
use tracing::{info, warn};

use crate::{
    app_data::AppData,
    chat::{MessageStore, MessageSyncTask},
    client::{GatewayClient, StudentClient},
    db::WritebackDb,
    ffs::DiskFs,
    secret_store::SecretStore,
    settings::{Settings, SettingsDb},
};

/// Which backend stack the app points at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeployEnv {
    Dev,
    Staging,
    Prod,
}

impl DeployEnv {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnv {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            _ => Err(anyhow::anyhow!("Unknown deploy env: '{s}'")),
        }
    }
}

/// Static configuration handed to us by the host app shell at startup.
pub struct AppConfig {
    pub deploy_env: DeployEnv,
    /// e.g. `https://gateway.prepd.app`
    pub gateway_url: String,
    /// The platform-assigned app data directory.
    pub app_data_dir: PathBuf,
    pub user_agent: &'static str,
    /// Tests use a file-backed secret store instead of the OS keychain.
    pub use_mock_secret_store: bool,
}

impl AppConfig {
    /// Per-env db directory, so switching envs never mixes state.
    fn db_dir(&self) -> PathBuf {
        self.app_data_dir.join(self.deploy_env.as_str())
    }

    /// The gateway url with a WebSocket scheme.
    fn ws_url(&self) -> String {
        gateway_to_ws_url(&self.gateway_url)
    }
}

/// A signed-in app session.
pub struct App {
    config: AppConfig,
    student_client: Arc<StudentClient>,
    secret_store: SecretStore,
    settings_db: SettingsDb,
    app_data_db: WritebackDb<AppData>,
    message_store: Arc<MessageStore>,
}

impl App {
    /// Restore the prior session from the secret store. Returns `None` if
    /// this is the first run (or the user logged out).
    pub async fn load(config: AppConfig) -> anyhow::Result<Option<Self>> {
        let secret_store = Self::secret_store(&config)?;

        let maybe_token = secret_store
            .read_auth_token()
            .context("Could not read auth token from secret store")?;
        let maybe_profile = secret_store
            .read_user_data()
            .context("Could not read user data from secret store")?;

        let (token, profile) = match (maybe_token, maybe_profile) {
            (Some(token), Some(profile)) => (token, profile),
            // Partially-written state counts as signed out.
            _ => return Ok(None),
        };

        let authenticator = Arc::new(BearerAuthenticator::new(
            token.expose_secret().clone(),
            None,
        ));
        let app =
            Self::from_session(config, secret_store, profile, authenticator)?;
        Ok(Some(app))
    }

    /// Create a new account, then start a session.
    pub async fn signup(
        config: AppConfig,
        req: SignupRequest,
    ) -> anyhow::Result<Self> {
        let gateway_client = Self::gateway_client(&config);
        let resp = gateway_client
            .signup(req)
            .await
            .context("Failed to sign up")?;
        Self::start_session(config, resp).await
    }

    /// Authenticate with email + password, then start a session.
    pub async fn login(
        config: AppConfig,
        req: LoginRequest,
    ) -> anyhow::Result<Self> {
        let gateway_client = Self::gateway_client(&config);
        let resp =
            gateway_client.login(req).await.context("Failed to log in")?;
        Self::start_session(config, resp).await
    }

    /// Tear the session down: delete stored secrets and reset cached state.
    /// Call this on explicit logout and whenever a client call fails with
    /// [`BackendApiError::is_auth_expired`].
    pub async fn logout(mut self) -> anyhow::Result<()> {
        info!("logging out");
        self.secret_store
            .delete()
            .context("Failed to delete secrets")?;

        // Cached display data belongs to the account; settings stay.
        self.app_data_db.reset();

        self.app_data_db
            .shutdown()
            .await
            .context("app data db failed to shut down")?;
        self.settings_db
            .shutdown()
            .await
            .context("settings db failed to shut down")?;
        Ok(())
    }

    async fn start_session(
        config: AppConfig,
        resp: AuthResponse,
    ) -> anyhow::Result<Self> {
        let secret_store = Self::secret_store(&config)?;

        // Persist the session credentials under the fixed keys.
        secret_store
            .write_auth_token(&Secret::new(resp.refresh_token.clone()))
            .context("Failed to persist auth token")?;
        secret_store
            .write_user_data(&resp.user)
            .context("Failed to persist user data")?;

        let authenticator = Arc::new(BearerAuthenticator::from_auth_response(
            SystemTime::now(),
            &resp,
        ));
        Self::from_session(config, secret_store, resp.user, authenticator)
    }

    fn from_session(
        config: AppConfig,
        secret_store: SecretStore,
        profile: UserProfile,
        authenticator: Arc<BearerAuthenticator>,
    ) -> anyhow::Result<Self> {
        let gateway_client = Self::gateway_client(&config);
        let student_client =
            Arc::new(StudentClient::new(gateway_client, authenticator));

        let db_ffs = DiskFs::create_dir_all(config.db_dir())
            .context("Failed to create db dir")?;
        let settings_db = SettingsDb::load(db_ffs.clone());
        let app_data_db = AppData::load(db_ffs);

        // Refresh the cached profile; the server copy wins.
        app_data_db.update(AppData {
            profile: Some(profile),
            ..Default::default()
        })?;

        Ok(Self {
            config,
            student_client,
            secret_store,
            settings_db,
            app_data_db,
            message_store: Arc::new(MessageStore::new()),
        })
    }

    fn gateway_client(config: &AppConfig) -> GatewayClient {
        GatewayClient::new(config.gateway_url.clone(), config.user_agent)
    }

    fn secret_store(config: &AppConfig) -> anyhow::Result<SecretStore> {
        let db_dir = config.db_dir();
        std::fs::create_dir_all(&db_dir)
            .context("Failed to create db dir")?;
        Ok(SecretStore::new(
            config.use_mock_secret_store,
            config.deploy_env,
            &db_dir,
        ))
    }

    // --- Accessors --- //

    pub fn client(&self) -> &Arc<StudentClient> {
        &self.student_client
    }

    pub fn message_store(&self) -> &Arc<MessageStore> {
        &self.message_store
    }

    pub fn profile(&self) -> UserProfile {
        self.app_data_db
            .read()
            .profile
            .expect("Session always has a profile")
    }

    pub fn settings(&self) -> Settings {
        self.settings_db.read()
    }

    pub fn update_settings(&self, update: Settings) -> anyhow::Result<()> {
        self.settings_db.update(update)
    }

    // --- Wallet --- //

    /// The last wallet balance we saw, for instant display on cold start.
    pub fn cached_wallet_balance(&self) -> Option<Amount> {
        self.app_data_db.read().wallet_balance
    }

    /// Fetch the wallet and cache the balance for the next cold start.
    pub async fn refresh_wallet(
        &self,
    ) -> Result<WalletData, BackendApiError> {
        let wallet = self.student_client.get_wallet().await?;
        if let Err(err) = self.app_data_db.update(AppData {
            wallet_balance: Some(wallet.balance),
            ..Default::default()
        }) {
            warn!("failed to cache wallet balance: {err:#}");
        }
        Ok(wallet)
    }

    // --- Chat --- //

    /// Start the chat sync task for the conversation with `peer`.
    ///
    /// Tries to establish a WebSocket subscription first; if that fails the
    /// task runs on polling alone from the start. Returns the socket handle
    /// (when connected) and the running sync task.
    pub async fn start_chat_sync(
        &self,
        peer: UserId,
        shutdown: NotifyOnce,
    ) -> (Option<ws::WsHandle>, PdTask<()>) {
        let (ws_handle, ws_events) = match self.connect_ws().await {
            Ok((handle, events)) => (Some(handle), Some(events)),
            Err(err) => {
                warn!("chat socket connect failed; polling only: {err:#}");
                (None, None)
            }
        };

        let sync_task = MessageSyncTask::new(
            self.student_client.clone(),
            self.message_store.clone(),
            peer,
            ws_events,
            shutdown,
        );
        let task = PdTask::spawn("chat_sync", sync_task.run());
        (ws_handle, task)
    }

    async fn connect_ws(
        &self,
    ) -> anyhow::Result<(ws::WsHandle, ws::WsEvents)> {
        let token = self
            .student_client
            .authenticator()
            .get_token(self.student_client.gateway(), SystemTime::now())
            .await
            .context("Could not get an access token for the socket")?;
        ws::connect(&self.config.ws_url(), &token).await
    }
}

/// `https://gateway.prepd.app` -> `wss://gateway.prepd.app` (and `http` ->
/// `ws` for dev).
fn gateway_to_ws_url(gateway_url: &str) -> String {
    if let Some(rest) = gateway_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = gateway_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        gateway_url.to_owned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_config(tmpdir: &tempfile::TempDir) -> AppConfig {
        AppConfig {
            deploy_env: DeployEnv::Dev,
            gateway_url: "http://127.0.0.1:4040".to_owned(),
            app_data_dir: tmpdir.path().to_owned(),
            user_agent: "prepd-app-test",
            use_mock_secret_store: true,
        }
    }

    fn dummy_profile() -> UserProfile {
        UserProfile {
            id: UserId(5),
            display_name: "Ravi".to_owned(),
            email: "ravi@example.com".to_owned(),
            avatar_url: None,
            following: Vec::new(),
        }
    }

    #[test]
    fn deploy_env_roundtrip() {
        for env in [DeployEnv::Dev, DeployEnv::Staging, DeployEnv::Prod] {
            assert_eq!(DeployEnv::from_str(env.as_str()).unwrap(), env);
        }
        DeployEnv::from_str("production").unwrap_err();
    }

    #[test]
    fn ws_url_schemes() {
        assert_eq!(
            gateway_to_ws_url("https://gateway.prepd.app"),
            "wss://gateway.prepd.app",
        );
        assert_eq!(
            gateway_to_ws_url("http://127.0.0.1:4040"),
            "ws://127.0.0.1:4040",
        );
    }

    #[tokio::test]
    async fn load_returns_none_on_first_run() {
        let tmpdir = tempfile::tempdir().unwrap();
        let app = App::load(test_config(&tmpdir)).await.unwrap();
        assert!(app.is_none());
    }

    #[tokio::test]
    async fn load_restores_persisted_session() {
        let tmpdir = tempfile::tempdir().unwrap();

        // Simulate the secrets a login would have written.
        {
            let config = test_config(&tmpdir);
            let secret_store = App::secret_store(&config).unwrap();
            secret_store
                .write_auth_token(&Secret::new("refresh-1".to_owned()))
                .unwrap();
            secret_store.write_user_data(&dummy_profile()).unwrap();
        }

        let app = App::load(test_config(&tmpdir)).await.unwrap().unwrap();
        assert_eq!(app.profile(), dummy_profile());

        // Logout deletes the secrets; the next load is a first run again.
        app.logout().await.unwrap();
        let app = App::load(test_config(&tmpdir)).await.unwrap();
        assert!(app.is_none());
    }
}
