//! The `SecretStore` persists the session credentials in each platform's
//! standard secrets keychain, under two fixed keys:
//!
//! * `auth_token`: the long-lived refresh token.
//! * `user_data`: the signed-in user's profile, serialized as JSON.
//!
//! Uses [`hwchen/keyring-rs`](https://github.com/hwchen/keyring-rs) on
//! iOS/macOS (Keychain.app) and Windows (wincreds).
//!
//! Android and Linux store secrets in a file in the app data directory
//! (accessing the JVM-only Android Keystore from native code is a huge pain,
//! and headless Linux boxes have no secret service). App data is sandboxed
//! and inaccessible to other apps on Android, so this is acceptable.

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use cfg_if::cfg_if;
use keyring::credential::CredentialApi;
use prepd_api_core::types::user::UserProfile;
use secrecy::{ExposeSecret, Secret};

use crate::app::DeployEnv;

const AUTH_TOKEN_KEY: &str = "auth_token";
const USER_DATA_KEY: &str = "user_data";

/// Persists the session credentials in each platform's standard secrets
/// keychain. See module-level docs for platform-specific details.
pub struct SecretStore {
    auth_token_cred: Box<dyn CredentialApi + Send + Sync>,
    user_data_cred: Box<dyn CredentialApi + Send + Sync>,
}

impl SecretStore {
    #[cfg_attr(
        any(target_os = "android", target_os = "linux"),
        allow(dead_code)
    )]
    fn service_name(deploy_env: DeployEnv) -> String {
        format!("app.prepd.student.{deploy_env}")
    }

    /// Create a new `SecretStore`.
    ///
    /// iOS/macOS/Windows use the user's OS-provided keychain. Android and
    /// Linux store secrets in the app data directory. See module comments
    /// for more details.
    pub fn new(
        use_mock_secret_store: bool,
        deploy_env: DeployEnv,
        app_data_dir: &Path,
    ) -> Self {
        if use_mock_secret_store {
            // Some tests rely on a persistent (tempdir) mock secret store
            return Self::file(app_data_dir);
        }

        cfg_if! {
            if #[cfg(any(target_os = "android", target_os = "linux"))] {
                let _ = deploy_env;
                Self::file(app_data_dir)
            } else {
                Self::keychain(deploy_env)
            }
        }
    }

    /// A secret store that uses the system keychain.
    #[cfg(not(any(target_os = "android", target_os = "linux")))]
    fn keychain(deploy_env: DeployEnv) -> Self {
        Self::keychain_inner(&Self::service_name(deploy_env))
    }

    #[cfg(not(any(target_os = "android", target_os = "linux")))]
    fn keychain_inner(service: &str) -> Self {
        let target = None;

        cfg_if! {
            if #[cfg(target_os = "ios")] {
                use keyring::ios::IosCredential;
                Self {
                    auth_token_cred: Box::new(
                        IosCredential::new_with_target(
                            target, service, AUTH_TOKEN_KEY,
                        )
                        .unwrap(),
                    ),
                    user_data_cred: Box::new(
                        IosCredential::new_with_target(
                            target, service, USER_DATA_KEY,
                        )
                        .unwrap(),
                    ),
                }
            } else if #[cfg(target_os = "macos")] {
                use keyring::macos::MacCredential;
                Self {
                    auth_token_cred: Box::new(
                        MacCredential::new_with_target(
                            target, service, AUTH_TOKEN_KEY,
                        )
                        .unwrap(),
                    ),
                    user_data_cred: Box::new(
                        MacCredential::new_with_target(
                            target, service, USER_DATA_KEY,
                        )
                        .unwrap(),
                    ),
                }
            } else if #[cfg(target_os = "windows")] {
                use keyring::windows::WinCredential;
                Self {
                    auth_token_cred: Box::new(
                        WinCredential::new_with_target(
                            target, service, AUTH_TOKEN_KEY,
                        )
                        .unwrap(),
                    ),
                    user_data_cred: Box::new(
                        WinCredential::new_with_target(
                            target, service, USER_DATA_KEY,
                        )
                        .unwrap(),
                    ),
                }
            } else {
                compile_error!("Configure a keychain backend for this OS")
            }
        }
    }

    /// A secret store that dumps secrets into the app data directory.
    fn file(app_data_dir: &Path) -> Self {
        Self {
            auth_token_cred: Box::new(FileCredential::new(
                app_data_dir.join(AUTH_TOKEN_KEY),
            )),
            user_data_cred: Box::new(FileCredential::new(
                app_data_dir.join(USER_DATA_KEY),
            )),
        }
    }

    /// Read the refresh token from the secret store.
    pub fn read_auth_token(&self) -> anyhow::Result<Option<Secret<String>>> {
        match self.auth_token_cred.get_password() {
            Ok(s) => Ok(Some(Secret::new(s))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(anyhow::Error::new(err)
                .context("Failed to read auth token from keyring")),
        }
    }

    /// Write the refresh token to the secret store.
    pub fn write_auth_token(
        &self,
        token: &Secret<String>,
    ) -> anyhow::Result<()> {
        self.auth_token_cred
            .set_password(token.expose_secret())
            .context("Failed to write auth token into keyring")
    }

    /// Read the cached user profile from the secret store.
    pub fn read_user_data(&self) -> anyhow::Result<Option<UserProfile>> {
        match self.user_data_cred.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .context("Found user data, but it failed to deserialize"),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(anyhow::Error::new(err)
                .context("Failed to read user data from keyring")),
        }
    }

    /// Write the user profile to the secret store.
    pub fn write_user_data(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let json = serde_json::to_string(profile)
            .expect("Failed to serialize UserProfile");
        self.user_data_cred
            .set_password(&json)
            .context("Failed to write user data into keyring")
    }

    /// Delete all stored secrets. Used on logout. Missing entries are fine.
    pub fn delete(&self) -> anyhow::Result<()> {
        for cred in [&self.auth_token_cred, &self.user_data_cred] {
            match cred.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => (),
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context("Failed to delete secret from keyring"))
                }
            }
        }
        Ok(())
    }
}

/// A small shim that dumps a credential into a file.
struct FileCredential {
    path: PathBuf,
}

impl FileCredential {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn io_err_to_keyring_err(err: io::Error) -> keyring::Error {
    match err.kind() {
        io::ErrorKind::NotFound => keyring::Error::NoEntry,
        io::ErrorKind::PermissionDenied =>
            keyring::Error::NoStorageAccess(err.into()),
        _ => keyring::Error::PlatformFailure(err.into()),
    }
}

impl CredentialApi for FileCredential {
    fn set_password(&self, password: &str) -> keyring::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err_to_keyring_err)?;
        }

        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);

        // Set the file permissions to rw------- (owner r/w only)
        #[cfg(unix)]
        opts.mode(0o600);

        opts.open(self.path.as_path())
            .and_then(|mut file| file.write_all(password.as_bytes()))
            .map_err(io_err_to_keyring_err)
    }

    fn get_password(&self) -> keyring::Result<String> {
        let bytes = std::fs::read(&self.path).map_err(io_err_to_keyring_err)?;
        String::from_utf8(bytes)
            .map_err(|err| keyring::Error::BadEncoding(err.into_bytes()))
    }

    fn delete_password(&self) -> keyring::Result<()> {
        std::fs::remove_file(&self.path).map_err(io_err_to_keyring_err)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod test {
    use prepd_api_core::types::user::UserId;

    use super::*;

    fn dummy_profile() -> UserProfile {
        UserProfile {
            id: UserId(42),
            display_name: "Dev".to_owned(),
            email: "dev@prepd.app".to_owned(),
            avatar_url: None,
            following: Vec::new(),
        }
    }

    fn test_secret_store(secret_store: &SecretStore) {
        assert!(secret_store.read_auth_token().unwrap().is_none());
        assert!(secret_store.read_user_data().unwrap().is_none());

        let token = Secret::new("refresh-abc123".to_owned());
        secret_store.write_auth_token(&token).unwrap();
        secret_store.write_user_data(&dummy_profile()).unwrap();

        let token2 = secret_store.read_auth_token().unwrap().unwrap();
        assert_eq!(token.expose_secret(), token2.expose_secret());
        let profile = secret_store.read_user_data().unwrap().unwrap();
        assert_eq!(profile, dummy_profile());

        secret_store.delete().unwrap();
        assert!(secret_store.read_auth_token().unwrap().is_none());
        assert!(secret_store.read_user_data().unwrap().is_none());

        // Deleting again is not an error.
        secret_store.delete().unwrap();
    }

    #[test]
    fn test_file_store() {
        let tempdir = tempfile::tempdir().unwrap();
        let secret_store = SecretStore::file(tempdir.path());
        test_secret_store(&secret_store);
    }
}
