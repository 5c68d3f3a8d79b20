use std::time::{Duration, SystemTime};

use prepd_api_core::{
    def::AppAuthApi,
    error::BackendApiError,
    models::{AuthResponse, TokenRefreshRequest, TokenRefreshResponse},
};
use secrecy::{ExposeSecret, Secret};

/// The min remaining lifetime of an access token before we'll proactively
/// refresh.
const EXPIRATION_BUFFER: Duration = Duration::from_secs(30);

/// A short-lived access token along with the time we expect it to expire.
#[derive(Clone)]
pub struct TokenWithExpiration {
    pub token: String,
    pub expiration: SystemTime,
}

/// A `BearerAuthenticator` (1) hands out the session's access token while it
/// is fresh and (2) mints a new one from the refresh token when it is about
/// to expire.
pub struct BearerAuthenticator {
    /// The long-lived refresh token, exchanged for new access tokens.
    refresh_token: Secret<String>,

    /// A `tokio` mutex to ensure at-most-one task refreshes at a time, if
    /// multiple tasks race to auth simultaneously.
    // NOTE: intentionally a tokio async `Mutex`:
    //
    // 1. we want only at-most-one client refreshing at once
    // 2. refreshing involves IO (send/recv an HTTPS request)
    // 3. holding a blocking `Mutex` across IO await points would block every
    //    task on the runtime.
    auth_lock: tokio::sync::Mutex<Option<TokenWithExpiration>>,
}

impl BearerAuthenticator {
    /// Create a new `BearerAuthenticator` from the tokens in a login/signup
    /// [`AuthResponse`].
    pub fn from_auth_response(now: SystemTime, resp: &AuthResponse) -> Self {
        let token = TokenWithExpiration {
            token: resp.access_token.clone(),
            expiration: now
                + Duration::from_secs(u64::from(resp.expires_in_secs)),
        };
        Self::new(resp.refresh_token.clone(), Some(token))
    }

    /// Create a new `BearerAuthenticator` with the long-lived refresh token
    /// and an optional existing access token.
    pub fn new(
        refresh_token: String,
        maybe_token: Option<TokenWithExpiration>,
    ) -> Self {
        Self {
            refresh_token: Secret::new(refresh_token),
            auth_lock: tokio::sync::Mutex::new(maybe_token),
        }
    }

    /// Expose the refresh token so it can be persisted in the secret store.
    pub fn refresh_token(&self) -> &str {
        self.refresh_token.expose_secret()
    }

    /// Try to either (1) return the existing, fresh access token or (2)
    /// refresh with the backend to get a new fresh token (and cache it).
    pub async fn get_token<T: AppAuthApi + ?Sized>(
        &self,
        api: &T,
        now: SystemTime,
    ) -> Result<String, BackendApiError> {
        let mut auth_lock = self.auth_lock.lock().await;

        // There's already a fresh token here; just use that.
        if let Some(cached_token) = auth_lock.as_ref() {
            // Buffer ensures we don't return immediately expiring tokens.
            if !token_needs_refresh(now, cached_token.expiration) {
                return Ok(cached_token.token.clone());
            }
        }

        // No token yet or expired; exchange the refresh token for a new one.
        let TokenRefreshResponse {
            access_token,
            expires_in_secs,
        } = api
            .refresh_token(TokenRefreshRequest {
                refresh_token: self.refresh_token.expose_secret().clone(),
            })
            .await?;

        let token_with_exp = TokenWithExpiration {
            token: access_token,
            expiration: now + Duration::from_secs(u64::from(expires_in_secs)),
        };
        let token_clone = token_with_exp.token.clone();

        // Fill the token cache with the new token.
        *auth_lock = Some(token_with_exp);

        Ok(token_clone)
    }
}

/// Returns `true` if we should refresh the token (i.e., it's expired or about
/// to expire).
#[inline]
pub fn token_needs_refresh(now: SystemTime, expiration: SystemTime) -> bool {
    now + EXPIRATION_BUFFER >= expiration
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prepd_api_core::models::{LoginRequest, SignupRequest};

    use super::*;

    /// An [`AppAuthApi`] stub that counts refreshes.
    struct CountingAuthApi {
        refreshes: AtomicUsize,
    }

    impl AppAuthApi for CountingAuthApi {
        async fn signup(
            &self,
            _req: SignupRequest,
        ) -> Result<AuthResponse, BackendApiError> {
            unimplemented!()
        }

        async fn login(
            &self,
            _req: LoginRequest,
        ) -> Result<AuthResponse, BackendApiError> {
            unimplemented!()
        }

        async fn refresh_token(
            &self,
            req: TokenRefreshRequest,
        ) -> Result<TokenRefreshResponse, BackendApiError> {
            assert_eq!(req.refresh_token, "refresh-xyz");
            let n = self.refreshes.fetch_add(1, Ordering::Relaxed);
            Ok(TokenRefreshResponse {
                access_token: format!("access-{n}"),
                expires_in_secs: 600,
            })
        }
    }

    #[tokio::test]
    async fn cached_token_is_reused_until_near_expiry() {
        let api = CountingAuthApi {
            refreshes: AtomicUsize::new(0),
        };
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let authenticator = BearerAuthenticator::new(
            "refresh-xyz".to_owned(),
            Some(TokenWithExpiration {
                token: "access-initial".to_owned(),
                expiration: now + Duration::from_secs(600),
            }),
        );

        // Fresh token => no refresh.
        let token = authenticator.get_token(&api, now).await.unwrap();
        assert_eq!(token, "access-initial");
        assert_eq!(api.refreshes.load(Ordering::Relaxed), 0);

        // Within the 30s expiration buffer => refresh.
        let later = now + Duration::from_secs(580);
        let token = authenticator.get_token(&api, later).await.unwrap();
        assert_eq!(token, "access-0");
        assert_eq!(api.refreshes.load(Ordering::Relaxed), 1);

        // The refreshed token is cached.
        let token = authenticator.get_token(&api, later).await.unwrap();
        assert_eq!(token, "access-0");
        assert_eq!(api.refreshes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn no_cached_token_refreshes_immediately() {
        let api = CountingAuthApi {
            refreshes: AtomicUsize::new(0),
        };
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let authenticator =
            BearerAuthenticator::new("refresh-xyz".to_owned(), None);

        let token = authenticator.get_token(&api, now).await.unwrap();
        assert_eq!(token, "access-0");
        assert_eq!(api.refreshes.load(Ordering::Relaxed), 1);
    }
}
