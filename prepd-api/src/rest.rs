use std::{borrow::Cow, time::Duration};

use bytes::Bytes;
use http::Method;
use prepd_api_core::error::{
    ApiError, CommonApiError, CommonErrorKind, ErrorCode, ErrorResponse,
};
use prepd_std::backoff;
use reqwest::IntoUrl;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// The default timeout for API requests. Exam submission grading is the
/// slowest endpoint we hit and stays comfortably under this.
pub const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// Avoid `Method::` prefix. Associated constants can't be imported.
pub const GET: Method = Method::GET;
pub const PUT: Method = Method::PUT;
pub const POST: Method = Method::POST;
pub const DELETE: Method = Method::DELETE;

/// A generic RestClient which conforms to the Prepd backend's API
/// conventions: JSON bodies, query-string GET params, and [`ErrorResponse`]
/// bodies on non-2xx statuses.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    /// The process this [`RestClient`] is being called from, e.g. "app".
    from: Cow<'static, str>,
    /// The service this [`RestClient`] is calling, e.g. "backend".
    to: &'static str,
}

impl RestClient {
    /// Builds a new [`RestClient`] with safe defaults.
    ///
    /// The `from` and `to` fields should succinctly name the client and
    /// server ends, e.g. `from`="app", `to`="backend". Both are logged so
    /// requests from this client can be told apart from other clients in the
    /// same process, and `from` is propagated to the server via the user
    /// agent header.
    pub fn new(from: impl Into<Cow<'static, str>>, to: &'static str) -> Self {
        fn inner(from: Cow<'static, str>, to: &'static str) -> RestClient {
            let client = RestClient::client_builder(&from)
                .build()
                .expect("Failed to build reqwest Client");
            RestClient { client, from, to }
        }
        inner(from.into(), to)
    }

    /// Get a [`reqwest::ClientBuilder`] with our defaults set.
    pub fn client_builder(from: impl AsRef<str>) -> reqwest::ClientBuilder {
        fn inner(from: &str) -> reqwest::ClientBuilder {
            reqwest::Client::builder()
                .user_agent(from)
                .timeout(API_REQUEST_TIMEOUT)
        }
        inner(from.as_ref())
    }

    /// Construct a [`RestClient`] from an existing [`reqwest::Client`].
    pub fn from_inner(
        client: reqwest::Client,
        from: impl Into<Cow<'static, str>>,
        to: &'static str,
    ) -> Self {
        Self {
            client,
            from: from.into(),
            to,
        }
    }

    #[inline]
    pub fn user_agent(&self) -> &Cow<'static, str> {
        &self.from
    }

    // --- RequestBuilder helpers --- //

    /// GET with `data` serialized into the query string.
    #[inline]
    pub fn get<U, T>(&self, url: U, data: &T) -> reqwest::RequestBuilder
    where
        U: IntoUrl,
        T: Serialize + ?Sized,
    {
        self.builder(GET, url).query(data)
    }

    /// POST with `data` serialized as the JSON body.
    #[inline]
    pub fn post<U, T>(&self, url: U, data: &T) -> reqwest::RequestBuilder
    where
        U: IntoUrl,
        T: Serialize + ?Sized,
    {
        self.builder(POST, url).json(data)
    }

    /// PUT with `data` serialized as the JSON body.
    #[inline]
    pub fn put<U, T>(&self, url: U, data: &T) -> reqwest::RequestBuilder
    where
        U: IntoUrl,
        T: Serialize + ?Sized,
    {
        self.builder(PUT, url).json(data)
    }

    /// DELETE with `data` serialized as the JSON body.
    #[inline]
    pub fn delete<U, T>(&self, url: U, data: &T) -> reqwest::RequestBuilder
    where
        U: IntoUrl,
        T: Serialize + ?Sized,
    {
        self.builder(DELETE, url).json(data)
    }

    /// A clean slate [`reqwest::RequestBuilder`] for non-standard requests.
    /// Otherwise prefer the ready-made `get`, `post`, ..., etc helpers.
    pub fn builder(
        &self,
        method: Method,
        url: impl IntoUrl,
    ) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    // --- Request send/recv --- //

    /// Sends the built HTTP request.
    /// Tries to JSON deserialize the response body to `T`.
    pub async fn send<T: DeserializeOwned, E: ApiError>(
        &self,
        request_builder: reqwest::RequestBuilder,
    ) -> Result<T, E> {
        let bytes = self.send_no_deserialize::<E>(request_builder).await?;
        Self::json_deserialize(bytes)
    }

    /// Sends the HTTP request, but *doesn't* JSON-deserialize the response.
    pub async fn send_no_deserialize<E: ApiError>(
        &self,
        request_builder: reqwest::RequestBuilder,
    ) -> Result<Bytes, E> {
        let request = request_builder.build().map_err(CommonApiError::from)?;
        let response = self.send_inner(request).await;
        Self::map_response_errors(response)
    }

    /// Sends the built HTTP request, retrying up to `retries` times with
    /// exponential backoff. Tries to JSON deserialize the response body to
    /// `T`.
    ///
    /// If one of the request attempts yields an error code in `stop_codes`,
    /// we immediately stop retrying and return that error.
    pub async fn send_with_retries<T: DeserializeOwned, E: ApiError>(
        &self,
        request_builder: reqwest::RequestBuilder,
        retries: usize,
        stop_codes: &[ErrorCode],
    ) -> Result<T, E> {
        let request = request_builder.build().map_err(CommonApiError::from)?;
        let response = self
            .send_with_retries_inner(request, retries, stop_codes)
            .await;
        let bytes = Self::map_response_errors::<E>(response)?;
        Self::json_deserialize(bytes)
    }

    // `send_inner` and `send_with_retries_inner` intentionally use zero
    // generics in their signatures to minimize code bloat.

    async fn send_with_retries_inner(
        &self,
        request: reqwest::Request,
        retries: usize,
        stop_codes: &[ErrorCode],
    ) -> Result<Result<Bytes, ErrorResponse>, CommonApiError> {
        let mut backoff_durations = backoff::iter();
        let mut request = Some(request);

        // Do the 'retries' first.
        for _ in 0..retries {
            // Clone the request. The request body is cheaply cloneable; the
            // headers and url are not :'(
            let maybe_request_clone = request
                .as_ref()
                .expect(
                    "This should never happen; we only take() the original \
                     request on the last attempt",
                )
                .try_clone();

            let request_clone = match maybe_request_clone {
                Some(request_clone) => request_clone,
                // We only get None if the request body is streamed. In that
                // case we can't send more than once.
                None => break,
            };

            // Send the request and look for any error codes in the response
            // that we should bail on and stop retrying.
            match self.send_inner(request_clone).await {
                Ok(Ok(bytes)) => return Ok(Ok(bytes)),
                Ok(Err(api_error)) =>
                    if stop_codes.contains(&api_error.code) {
                        return Ok(Err(api_error));
                    },
                Err(common_error) =>
                    if stop_codes.contains(&common_error.kind.to_code()) {
                        return Err(common_error);
                    },
            }

            // Sleep for a bit before the next retry.
            tokio::time::sleep(backoff_durations.next().unwrap()).await;
        }

        // We ran out of retries; return the result of the 'main' attempt.
        self.send_inner(request.take().unwrap()).await
    }

    async fn send_inner(
        &self,
        request: reqwest::Request,
    ) -> Result<Result<Bytes, ErrorResponse>, CommonApiError> {
        let start = std::time::Instant::now();
        let (from, to) = (&self.from, self.to);
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%from, to, %method, %url, "New client request");

        // Send the request, await the response headers.
        let resp = self.client.execute(request).await.inspect_err(|e| {
            let req_ms = start.elapsed().as_millis();
            warn!(
                %from, to, %method, %url, req_ms,
                "Done (error)(sending) Error sending request: {e:#}",
            );
        })?;

        let status = resp.status().as_u16();

        if resp.status().is_success() {
            let bytes = resp.bytes().await.inspect_err(|e| {
                let req_ms = start.elapsed().as_millis();
                warn!(
                    %from, to, %method, %url, req_ms, status,
                    "Done (error)(receiving) \
                     Couldn't receive response body: {e:#}",
                );
            })?;

            let req_ms = start.elapsed().as_millis();
            debug!(%from, to, %method, %url, req_ms, status, "Done (success)");
            Ok(Ok(bytes))
        } else {
            // http error => await response json and convert to ErrorResponse
            let error =
                resp.json::<ErrorResponse>().await.inspect_err(|e| {
                    let req_ms = start.elapsed().as_millis();
                    warn!(
                        %from, to, %method, %url, req_ms, status,
                        "Done (error)(receiving) \
                         Couldn't receive ErrorResponse: {e:#}",
                    );
                })?;

            let req_ms = start.elapsed().as_millis();
            warn!(
                %from, to, %method, %url, req_ms, status,
                error_code = error.code,
                error_msg = %error.msg,
                "Done (error)(response) Server returned error response",
            );
            Ok(Err(error))
        }
    }

    /// Converts the [`Result<Result<Bytes, ErrorResponse>, CommonApiError>`]
    /// returned by [`Self::send_inner`] to [`Result<Bytes, E>`].
    fn map_response_errors<E: ApiError>(
        response: Result<Result<Bytes, ErrorResponse>, CommonApiError>,
    ) -> Result<Bytes, E> {
        match response {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(err_api)) => Err(E::from(err_api)),
            Err(err_client) => Err(E::from(err_client)),
        }
    }

    /// JSON-deserializes the REST response bytes.
    fn json_deserialize<T: DeserializeOwned, E: ApiError>(
        bytes: Bytes,
    ) -> Result<T, E> {
        serde_json::from_slice::<T>(&bytes)
            .map_err(|err| {
                let kind = CommonErrorKind::Decode;
                let mut msg = format!("JSON deserialization failed: {err:#}");

                // If we're in debug, append the response str to the error msg.
                if cfg!(any(debug_assertions, test)) {
                    let resp_msg = String::from_utf8_lossy(&bytes);
                    msg.push_str(&format!(": '{resp_msg}'"));
                }

                CommonApiError::new(kind, msg)
            })
            .map_err(E::from)
    }
}

/// Extension trait on [`reqwest::RequestBuilder`] for easily modifying
/// requests as they're constructed.
pub trait RequestBuilderExt: Sized {
    /// Attach a bearer token via the `Authorization` header.
    fn bearer_auth_token(self, token: &str) -> Self;
}

impl RequestBuilderExt for reqwest::RequestBuilder {
    fn bearer_auth_token(self, token: &str) -> Self {
        self.bearer_auth(token)
    }
}
