//! Controller configuration.

use std::fmt;
use std::time::Duration;

use passage_api::ApiEndpoints;
#[cfg(feature = "http")]
use passage_api::HttpAuthApi;
use passage_protocol::RedirectUrlBuilder;
use passage_session::StorageKeys;

use crate::AuthError;

/// Everything the login flow needs to know about its deployment.
///
/// Build it with [`Default`] and the `with_*` setters; the controller
/// builder calls [`validate`](Self::validate) before anything else.
///
/// `Debug` output redacts both secrets.
#[derive(Clone)]
pub struct AuthConfig {
    /// The provider's login page. Existing query parameters are kept.
    pub provider_login_url: String,
    /// Identifies this application to the provider.
    pub app_token: String,
    /// Sent to the backend with every callback.
    pub secret_key: String,
    /// Backend origin, e.g. `https://api.example.com`.
    pub api_base_url: String,
    /// Sent to the backend in the `apikey` header.
    pub api_key: String,
    pub endpoints: ApiEndpoints,
    /// Hard deadline for every backend call.
    pub request_timeout: Duration,
    /// Prefix of the two durable storage keys.
    pub storage_namespace: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider_login_url: "https://originalauth.com/login".into(),
            app_token: String::new(),
            secret_key: String::new(),
            api_base_url: String::new(),
            api_key: String::new(),
            endpoints: ApiEndpoints::default(),
            request_timeout: Duration::from_secs(10),
            storage_namespace: StorageKeys::DEFAULT_NAMESPACE.into(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn with_provider_login_url(mut self, url: impl Into<String>) -> Self {
        self.provider_login_url = url.into();
        self
    }

    #[must_use]
    pub fn with_app_token(mut self, token: impl Into<String>) -> Self {
        self.app_token = token.into();
        self
    }

    #[must_use]
    pub fn with_secret_key(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = secret.into();
        self
    }

    /// Sets the backend origin and its API key.
    #[must_use]
    pub fn with_api(mut self, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self.api_key = api_key.into();
        self
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: ApiEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }

    /// Checks the settings the controller cannot run without.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] if the provider URL can't carry query
    /// parameters, the app token or storage namespace is empty, or the
    /// request timeout is zero.
    pub fn validate(&self) -> Result<(), AuthError> {
        self.redirect_builder()?;
        if self.app_token.trim().is_empty() {
            return Err(AuthError::Configuration("app_token is required".into()));
        }
        if self.storage_namespace.trim().is_empty() {
            return Err(AuthError::Configuration(
                "storage_namespace must not be empty".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(AuthError::Configuration(
                "request_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn redirect_builder(&self) -> Result<RedirectUrlBuilder, AuthError> {
        RedirectUrlBuilder::new(&self.provider_login_url)
            .map_err(|e| AuthError::Configuration(format!("provider_login_url: {e}")))
    }

    /// The storage keys under [`storage_namespace`](Self::storage_namespace).
    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys::namespaced(&self.storage_namespace)
    }

    /// An HTTP backend client for this configuration.
    ///
    /// # Errors
    /// [`AuthError::Configuration`] if `api_base_url` is not an absolute
    /// `http` or `https` URL.
    #[cfg(feature = "http")]
    pub fn http_api(&self) -> Result<HttpAuthApi, AuthError> {
        let base = url::Url::parse(&self.api_base_url)
            .map_err(|e| AuthError::Configuration(format!("api_base_url: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AuthError::Configuration(format!(
                "api_base_url must be http or https, got {}",
                base.scheme()
            )));
        }

        Ok(HttpAuthApi::new(&self.api_base_url, &self.api_key)
            .with_endpoints(self.endpoints.clone())
            .with_timeout(self.request_timeout))
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("provider_login_url", &self.provider_login_url)
            .field("app_token", &self.app_token)
            .field("secret_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .field("request_timeout", &self.request_timeout)
            .field("storage_namespace", &self.storage_namespace)
            .finish()
    }
}
