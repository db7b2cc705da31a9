//! # Passage
//!
//! Session lifecycle for applications that sign users in through an
//! external identity provider.
//!
//! The flow is a browser round trip:
//!
//! 1. [`AuthController::pre_login`] mints a session id, persists it, and
//!    sends the browser to the provider with `token_app` and `session`.
//! 2. The provider redirects back with the user's attributes;
//!    [`AuthController::handle_callback`] checks the session id against the
//!    stored one, submits it to the backend, and persists the user record.
//! 3. Later, [`AuthController::validate_session`] asks the backend whether
//!    the session still holds.
//!
//! The presentation layer only ever reads [`AuthState`] and calls the
//! controller's public operations.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use passage::prelude::*;
//!
//! # async fn run() -> Result<(), AuthError> {
//! let config = AuthConfig::default()
//!     .with_app_token("my-app-token")
//!     .with_api("https://api.example.com", "my-api-key");
//!
//! let api = config.http_api()?;
//! let auth = AuthController::builder(config).build(MemoryStorage::new(), api)?;
//!
//! auth.initialize().await;
//! if !auth.is_authenticated() {
//!     let url = auth.pre_login().await?;
//!     println!("continue at {url}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
mod error;
mod observer;
mod state;

pub use config::AuthConfig;
pub use controller::{AuthController, AuthControllerBuilder};
pub use error::{AuthError, ErrorKind};
pub use observer::{AuthObserver, LoggingNavigator, Navigator, TracingObserver};
pub use state::AuthState;

pub mod prelude {
    //! Everything an application needs to wire up a login flow.

    pub use crate::{
        AuthConfig, AuthController, AuthControllerBuilder, AuthError, AuthObserver, AuthState,
        ErrorKind, LoggingNavigator, Navigator, TracingObserver,
    };
    pub use passage_api::{ApiEndpoints, ApiError, AuthApi};
    #[cfg(feature = "http")]
    pub use passage_api::HttpAuthApi;
    pub use passage_protocol::{
        ProviderCallback, RedirectUrlBuilder, SessionId, UserAttributes, UserRecord,
    };
    pub use passage_session::{
        FileStorage, MemoryStorage, RandomSessionIds, SessionIdGenerator, SessionStore, Storage,
        StorageError,
    };
    pub use url::Url;
}
