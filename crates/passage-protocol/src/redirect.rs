//! Redirect URL construction for the external identity provider.
//!
//! The login starts with a plain browser navigation:
//!
//! ```text
//! <provider login url>?token_app=<APP_TOKEN>&session=<session id>
//! ```
//!
//! The two parameter names are fixed by the provider. Anything already on
//! the provider URL (a tenant id, a locale) is kept as-is.

use url::Url;

use crate::{ProtocolError, SessionId};

/// Query parameter carrying the application token.
pub const APP_TOKEN_PARAM: &str = "token_app";

/// Query parameter carrying the session identifier.
pub const SESSION_PARAM: &str = "session";

/// Builds login URLs against one provider base URL.
///
/// The base URL is parsed and checked once, in [`new`](Self::new). After
/// that, [`build`](Self::build) can't fail, so a bad provider URL surfaces
/// at startup instead of on the user's first click.
#[derive(Debug, Clone)]
pub struct RedirectUrlBuilder {
    base: Url,
}

impl RedirectUrlBuilder {
    /// Parses and validates the provider base URL.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidUrl`] if `base` is relative, malformed, or a
    /// URL that cannot carry a query (`mailto:`, `data:`).
    pub fn new(base: &str) -> Result<Self, ProtocolError> {
        let parsed = Url::parse(base).map_err(|e| ProtocolError::InvalidUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ProtocolError::InvalidUrl {
                url: base.to_string(),
                reason: "not a hierarchical url".into(),
            });
        }
        Ok(Self { base: parsed })
    }

    /// The parsed provider base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Appends `token_app` and `session` to a copy of the base URL.
    ///
    /// Values are form-urlencoded (the same encoding a browser's
    /// `URLSearchParams` uses), so tokens with `&`, `=` or spaces survive
    /// the round trip.
    pub fn build(&self, app_token: &str, session: &SessionId) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair(APP_TOKEN_PARAM, app_token)
            .append_pair(SESSION_PARAM, session.as_str());
        url
    }
}

/// One-shot form of [`RedirectUrlBuilder`].
///
/// # Errors
/// Same as [`RedirectUrlBuilder::new`].
pub fn build_login_url(
    base: &str,
    app_token: &str,
    session: &SessionId,
) -> Result<Url, ProtocolError> {
    Ok(RedirectUrlBuilder::new(base)?.build(app_token, session))
}
