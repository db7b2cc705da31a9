//! Provider callback: the data that comes back on the return route.
//!
//! After the user signs in, the identity provider redirects the browser
//! back to the application with the user's attributes in the query
//! string, tagged with the session id we sent out:
//!
//! ```text
//! https://app.example/auth/return?session=...&email=...&name=...&phone=...&profile_img=...
//! ```
//!
//! A provider that refuses the login sends `error=<reason>` instead.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CallbackPayload, ProtocolError, SessionId, UserRecord};

/// Attributes asserted by the identity provider for one login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCallback {
    pub session: SessionId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_img: Option<String>,
}

impl ProviderCallback {
    /// Parses the provider's return URL.
    ///
    /// Empty optional parameters (`phone=`) are treated as absent.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidMessage`] if the provider reported an
    /// `error`, or if `session`, `email` or `name` is missing or empty.
    pub fn from_return_url(url: &Url) -> Result<Self, ProtocolError> {
        let mut session = None;
        let mut email = None;
        let mut name = None;
        let mut phone = None;
        let mut profile_img = None;

        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "error" => {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "provider rejected login: {value}"
                    )));
                }
                "session" => session = non_empty(value),
                "email" => email = non_empty(value),
                "name" => name = non_empty(value),
                "phone" => phone = non_empty(value),
                "profile_img" => profile_img = non_empty(value),
                _ => {}
            }
        }

        Ok(Self {
            session: SessionId::new(required(session, "session")?),
            email: required(email, "email")?,
            name: required(name, "name")?,
            phone,
            profile_img,
        })
    }

    /// Builds the backend callback body, adding the application's
    /// credentials to the provider-asserted attributes.
    pub fn to_payload(&self, token_app: &str, secret_key: &str) -> CallbackPayload {
        CallbackPayload {
            session: self.session.clone(),
            token_app: token_app.to_string(),
            secret_key: secret_key.to_string(),
            email: self.email.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            profile_img: self.profile_img.clone(),
        }
    }

    /// The record this callback describes, before the backend has had its
    /// say. The backend reply is merged on top of it.
    pub fn to_record(&self) -> UserRecord {
        UserRecord {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            profile_img: self.profile_img.clone(),
            session: self.session.clone(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn required(value: Option<String>, name: &str) -> Result<String, ProtocolError> {
    value.ok_or_else(|| {
        ProtocolError::InvalidMessage(format!("return url is missing `{name}`"))
    })
}
