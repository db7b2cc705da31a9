//! Wire protocol for Passage.
//!
//! This crate defines everything that crosses a boundary between the
//! application and the outside world during a delegated login:
//!
//! - **Types** ([`SessionId`], [`UserRecord`], [`CallbackPayload`], etc.):
//!   the structures that are sent to the backend or persisted locally.
//! - **Redirect** ([`RedirectUrlBuilder`]): the URL the browser is sent
//!   to at the identity provider.
//! - **Callback** ([`ProviderCallback`]): what the provider hands back
//!   on the return route.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records are turned
//!   into bytes for storage.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer has no I/O. It doesn't know about storage or HTTP;
//! it only knows the shapes of the messages and the URL contract.
//!
//! ```text
//! Session (storage) ─┐
//!                    ├─→ Protocol (types, URLs, codecs)
//! Api (HTTP)  ───────┘
//! ```

mod callback;
mod codec;
mod error;
mod redirect;
mod types;
mod validity;

pub use callback::ProviderCallback;
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use redirect::{
    build_login_url, RedirectUrlBuilder, APP_TOKEN_PARAM, SESSION_PARAM,
};
pub use types::{
    CallbackPayload, SessionId, SessionRequest, UserAttributes, UserRecord,
};
pub use validity::{decode_validity, VALIDITY_KEYS};
