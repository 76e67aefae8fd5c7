//! Session state carried in the encrypted cookie.
//!
//! Flow Overview:
//! - [`codec`] unseals the raw cookie value into a [`SecuritySessionCookie`].
//!   Anything that fails to decrypt or parse is treated as "no cookie".
//! - [`validator::is_valid`] decides whether the decoded record is live.
//! - [`record::SessionRecord`] is the typed view the auth flows work on.

pub mod codec;
pub mod cookie;
pub mod record;
pub mod validator;

pub use codec::{CodecError, CookieCodec, PrivateCookieCodec, SameSitePolicy, SessionCookies};
pub use cookie::{SamlCookieState, SecuritySessionCookie};
pub use record::{
    AuthSession, AuthType, Identity, OidcHandshake, RecordError, SamlHandshake, SessionRecord,
};
pub use validator::is_valid;
