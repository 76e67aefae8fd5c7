pub mod authinfo;
pub mod authtype;
pub mod health;
pub mod login;
pub mod openid;
pub mod saml;
pub mod status;
pub mod tenant;
