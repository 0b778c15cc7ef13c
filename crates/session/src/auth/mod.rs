//! Authentication: credential encoding, token claims and the token lifecycle

pub mod credentials;
pub mod lifecycle;
pub mod token;

pub use credentials::{
    app_auth, basic_auth, bearer_headers, default_headers, login_headers, ApplicationIdentity,
    Credentials,
};
pub use lifecycle::{TokenLifecycleManager, TokenRenewer, TokenState, TransportRenewer};
pub use token::{IssuedToken, JwtClaimsDecoder, TokenClaims, TokenDecoder, TokenFormatError};

/// Login endpoint
pub const LOGIN_PATH: &str = "/api/rainbow/authentication/v1.0/login";

/// Logout endpoint
pub const LOGOUT_PATH: &str = "/api/rainbow/authentication/v1.0/logout";

/// Token renewal endpoint
pub const RENEW_PATH: &str = "/api/rainbow/authentication/v1.0/renew";
