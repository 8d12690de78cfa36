pub mod access;
pub mod middleware;
pub mod password;
pub mod session;

pub use access::{authorize, authorize_path, AccessDecision, Redirect, LOGIN_PATH};
pub use middleware::{auth_middleware, extract_token, require_roles, RoleGate, SessionToken};
pub use password::{Argon2Config, CredentialHasher, PasswordIssue, PasswordPolicy};
pub use session::{
    extract_token_from_cookie, generate_token, AuthSession, InMemoryTokenStore, PortalSessions,
    SameSite, SessionConfig, SessionManager, SessionStatus, TokenStore,
};
