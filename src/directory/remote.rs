//! REST client for a hosted auth + row-storage service.
//!
//! Auth endpoints live under `/auth/v1`, profile and role rows under `/rest/v1`.
//! Transport failures and unexpected statuses surface as `ProviderUnavailable`;
//! callers decide whether that is fatal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{normalize_email, DirectoryProvider, Identity, IdentityPatch, Registration, Role};
use crate::core::error::{PortalError, PortalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDirectoryConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

impl RemoteDirectoryConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    department: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRow {
    id: Uuid,
    email: String,
    name: String,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleRow {
    user_id: Uuid,
    role: Role,
}

#[derive(Debug, Serialize)]
struct ProfileChanges<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    department: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar: Option<&'a str>,
}

/// Row and auth access to the hosted service.
///
/// Row requests always carry the service key. The handle from [`RemoteDirectory::new`]
/// is shared by every request and never keeps a user token, so its `current_session`
/// is always empty. A client that needs a provider-side session takes its own handle
/// from [`RemoteDirectory::client_session`].
pub struct RemoteDirectory {
    client: Client,
    config: RemoteDirectoryConfig,
    /// `None` on the shared handle.
    session_token: Option<RwLock<Option<String>>>,
}

impl RemoteDirectory {
    pub fn new(config: RemoteDirectoryConfig) -> PortalResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PortalError::Internal(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            config,
            session_token: None,
        })
    }

    /// A handle with its own provider session, sharing this handle's HTTP client.
    pub fn client_session(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            session_token: Some(RwLock::new(None)),
        }
    }

    async fn session_token(&self) -> Option<String> {
        match self.session_token {
            Some(ref slot) => slot.read().await.clone(),
            None => None,
        }
    }

    async fn store_session_token(&self, token: Option<String>) {
        if let Some(ref slot) = self.session_token {
            *slot.write().await = token;
        }
    }

    /// Exchanges credentials for the identity and its provider access token.
    pub async fn authenticate(&self, email: &str, password: &str) -> PortalResult<(Identity, String)> {
        let response = self
            .client
            .post(self.endpoint("/auth/v1/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.api_key)
            .json(&serde_json::json!({
                "email": normalize_email(email),
                "password": password,
            }))
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            return Err(PortalError::InvalidCredentials);
        }

        let token: TokenResponse = expect_success(response).await?.json().await?;
        let identity = self.resolve_identity(token.user).await?;
        Ok((identity, token.access_token))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn fetch_role(&self, id: Uuid) -> PortalResult<Role> {
        let request = self
            .client
            .get(self.endpoint("/rest/v1/user_roles"))
            .query(&[("user_id", format!("eq.{id}")), ("select", "user_id,role".into())]);
        let response = self.authorized(request).send().await?;
        let rows: Vec<RoleRow> = expect_success(response).await?.json().await?;

        Ok(rows.first().map(|r| r.role).unwrap_or_else(|| {
            debug!("No role row for {id}, defaulting to client");
            Role::Client
        }))
    }

    async fn fetch_profile(&self, id: Uuid) -> PortalResult<Option<ProfileRow>> {
        let request = self
            .client
            .get(self.endpoint("/rest/v1/profiles"))
            .query(&[("id", format!("eq.{id}")), ("select", "*".into())]);
        let response = self.authorized(request).send().await?;
        let rows: Vec<ProfileRow> = expect_success(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn resolve_identity(&self, user: AuthUser) -> PortalResult<Identity> {
        let role = self.fetch_role(user.id).await?;
        let identity = match self.fetch_profile(user.id).await? {
            Some(profile) => identity_from_profile(profile, role),
            None => Identity {
                id: user.id,
                email: normalize_email(user.email.as_deref().unwrap_or_default()),
                name: user.user_metadata.name.unwrap_or_default(),
                role,
                department: user.user_metadata.department,
                avatar: None,
                created_at: user.created_at.unwrap_or_else(Utc::now),
            },
        };
        Ok(identity)
    }

    async fn insert_rows(&self, identity: &Identity) -> PortalResult<()> {
        let profile = ProfileRow {
            id: identity.id,
            email: identity.email.clone(),
            name: identity.name.clone(),
            department: identity.department.clone(),
            avatar: identity.avatar.clone(),
            created_at: identity.created_at,
        };
        let request = self
            .client
            .post(self.endpoint("/rest/v1/profiles"))
            .json(&[profile]);
        expect_success(self.authorized(request).send().await?).await?;

        let role = RoleRow {
            user_id: identity.id,
            role: identity.role,
        };
        let request = self
            .client
            .post(self.endpoint("/rest/v1/user_roles"))
            .json(&[role]);
        expect_success(self.authorized(request).send().await?).await?;

        Ok(())
    }
}

fn identity_from_profile(profile: ProfileRow, role: Role) -> Identity {
    Identity {
        id: profile.id,
        email: normalize_email(&profile.email),
        name: profile.name,
        role,
        department: profile.department,
        avatar: profile.avatar,
        created_at: profile.created_at,
    }
}

async fn expect_success(response: reqwest::Response) -> PortalResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Directory backend returned {status}: {body}");
    Err(PortalError::ProviderUnavailable(format!(
        "Directory backend returned {status}"
    )))
}

#[async_trait]
impl DirectoryProvider for RemoteDirectory {
    async fn current_session(&self) -> PortalResult<Option<Identity>> {
        let Some(token) = self.session_token().await else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.endpoint("/auth/v1/user"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Remote session expired");
            self.store_session_token(None).await;
            return Ok(None);
        }

        let user: AuthUser = expect_success(response).await?.json().await?;
        self.resolve_identity(user).await.map(Some)
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortalResult<Identity> {
        let (identity, token) = self.authenticate(email, password).await?;
        self.store_session_token(Some(token)).await;
        info!("Signed in {} via remote directory", identity.id);
        Ok(identity)
    }

    async fn sign_up(&self, registration: Registration) -> PortalResult<Identity> {
        registration.validate()?;
        let email = normalize_email(&registration.email);

        let response = self
            .client
            .post(self.endpoint("/auth/v1/signup"))
            .header("apikey", &self.config.api_key)
            .json(&serde_json::json!({
                "email": email,
                "password": registration.password,
                "data": {
                    "name": registration.name,
                    "department": registration.department,
                    "role": registration.role,
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if body.to_lowercase().contains("already") {
                return Err(PortalError::DuplicateEmail(email));
            }
            return Err(PortalError::Validation(format!("Registration rejected: {body}")));
        }

        let user = match expect_success(response).await?.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => {
                self.store_session_token(Some(token.access_token)).await;
                token.user
            }
            SignUpResponse::User(user) => user,
        };

        let identity = Identity {
            id: user.id,
            email,
            name: registration.name.trim().to_string(),
            role: registration.role,
            department: registration.department.filter(|d| !d.is_empty()),
            avatar: None,
            created_at: user.created_at.unwrap_or_else(Utc::now),
        };
        self.insert_rows(&identity).await?;

        info!("Registered {} identity {} remotely", identity.role, identity.id);
        Ok(identity)
    }

    async fn sign_out(&self) -> PortalResult<()> {
        let Some(token) = self.session_token().await else {
            return Ok(());
        };
        self.store_session_token(None).await;

        let response = self
            .client
            .post(self.endpoint("/auth/v1/logout"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> PortalResult<Option<Identity>> {
        let Some(profile) = self.fetch_profile(id).await? else {
            return Ok(None);
        };
        let role = self.fetch_role(id).await?;
        Ok(Some(identity_from_profile(profile, role)))
    }

    async fn list(&self) -> PortalResult<Vec<Identity>> {
        let request = self
            .client
            .get(self.endpoint("/rest/v1/profiles"))
            .query(&[("select", "*"), ("order", "created_at.asc")]);
        let response = self.authorized(request).send().await?;
        let profiles: Vec<ProfileRow> = expect_success(response).await?.json().await?;

        let request = self
            .client
            .get(self.endpoint("/rest/v1/user_roles"))
            .query(&[("select", "user_id,role")]);
        let response = self.authorized(request).send().await?;
        let roles: Vec<RoleRow> = expect_success(response).await?.json().await?;

        Ok(profiles
            .into_iter()
            .map(|profile| {
                let role = roles
                    .iter()
                    .find(|r| r.user_id == profile.id)
                    .map(|r| r.role)
                    .unwrap_or(Role::Client);
                identity_from_profile(profile, role)
            })
            .collect())
    }

    async fn update(&self, id: Uuid, patch: IdentityPatch) -> PortalResult<Identity> {
        // Validate locally before touching the backend.
        let mut scratch = Identity::new("scratch@localhost", "scratch", Role::Client);
        patch.apply(&mut scratch)?;

        let changes = ProfileChanges {
            email: patch.email.as_deref().map(normalize_email),
            name: patch.name.as_deref().map(str::trim),
            department: patch.department.as_deref(),
            avatar: patch.avatar.as_deref(),
        };
        let request = self
            .client
            .patch(self.endpoint("/rest/v1/profiles"))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&changes);
        let response = self.authorized(request).send().await?;
        let rows: Vec<ProfileRow> = expect_success(response).await?.json().await?;

        let profile = rows
            .into_iter()
            .next()
            .ok_or_else(|| PortalError::NotFound(format!("User {id}")))?;
        let role = self.fetch_role(id).await?;
        Ok(identity_from_profile(profile, role))
    }

    async fn remove(&self, id: Uuid) -> PortalResult<()> {
        let request = self
            .client
            .delete(self.endpoint("/rest/v1/profiles"))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let response = self.authorized(request).send().await?;
        let rows: Vec<ProfileRow> = expect_success(response).await?.json().await?;
        if rows.is_empty() {
            return Err(PortalError::NotFound(format!("User {id}")));
        }

        let request = self
            .client
            .delete(self.endpoint("/rest/v1/user_roles"))
            .query(&[("user_id", format!("eq.{id}"))]);
        if let Err(e) = self.authorized(request).send().await {
            warn!("Profile {id} removed but role row cleanup failed: {e}");
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const USER_ID: &str = "6f1c1d6e-5a4b-4c3d-9e8f-0a1b2c3d4e5f";

    fn directory(server: &Server) -> RemoteDirectory {
        RemoteDirectory::new(RemoteDirectoryConfig::new(server.url(), "anon-key"))
            .expect("client")
    }

    fn profile_body() -> String {
        serde_json::json!([{
            "id": USER_ID,
            "email": "agent@example.com",
            "name": "Support Agent",
            "department": "Customer Service",
            "created_at": "2024-05-01T10:00:00Z"
        }])
        .to_string()
    }

    async fn mock_rows(server: &mut Server, hits: usize) -> (mockito::Mock, mockito::Mock) {
        let roles = server
            .mock("GET", "/rest/v1/user_roles")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(serde_json::json!([{ "user_id": USER_ID, "role": "client" }]).to_string())
            .expect(hits)
            .create_async()
            .await;
        let profiles = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(profile_body())
            .expect(hits)
            .create_async()
            .await;
        (roles, profiles)
    }

    async fn mock_token(server: &mut Server, access_token: &str) -> mockito::Mock {
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "access_token": access_token,
                    "user": { "id": USER_ID, "email": "agent@example.com" }
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_sign_in_resolves_profile_and_role() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "access_token": "jwt-token",
                    "user": { "id": USER_ID, "email": "agent@example.com" }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let roles = server
            .mock("GET", "/rest/v1/user_roles")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer anon-key")
            .with_status(200)
            .with_body(serde_json::json!([{ "user_id": USER_ID, "role": "support" }]).to_string())
            .create_async()
            .await;
        let profiles = server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(profile_body())
            .create_async()
            .await;

        let dir = directory(&server);
        let identity = dir
            .sign_in("Agent@Example.com", "password")
            .await
            .expect("sign in");

        assert_eq!(identity.role, Role::Support);
        assert_eq!(identity.name, "Support Agent");
        assert_eq!(identity.department.as_deref(), Some("Customer Service"));
        token.assert_async().await;
        roles.assert_async().await;
        profiles.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_in_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = directory(&server)
            .sign_in("agent@example.com", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_missing_role_defaults_to_client() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(profile_body())
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/user_roles")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let id = Uuid::parse_str(USER_ID).unwrap();
        let identity = directory(&server).get(id).await.unwrap().expect("identity");
        assert_eq!(identity.role, Role::Client);
    }

    #[tokio::test]
    async fn test_sign_up_duplicate_email() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(422)
            .with_body(r#"{"msg":"User already registered"}"#)
            .create_async()
            .await;

        let err = directory(&server)
            .sign_up(Registration::new("taken@example.com", "password1", "T", Role::Client))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::DuplicateEmail(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_is_provider_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/profiles")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = directory(&server).list().await.unwrap_err();
        assert!(matches!(err, PortalError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_no_token_means_no_session() {
        let server = Server::new_async().await;
        let session = directory(&server).current_session().await.unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn test_row_requests_use_service_key_after_sign_in() {
        let mut server = Server::new_async().await;
        mock_token(&mut server, "client-jwt").await;
        // One lookup from sign-in, one from the listing.
        let (roles, profiles) = mock_rows(&mut server, 2).await;

        let dir = directory(&server);
        let (_, token) = dir
            .authenticate("agent@example.com", "password")
            .await
            .expect("authenticate");
        assert_eq!(token, "client-jwt");

        let users = dir.list().await.expect("list with service key");
        assert_eq!(users.len(), 1);
        assert!(dir.current_session().await.unwrap().is_none());
        roles.assert_async().await;
        profiles.assert_async().await;
    }

    #[tokio::test]
    async fn test_shared_handle_keeps_no_user_session() {
        let mut server = Server::new_async().await;
        mock_token(&mut server, "client-jwt").await;
        mock_rows(&mut server, 1).await;
        let user = server
            .mock("GET", "/auth/v1/user")
            .expect(0)
            .create_async()
            .await;

        let dir = directory(&server);
        dir.sign_in("agent@example.com", "password").await.unwrap();

        assert!(dir.current_session().await.unwrap().is_none());
        user.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_session_handle_owns_its_token() {
        let mut server = Server::new_async().await;
        mock_token(&mut server, "client-jwt").await;
        // Sign-in and the session lookup each resolve the rows once.
        let (roles, profiles) = mock_rows(&mut server, 2).await;
        let user = server
            .mock("GET", "/auth/v1/user")
            .match_header("authorization", "Bearer client-jwt")
            .with_status(200)
            .with_body(serde_json::json!({ "id": USER_ID, "email": "agent@example.com" }).to_string())
            .expect(1)
            .create_async()
            .await;
        let logout = server
            .mock("POST", "/auth/v1/logout")
            .match_header("authorization", "Bearer client-jwt")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let shared = directory(&server);
        let own = shared.client_session();
        own.sign_in("agent@example.com", "password").await.unwrap();

        assert!(shared.current_session().await.unwrap().is_none());
        let current = own.current_session().await.unwrap().expect("session");
        assert_eq!(current.id, Uuid::parse_str(USER_ID).unwrap());

        own.sign_out().await.unwrap();
        assert!(own.current_session().await.unwrap().is_none());

        user.assert_async().await;
        logout.assert_async().await;
        roles.assert_async().await;
        profiles.assert_async().await;
    }
}
