//! Collaborator contracts the executor library is wired against.
//!
//! Concrete implementations live with the deployment (user store, OTP
//! gateway, token service); the engine and executors only see these traits.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A user record as returned by the user store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ou_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Payload for creating a user during provisioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ou_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Sensitive attributes (e.g. `password`) kept apart from profile data.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

/// An organisational unit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUnit {
    pub id: String,
    pub name: String,
    pub handle: String,
}

/// A user type with its self-registration policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypeRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ou_id: Option<String>,
    #[serde(default)]
    pub allow_self_registration: bool,
}

/// Errors from user, OU, and user-type providers.
#[derive(Debug)]
pub enum ProviderError {
    UserNotFound,
    /// The provider does not implement the operation; callers treat the
    /// result as absent rather than failing the flow.
    NotImplemented,
    Client(String),
    Server(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::UserNotFound => write!(f, "User not found"),
            ProviderError::NotImplemented => write!(f, "Operation not implemented"),
            ProviderError::Client(msg) => write!(f, "Provider client error: {msg}"),
            ProviderError::Server(msg) => write!(f, "Provider server error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from the credentials verification service.
#[derive(Debug)]
pub enum CredentialError {
    InvalidCredentials,
    UserNotFound,
    Server(String),
}

impl CredentialError {
    /// Whether this is a client-class outcome the flow should branch on.
    pub fn is_client(&self) -> bool {
        !matches!(self, CredentialError::Server(_))
    }
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::InvalidCredentials => write!(f, "Invalid credentials"),
            CredentialError::UserNotFound => write!(f, "User not found"),
            CredentialError::Server(msg) => write!(f, "Credential service error: {msg}"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Errors from the OTP service.
#[derive(Debug)]
pub enum OtpError {
    Expired,
    Mismatch,
    Send(String),
    Server(String),
}

impl std::fmt::Display for OtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtpError::Expired => write!(f, "OTP expired"),
            OtpError::Mismatch => write!(f, "Incorrect OTP"),
            OtpError::Send(msg) => write!(f, "Failed to send OTP: {msg}"),
            OtpError::Server(msg) => write!(f, "OTP service error: {msg}"),
        }
    }
}

impl std::error::Error for OtpError {}

/// Errors from the assertion token service.
#[derive(Debug)]
pub enum TokenError {
    Signing(String),
    InvalidClaims(String),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Signing(msg) => write!(f, "Token signing failed: {msg}"),
            TokenError::InvalidClaims(msg) => write!(f, "Invalid token claims: {msg}"),
        }
    }
}

impl std::error::Error for TokenError {}

/// User store operations the executors depend on.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Find exactly one user matching the given attribute filters and return
    /// its id.
    async fn identify_user(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<String, ProviderError>;

    async fn get_user(&self, user_id: &str) -> Result<User, ProviderError>;

    /// Create a user and return its id.
    async fn create_user(&self, user: NewUser) -> Result<String, ProviderError>;

    /// Merge the given attributes into the stored user.
    async fn update_user(
        &self,
        user_id: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), ProviderError>;
}

/// Credentials verification against identifier + credential maps.
#[async_trait]
pub trait CredentialsVerifier: Send + Sync {
    /// Authenticate and return the user id on success.
    async fn authenticate(
        &self,
        identifiers: &HashMap<String, String>,
        credentials: &HashMap<String, String>,
    ) -> Result<String, CredentialError>;
}

/// One-time-passcode delivery and verification.
#[async_trait]
pub trait OtpService: Send + Sync {
    async fn send(&self, mobile_number: &str) -> Result<(), OtpError>;

    async fn verify(&self, mobile_number: &str, otp: &str) -> Result<(), OtpError>;
}

/// Organisational unit lookups for assertion claims and provisioning.
#[async_trait]
pub trait OrgUnitService: Send + Sync {
    async fn get_ou(&self, ou_id: &str) -> Result<OrgUnit, ProviderError>;
}

/// User-type catalogue with self-registration policy.
#[async_trait]
pub trait UserTypeService: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<UserTypeRecord, ProviderError>;

    async fn list(&self) -> Result<Vec<UserTypeRecord>, ProviderError>;
}

/// Group membership assignment during provisioning.
#[async_trait]
pub trait GroupService: Send + Sync {
    async fn assign(&self, user_id: &str, group: &str) -> Result<(), ProviderError>;
}

/// Role assignment during provisioning.
#[async_trait]
pub trait RoleService: Send + Sync {
    async fn assign(&self, user_id: &str, role: &str) -> Result<(), ProviderError>;
}

/// Resolves the application snapshot captured at flow start.
#[async_trait]
pub trait ApplicationProvider: Send + Sync {
    async fn get_application(
        &self,
        app_id: &str,
    ) -> Result<crate::context::Application, ProviderError>;
}

/// Issues the one-shot assertion emitted at the end of authentication flows.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(
        &self,
        user_id: &str,
        app_id: &str,
        issuer: &str,
        validity_secs: u64,
        claims: HashMap<String, serde_json::Value>,
    ) -> Result<String, TokenError>;
}
