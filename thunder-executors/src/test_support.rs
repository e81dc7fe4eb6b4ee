//! In-memory provider fakes shared by the executor unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thunder_core::context::{Application, FlowContext};
use thunder_core::flow::FlowType;
use thunder_core::provider::{
    CredentialError, CredentialsVerifier, GroupService, NewUser, OrgUnit, OrgUnitService,
    OtpError, OtpService, ProviderError, RoleService, TokenIssuer, TokenError, User,
    UserProvider, UserTypeRecord, UserTypeService,
};

pub fn context(flow_type: FlowType) -> FlowContext {
    FlowContext::new(
        "flow-1",
        flow_type,
        Application {
            id: "app-1".into(),
            ..Application::default()
        },
        "start",
    )
}

#[derive(Default)]
pub struct FakeUserProvider {
    pub users: Mutex<Vec<User>>,
    pub created: Mutex<Vec<NewUser>>,
    pub updated: Mutex<Vec<(String, HashMap<String, String>)>>,
    pub get_user_not_implemented: bool,
    pub fail_create: bool,
}

impl FakeUserProvider {
    pub fn with_user(user: User) -> Self {
        Self {
            users: Mutex::new(vec![user]),
            ..Self::default()
        }
    }
}

#[async_trait]
impl UserProvider for FakeUserProvider {
    async fn identify_user(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        if filters.is_empty() {
            return Err(ProviderError::Client("no filters".into()));
        }
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| filters.iter().all(|(k, v)| u.attributes.get(k) == Some(v)))
            .map(|u| u.id.clone())
            .ok_or(ProviderError::UserNotFound)
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ProviderError> {
        if self.get_user_not_implemented {
            return Err(ProviderError::NotImplemented);
        }
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(ProviderError::UserNotFound)
    }

    async fn create_user(&self, user: NewUser) -> Result<String, ProviderError> {
        if self.fail_create {
            return Err(ProviderError::Server("create failed".into()));
        }
        let id = format!("user-{}", self.created.lock().unwrap().len() + 1);
        self.created.lock().unwrap().push(user.clone());
        self.users.lock().unwrap().push(User {
            id: id.clone(),
            user_type: user.user_type,
            ou_id: user.ou_id,
            attributes: user.attributes,
        });
        Ok(id)
    }

    async fn update_user(
        &self,
        user_id: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), ProviderError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(ProviderError::UserNotFound)?;
        user.attributes.extend(attributes.clone());
        drop(users);
        self.updated.lock().unwrap().push((user_id.into(), attributes));
        Ok(())
    }
}

pub struct FakeCredentialsVerifier {
    pub password: String,
}

#[async_trait]
impl CredentialsVerifier for FakeCredentialsVerifier {
    async fn authenticate(
        &self,
        identifiers: &HashMap<String, String>,
        credentials: &HashMap<String, String>,
    ) -> Result<String, CredentialError> {
        let username = identifiers
            .get("username")
            .ok_or(CredentialError::UserNotFound)?;
        if credentials.get("password") == Some(&self.password) {
            Ok(format!("user-{username}"))
        } else {
            Err(CredentialError::InvalidCredentials)
        }
    }
}

#[derive(Default)]
pub struct FakeOtpService {
    pub sent: Mutex<Vec<String>>,
    pub expected: Option<String>,
}

#[async_trait]
impl OtpService for FakeOtpService {
    async fn send(&self, mobile_number: &str) -> Result<(), OtpError> {
        self.sent.lock().unwrap().push(mobile_number.to_string());
        Ok(())
    }

    async fn verify(&self, _mobile_number: &str, otp: &str) -> Result<(), OtpError> {
        match &self.expected {
            Some(expected) if expected == otp => Ok(()),
            Some(_) => Err(OtpError::Mismatch),
            None => Err(OtpError::Expired),
        }
    }
}

pub struct FakeOuService;

#[async_trait]
impl OrgUnitService for FakeOuService {
    async fn get_ou(&self, ou_id: &str) -> Result<OrgUnit, ProviderError> {
        Ok(OrgUnit {
            id: ou_id.into(),
            name: format!("OU {ou_id}"),
            handle: format!("ou-{ou_id}"),
        })
    }
}

#[derive(Default)]
pub struct FakeUserTypeService {
    pub records: Vec<UserTypeRecord>,
}

#[async_trait]
impl UserTypeService for FakeUserTypeService {
    async fn get_by_name(&self, name: &str) -> Result<UserTypeRecord, ProviderError> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| ProviderError::Client(format!("unknown user type {name}")))
    }

    async fn list(&self) -> Result<Vec<UserTypeRecord>, ProviderError> {
        Ok(self.records.clone())
    }
}

#[derive(Default)]
pub struct FakeGroupService {
    pub assigned: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl GroupService for FakeGroupService {
    async fn assign(&self, user_id: &str, group: &str) -> Result<(), ProviderError> {
        self.assigned.lock().unwrap().push((user_id.into(), group.into()));
        if self.fail {
            Err(ProviderError::Server("group assignment failed".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct FakeRoleService {
    pub assigned: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl RoleService for FakeRoleService {
    async fn assign(&self, user_id: &str, role: &str) -> Result<(), ProviderError> {
        self.assigned.lock().unwrap().push((user_id.into(), role.into()));
        if self.fail {
            Err(ProviderError::Server("role assignment failed".into()))
        } else {
            Ok(())
        }
    }
}

/// Issues a fake token recording what it was asked to sign.
#[derive(Default)]
pub struct FakeTokenIssuer {
    pub issued: Mutex<Vec<(String, String, String, u64)>>,
}

#[async_trait]
impl TokenIssuer for FakeTokenIssuer {
    async fn issue(
        &self,
        user_id: &str,
        app_id: &str,
        issuer: &str,
        validity_secs: u64,
        _claims: HashMap<String, serde_json::Value>,
    ) -> Result<String, TokenError> {
        self.issued.lock().unwrap().push((
            user_id.into(),
            app_id.into(),
            issuer.into(),
            validity_secs,
        ));
        Ok(format!("jwt.{user_id}.{issuer}"))
    }
}
