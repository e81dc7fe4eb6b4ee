//! In-memory demo collaborators.
//!
//! Stand-ins for the user store, credential service, OTP gateway, and
//! application registry a production deployment plugs in. Seeded from the
//! same data the packaged demo flows expect.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use thunder_core::context::Application;
use thunder_core::provider::{
    ApplicationProvider, CredentialError, CredentialsVerifier, GroupService, NewUser, OrgUnit,
    OrgUnitService, OtpError, OtpService, ProviderError, RoleService, User, UserProvider,
    UserTypeRecord, UserTypeService,
};
use thunder_http::{FlowMetadataProvider, MetaTargetType};
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
struct DemoRecord {
    user: User,
    password: String,
}

/// In-memory user store doubling as the credentials verifier.
#[derive(Default)]
pub struct DemoDirectory {
    records: Mutex<Vec<DemoRecord>>,
}

impl DemoDirectory {
    pub fn seeded() -> Self {
        let directory = Self::default();
        directory.records.lock().unwrap().push(DemoRecord {
            user: User {
                id: "user-demo".into(),
                user_type: Some("customer".into()),
                ou_id: Some("ou-root".into()),
                attributes: HashMap::from([
                    ("username".into(), "demo".into()),
                    ("email".into(), "demo@example.com".into()),
                    ("mobileNumber".into(), "+14155550100".into()),
                ]),
            },
            password: "demo1234".into(),
        });
        directory
    }
}

#[async_trait]
impl UserProvider for DemoDirectory {
    async fn identify_user(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        if filters.is_empty() {
            return Err(ProviderError::Client("no search filters".into()));
        }
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| filters.iter().all(|(k, v)| r.user.attributes.get(k) == Some(v)))
            .map(|r| r.user.id.clone())
            .ok_or(ProviderError::UserNotFound)
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ProviderError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user.id == user_id)
            .map(|r| r.user.clone())
            .ok_or(ProviderError::UserNotFound)
    }

    async fn create_user(&self, user: NewUser) -> Result<String, ProviderError> {
        let id = format!("user-{}", Uuid::now_v7());
        let password = user
            .credentials
            .get("password")
            .cloned()
            .unwrap_or_default();
        self.records.lock().unwrap().push(DemoRecord {
            user: User {
                id: id.clone(),
                user_type: user.user_type,
                ou_id: user.ou_id,
                attributes: user.attributes,
            },
            password,
        });
        Ok(id)
    }

    async fn update_user(
        &self,
        user_id: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), ProviderError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.user.id == user_id)
            .ok_or(ProviderError::UserNotFound)?;
        record.user.attributes.extend(attributes);
        Ok(())
    }
}

#[async_trait]
impl CredentialsVerifier for DemoDirectory {
    async fn authenticate(
        &self,
        identifiers: &HashMap<String, String>,
        credentials: &HashMap<String, String>,
    ) -> Result<String, CredentialError> {
        let records = self.records.lock().unwrap();
        let record = records
            .iter()
            .find(|r| identifiers.iter().all(|(k, v)| r.user.attributes.get(k) == Some(v)))
            .ok_or(CredentialError::UserNotFound)?;
        match credentials.get("password") {
            Some(password) if *password == record.password => Ok(record.user.id.clone()),
            _ => Err(CredentialError::InvalidCredentials),
        }
    }
}

/// OTP service that logs codes instead of sending SMS.
#[derive(Default)]
pub struct LoggingOtpService {
    pending: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl OtpService for LoggingOtpService {
    async fn send(&self, mobile_number: &str) -> Result<(), OtpError> {
        // Derive six digits from a v7 uuid; no transport is wired in
        let uuid = Uuid::now_v7();
        let code = format!("{:06}", uuid.as_u128() % 1_000_000);
        info!(mobile_number = %mobile_number, code = %code, "OTP generated (no transport configured)");
        self.pending
            .lock()
            .unwrap()
            .insert(mobile_number.to_string(), code);
        Ok(())
    }

    async fn verify(&self, mobile_number: &str, otp: &str) -> Result<(), OtpError> {
        let mut pending = self.pending.lock().unwrap();
        match pending.get(mobile_number) {
            Some(expected) if expected == otp => {
                pending.remove(mobile_number);
                Ok(())
            }
            Some(_) => Err(OtpError::Mismatch),
            None => Err(OtpError::Expired),
        }
    }
}

/// Single-OU organisation tree.
pub struct DemoOrgUnits;

#[async_trait]
impl OrgUnitService for DemoOrgUnits {
    async fn get_ou(&self, ou_id: &str) -> Result<OrgUnit, ProviderError> {
        if ou_id == "ou-root" {
            Ok(OrgUnit {
                id: "ou-root".into(),
                name: "Root".into(),
                handle: "root".into(),
            })
        } else {
            Err(ProviderError::UserNotFound)
        }
    }
}

pub struct DemoUserTypes;

#[async_trait]
impl UserTypeService for DemoUserTypes {
    async fn get_by_name(&self, name: &str) -> Result<UserTypeRecord, ProviderError> {
        self.list()
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ProviderError::Client(format!("unknown user type '{name}'")))
    }

    async fn list(&self) -> Result<Vec<UserTypeRecord>, ProviderError> {
        Ok(vec![UserTypeRecord {
            name: "customer".into(),
            ou_id: Some("ou-root".into()),
            allow_self_registration: true,
        }])
    }
}

/// Group/role assignment sink that records nothing but succeeds.
pub struct DemoAssignments;

#[async_trait]
impl GroupService for DemoAssignments {
    async fn assign(&self, user_id: &str, group: &str) -> Result<(), ProviderError> {
        info!(user_id = %user_id, group = %group, "Group assigned");
        Ok(())
    }
}

#[async_trait]
impl RoleService for DemoAssignments {
    async fn assign(&self, user_id: &str, role: &str) -> Result<(), ProviderError> {
        info!(user_id = %user_id, role = %role, "Role assigned");
        Ok(())
    }
}

/// Single demo application.
pub struct DemoApplications;

#[async_trait]
impl ApplicationProvider for DemoApplications {
    async fn get_application(&self, app_id: &str) -> Result<Application, ProviderError> {
        Ok(Application {
            id: app_id.to_string(),
            allowed_user_types: vec!["customer".into()],
            registration_enabled: true,
            ..Application::default()
        })
    }
}

/// Static metadata provider backing `/flow/meta`.
pub struct DemoMetadata;

#[async_trait]
impl FlowMetadataProvider for DemoMetadata {
    async fn application_info(
        &self,
        app_id: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        Ok(json!({ "id": app_id, "name": "Thunder Demo" }))
    }

    async fn org_unit_info(&self, ou_id: &str) -> Result<serde_json::Value, ProviderError> {
        if ou_id == "ou-root" {
            Ok(json!({ "id": "ou-root", "name": "Root", "handle": "root" }))
        } else {
            Err(ProviderError::UserNotFound)
        }
    }

    async fn design(
        &self,
        _target: MetaTargetType,
        _id: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn translations(
        &self,
        _language: &str,
        _namespace: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn languages(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["en".into()])
    }
}
