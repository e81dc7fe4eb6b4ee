use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use thunder_core::provider::{TokenError, TokenIssuer};
use uuid::Uuid;

/// HMAC-signed JWT issuer for flow assertions.
pub struct JwtIssuer {
    encoding_key: EncodingKey,
}

impl JwtIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
        }
    }
}

#[async_trait]
impl TokenIssuer for JwtIssuer {
    async fn issue(
        &self,
        user_id: &str,
        app_id: &str,
        issuer: &str,
        validity_secs: u64,
        claims: HashMap<String, serde_json::Value>,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let mut payload = serde_json::Map::new();
        for (key, value) in claims {
            payload.insert(key, value);
        }
        // Registered claims always win over resolved ones
        payload.insert("sub".into(), serde_json::json!(user_id));
        payload.insert("aud".into(), serde_json::json!(app_id));
        payload.insert("iss".into(), serde_json::json!(issuer));
        payload.insert("iat".into(), serde_json::json!(now));
        payload.insert("exp".into(), serde_json::json!(now + validity_secs as i64));
        payload.insert("jti".into(), serde_json::json!(Uuid::now_v7().to_string()));

        let header = Header::new(Algorithm::HS256);
        encode(&header, &serde_json::Value::Object(payload), &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[tokio::test]
    async fn issued_token_carries_subject_issuer_and_claims() {
        let issuer = JwtIssuer::new(b"test-secret");
        let claims = HashMap::from([(
            "amr".to_string(),
            serde_json::json!(["BasicAuthExecutor"]),
        )]);
        let token = issuer
            .issue("user-alice", "app-1", "thunder", 3600, claims)
            .await
            .unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["app-1"]);
        validation.set_issuer(&["thunder"]);
        let decoded = decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims["sub"], "user-alice");
        assert_eq!(decoded.claims["amr"][0], "BasicAuthExecutor");
        assert!(decoded.claims["jti"].is_string());
    }
}
