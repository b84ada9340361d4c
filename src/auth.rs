//! Identity tokens: HS256 JWTs signed with `JWT_SECRET`, the same tokens the
//! portal's login flow hands out. The messaging side only needs `verify`;
//! `issue` is kept for tooling and tests.

use chrono::{ DateTime, Duration, Utc };
use jsonwebtoken::{ decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation };
use log::debug;
use serde::{ Deserialize, Serialize };
use crate::error::ChatError;
use crate::models::employee::{ EmployeeId, Role };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub employee_id: EmployeeId,
    pub role: Role,
    pub exp: i64,
}

/// Authenticated caller as seen by the messaging service.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub employee_id: EmployeeId,
    pub role: Role,
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against the caller's clock in `verify`
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, employee_id: &str, role: Role, now: DateTime<Utc>) -> Result<String, ChatError> {
        let claims = Claims {
            employee_id: employee_id.to_string(),
            role,
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e|
            ChatError::Transient(format!("failed to sign token: {}", e))
        )
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, ChatError> {
        let claims = decode::<Claims>(token.trim(), &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                ChatError::Unauthorized("Invalid auth token".to_string())
            })?
            .claims;

        if claims.exp < now.timestamp() {
            return Err(ChatError::Unauthorized("Auth token expired".to_string()));
        }
        if claims.employee_id.trim().is_empty() {
            return Err(ChatError::Unauthorized("Employee context missing".to_string()));
        }
        Ok(Identity { employee_id: claims.employee_id, role: claims.role })
    }

    /// Pulls the token out of an `Authorization: Bearer ...` header value.
    pub fn bearer(header: Option<&str>) -> Result<&str, ChatError> {
        header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ChatError::Unauthorized("No auth token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret", Duration::hours(1))
    }

    fn sign_raw(secret: &str, claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn issued_token_verifies() {
        let now = Utc::now();
        let token = signer().issue("e1", Role::Employee, now).unwrap();
        let identity = signer().verify(&token, now).unwrap();
        assert_eq!(identity.employee_id, "e1");
        assert_eq!(identity.role, Role::Employee);
    }

    #[test]
    fn portal_issued_jwt_is_accepted() {
        let now = Utc::now();
        let token = sign_raw(
            "dev_secret",
            json!({ "employeeId": "e1", "role": "employee", "exp": now.timestamp() + 3600, "iat": now.timestamp() })
        );
        let identity = TokenSigner::new("dev_secret", Duration::hours(1)).verify(&token, now).unwrap();
        assert_eq!(identity.employee_id, "e1");
        assert_eq!(identity.role, Role::Employee);
    }

    #[test]
    fn role_string_from_portal_is_parsed() {
        let now = Utc::now();
        let token = sign_raw(
            "test-secret",
            json!({ "employeeId": "p1", "role": "project managers", "exp": now.timestamp() + 60 })
        );
        assert_eq!(signer().verify(&token, now).unwrap().role, Role::ProjectManager);
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let now = Utc::now();
        let token = signer().issue("e1", Role::Employee, now).unwrap();

        let forged = sign_raw(
            "other-secret",
            json!({ "employeeId": "d1", "role": "director", "exp": now.timestamp() + 60 })
        );
        assert!(signer().verify(&forged, now).is_err());
        assert!(signer().verify(&format!("{}x", token), now).is_err());
        assert!(signer().verify("garbage", now).is_err());

        let other = TokenSigner::new("other-secret", Duration::hours(1));
        assert!(matches!(other.verify(&token, now), Err(ChatError::Unauthorized(_))));
    }

    #[test]
    fn token_without_exp_is_rejected() {
        let token = sign_raw("test-secret", json!({ "employeeId": "e1", "role": "employee" }));
        assert!(signer().verify(&token, Utc::now()).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued = Utc::now() - Duration::hours(2);
        let token = signer().issue("e1", Role::Employee, issued).unwrap();
        let err = signer().verify(&token, Utc::now()).unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[test]
    fn empty_employee_id_is_rejected() {
        let now = Utc::now();
        let token = signer().issue("", Role::Employee, now).unwrap();
        assert!(signer().verify(&token, now).is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(TokenSigner::bearer(Some("Bearer abc")).unwrap(), "abc");
        assert!(TokenSigner::bearer(Some("Basic abc")).is_err());
        assert!(TokenSigner::bearer(Some("Bearer ")).is_err());
        assert!(TokenSigner::bearer(None).is_err());
    }
}
