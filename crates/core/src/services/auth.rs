//! Admin identity verification.
//!
//! Tokens are issued elsewhere; this module only checks them. Every
//! privileged handler goes through [`verify_admin`], which prefers the
//! identity cached on the connection and otherwise verifies the token sent
//! with the event. A token verified that way is not remembered.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use livepoll_common::config::AuthConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `role` claim that marks an admin token.
pub const ADMIN_ROLE: &str = "admin";

/// Tokens larger than this are rejected before parsing.
const MAX_TOKEN_BYTES: usize = 8192;

/// Claims carried by an admin token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Admin id; becomes `createdBy` on polls the admin creates.
    pub sub: String,
    pub role: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A verified admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminIdentity {
    pub id: String,
    pub name: Option<String>,
}

/// Checks admin tokens. `None` means "not an admin", for any reason.
pub trait AdminVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<AdminIdentity>;
}

/// HS256 admin token verifier.
pub struct JwtAdminVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAdminVerifier {
    #[must_use]
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = issuer {
            // jsonwebtoken only compares `iss` when the token carries one.
            validation.set_required_spec_claims(&["exp", "sub", "iss"]);
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, config.issuer.as_deref())
    }
}

impl AdminVerifier for JwtAdminVerifier {
    fn verify(&self, token: &str) -> Option<AdminIdentity> {
        let token = token.trim();
        if token.is_empty() || token.len() > MAX_TOKEN_BYTES {
            return None;
        }

        let claims = match decode::<AdminClaims>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "Admin token rejected");
                return None;
            }
        };

        if claims.role != ADMIN_ROLE {
            debug!(sub = %claims.sub, role = %claims.role, "Token lacks admin role");
            return None;
        }

        Some(AdminIdentity {
            id: claims.sub,
            name: claims.name,
        })
    }
}

/// Resolve the admin identity for one privileged action.
///
/// The connection's cached identity wins; otherwise `token` is verified on
/// its own.
#[must_use]
pub fn verify_admin(
    verifier: &dyn AdminVerifier,
    cached: Option<&AdminIdentity>,
    token: Option<&str>,
) -> Option<AdminIdentity> {
    if let Some(identity) = cached {
        return Some(identity.clone());
    }
    token.and_then(|t| verifier.verify(t))
}
