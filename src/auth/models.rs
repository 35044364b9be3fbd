//! Token claims and the authenticated principal

use serde::{Deserialize, Serialize};

/// Claims read from a validated bearer token.
///
/// Registered claims (`iss`, `aud`, `exp`, `nbf`) are checked by the
/// validator and are not needed after that point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleClaim>,
    /// Keycloak realm roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,
}

/// `role` appears either as a single string or as an array depending on the issuer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleClaim {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Collect roles from every claim shape, without duplicates
    pub fn all_roles(&self) -> Vec<String> {
        let single = match &self.role {
            Some(RoleClaim::One(role)) => vec![role.clone()],
            Some(RoleClaim::Many(roles)) => roles.clone(),
            None => Vec::new(),
        };
        let realm = self
            .realm_access
            .as_ref()
            .map(|access| access.roles.clone())
            .unwrap_or_default();

        let mut roles: Vec<String> = Vec::new();
        for role in self.roles.iter().cloned().chain(single).chain(realm) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        roles
    }

    pub fn into_principal(self) -> Principal {
        let roles = self.all_roles();
        Principal {
            subject: self.sub,
            roles,
        }
    }
}

/// Authenticated caller attached to the request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
