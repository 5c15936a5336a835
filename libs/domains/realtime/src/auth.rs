//! Connection authorization seam

use crate::error::HubError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Identity attached to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new<I, T>(subject: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
            roles: Vec::new(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Decides who may open a real-time connection.
#[async_trait]
pub trait ConnectionAuthorizer: Send + Sync {
    async fn authorize(&self, token: Option<&str>) -> Result<Principal, HubError>;
}

/// Accepts every connection
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnonymous;

#[async_trait]
impl ConnectionAuthorizer for AllowAnonymous {
    async fn authorize(&self, _token: Option<&str>) -> Result<Principal, HubError> {
        Ok(Principal::anonymous())
    }
}

/// Fixed token table.
///
/// Parsed from `token=subject[:role,role];token=subject`.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthorizer {
    tokens: HashMap<String, Principal>,
    required_role: Option<String>,
}

impl StaticTokenAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    /// Reject principals that lack `role`
    pub fn with_required_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    pub fn parse(table: &str) -> Result<Self, HubError> {
        let mut authorizer = Self::new();
        for entry in table.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, identity) = entry
                .split_once('=')
                .ok_or_else(|| HubError::InvalidMessage(format!("token entry without '=': {entry}")))?;
            let (subject, roles): (&str, Vec<&str>) = match identity.split_once(':') {
                Some((subject, roles)) => (
                    subject,
                    roles.split(',').map(str::trim).filter(|r| !r.is_empty()).collect(),
                ),
                None => (identity, Vec::new()),
            };
            if token.trim().is_empty() || subject.trim().is_empty() {
                return Err(HubError::InvalidMessage(format!("incomplete token entry: {entry}")));
            }
            authorizer = authorizer.with_token(token.trim(), Principal::new(subject.trim(), roles));
        }
        Ok(authorizer)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl ConnectionAuthorizer for StaticTokenAuthorizer {
    async fn authorize(&self, token: Option<&str>) -> Result<Principal, HubError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| HubError::Unauthorized("access token required".to_string()))?;
        let principal = self
            .tokens
            .get(token)
            .ok_or_else(|| HubError::Unauthorized("unknown access token".to_string()))?;

        if let Some(role) = &self.required_role {
            if !principal.has_role(role) {
                return Err(HubError::Unauthorized(format!("role '{role}' required")));
            }
        }
        Ok(principal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_tokens() {
        let authorizer = StaticTokenAuthorizer::parse("abc=ops:Operator, Viewer; def=harbour").unwrap();
        assert_eq!(authorizer.len(), 2);

        let principal = authorizer.authorize(Some("abc")).await.unwrap();
        assert_eq!(principal.subject, "ops");
        assert!(principal.has_role("operator"));

        assert!(authorizer.authorize(Some("def")).await.unwrap().roles.is_empty());
        assert!(matches!(authorizer.authorize(None).await, Err(HubError::Unauthorized(_))));
        assert!(matches!(authorizer.authorize(Some("zzz")).await, Err(HubError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_required_role() {
        let authorizer = StaticTokenAuthorizer::parse("abc=ops:Operator;def=guest")
            .unwrap()
            .with_required_role("operator");

        assert!(authorizer.authorize(Some("abc")).await.is_ok());
        assert!(authorizer.authorize(Some("def")).await.is_err());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(StaticTokenAuthorizer::parse("abc").is_err());
        assert!(StaticTokenAuthorizer::parse("=ops").is_err());
        assert!(StaticTokenAuthorizer::parse("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_allow_anonymous() {
        let principal = AllowAnonymous.authorize(None).await.unwrap();
        assert_eq!(principal, Principal::anonymous());
    }
}
