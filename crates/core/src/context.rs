//! Request-scoped execution context.

use std::collections::HashMap;

use serde_json::Value;

/// Caller identity and custom tokens for one request or session.
///
/// Built by the caller before execution; the executor only reads it.
/// Token names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    /// Caller id, bound by `@@userid@@`
    pub user_id: i64,
    /// Caller display name, bound by `@@username@@`
    pub user_name: String,
    tokens: HashMap<String, (String, Value)>,
}

impl ExecutionContext {
    /// Context for the given caller with no custom tokens.
    pub fn new(user_id: i64, user_name: impl Into<String>) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            tokens: HashMap::new(),
        }
    }

    /// Builder-style token insert.
    pub fn with_token(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_token(name, value);
        self
    }

    /// Set or replace a custom token.
    pub fn set_token(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.tokens.insert(name.to_lowercase(), (name, value));
    }

    /// Case-insensitive token lookup.
    pub fn token(&self, name: &str) -> Option<&Value> {
        self.tokens.get(&name.to_lowercase()).map(|(_, v)| v)
    }

    /// Token names as originally spelled, sorted.
    pub fn token_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tokens.values().map(|(k, _)| k.clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tokens_are_case_insensitive() {
        let ctx = ExecutionContext::new(5, "ana").with_token("TenantId", json!(12));
        assert_eq!(ctx.token("tenantid"), Some(&json!(12)));
        assert_eq!(ctx.token("missing"), None);
        assert_eq!(ctx.token_names(), vec!["TenantId".to_string()]);
    }
}
