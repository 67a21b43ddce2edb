use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// PolicyRule record — associates a policy with an HTTP route via an
/// Ant-style pattern. Matches the `policy_rules` table in PostgreSQL.
///
/// `http_methods` is a comma-separated uppercase list ("GET,POST"); NULL or
/// empty means the rule matches any method. `priority` is 0..=1000, higher
/// wins; ties break by `created_at` ascending (insertion order).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PolicyRule {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub name: String,
    pub resource_pattern: String,
    pub http_methods: Option<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl PolicyRule {
    /// True when this rule applies to `method` — an absent/empty method list
    /// matches everything.
    pub fn matches_method(&self, method: &str) -> bool {
        match self.http_methods.as_deref() {
            None | Some("") => true,
            Some(list) => {
                let wanted = method.trim().to_uppercase();
                list.split(',').any(|m| m.trim().eq_ignore_ascii_case(&wanted))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(methods: Option<&str>) -> PolicyRule {
        PolicyRule {
            id: Uuid::new_v4(),
            policy_id: Uuid::new_v4(),
            name: "r".into(),
            resource_pattern: "/api/**".into(),
            http_methods: methods.map(str::to_string),
            priority: 0,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_method_list_matches_any() {
        assert!(rule(None).matches_method("GET"));
        assert!(rule(Some("")).matches_method("DELETE"));
    }

    #[test]
    fn method_list_is_case_insensitive() {
        let r = rule(Some("GET, post"));
        assert!(r.matches_method("get"));
        assert!(r.matches_method("POST"));
        assert!(!r.matches_method("PUT"));
    }
}
