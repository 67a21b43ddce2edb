use std::collections::HashMap;

use crate::models::PolicyRule;

/// Ant-style URL pattern matching.
///
/// - `*` matches any single path segment (never crosses `/`)
/// - `**` matches zero or more segments
/// - `{name}` captures a single segment into the variable map
/// - other segments match literally, case-sensitive
/// - a segment may mix literals with `*` (`/api/v*/users`)
///
/// Patterns must start with `/`, contain no empty segments (`//`), and keep
/// braces balanced with `{name}` occupying a whole segment.
pub struct PathMatcher;

impl PathMatcher {
    /// Validate a pattern at rule-creation time so bad patterns are rejected
    /// with a 400 instead of silently never matching.
    pub fn validate(pattern: &str) -> Result<(), String> {
        if !pattern.starts_with('/') {
            return Err("pattern must start with '/'".to_string());
        }
        if pattern.len() > 1 && pattern.contains("//") {
            return Err("pattern must not contain empty segments".to_string());
        }
        for segment in split_segments(pattern) {
            let opens = segment.matches('{').count();
            let closes = segment.matches('}').count();
            if opens != closes {
                return Err(format!("unbalanced braces in segment '{}'", segment));
            }
            if opens > 1 {
                return Err(format!("multiple captures in segment '{}'", segment));
            }
            if opens == 1 && !(segment.starts_with('{') && segment.ends_with('}')) {
                return Err(format!(
                    "capture must occupy the whole segment: '{}'",
                    segment
                ));
            }
            if opens == 1 && segment.len() == 2 {
                return Err("capture variable name must not be empty".to_string());
            }
            if segment.contains("**") && segment != "**" {
                return Err(format!(
                    "'**' must be a whole segment, found '{}'",
                    segment
                ));
            }
        }
        Ok(())
    }

    /// True when `pattern` matches `path`.
    pub fn matches(pattern: &str, path: &str) -> bool {
        let pat: Vec<&str> = split_segments(pattern).collect();
        let segs: Vec<&str> = split_segments(path).collect();
        let mut vars = HashMap::new();
        match_from(&pat, &segs, &mut vars)
    }

    /// Match and extract `{name}` captures. Returns an empty map when the
    /// path does not match.
    pub fn extract_variables(pattern: &str, path: &str) -> HashMap<String, String> {
        let pat: Vec<&str> = split_segments(pattern).collect();
        let segs: Vec<&str> = split_segments(path).collect();
        let mut vars = HashMap::new();
        if match_from(&pat, &segs, &mut vars) {
            vars
        } else {
            HashMap::new()
        }
    }

    /// Pick the rule that governs `path` + `method` from a slice already in
    /// resolution order (priority desc, created_at asc): the first enabled
    /// rule whose pattern matches the path and whose method list admits the
    /// method wins.
    pub fn select_rule<'a>(
        rules: &'a [PolicyRule],
        path: &str,
        method: Option<&str>,
    ) -> Option<&'a PolicyRule> {
        rules.iter().find(|rule| {
            rule.enabled
                && method.is_none_or(|m| rule.matches_method(m))
                && Self::matches(&rule.resource_pattern, path)
        })
    }

    /// Resolution order: priority desc, ties broken by creation time asc.
    pub fn sort_rules(rules: &mut [PolicyRule]) {
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
    }
}

fn split_segments(s: &str) -> impl Iterator<Item = &str> {
    s.trim_end_matches('/').split('/').skip(1)
}

fn match_from<'p>(
    pat: &[&'p str],
    path: &[&'p str],
    vars: &mut HashMap<String, String>,
) -> bool {
    match pat.first() {
        None => path.is_empty(),
        Some(&"**") => {
            // Zero or more segments: try every suffix, shortest first.
            for skip in 0..=path.len() {
                if match_from(&pat[1..], &path[skip..], vars) {
                    return true;
                }
            }
            false
        }
        Some(&seg) => {
            let Some(&head) = path.first() else {
                return false;
            };
            if seg.starts_with('{') && seg.ends_with('}') {
                let name = &seg[1..seg.len() - 1];
                vars.insert(name.to_string(), head.to_string());
                if match_from(&pat[1..], &path[1..], vars) {
                    return true;
                }
                vars.remove(name);
                false
            } else if segment_matches(seg, head) {
                match_from(&pat[1..], &path[1..], vars)
            } else {
                false
            }
        }
    }
}

/// Glob match within one segment: `*` matches any run of characters (never
/// `/`, since segments are already split). Literals are case-sensitive.
fn segment_matches(pattern: &str, segment: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == segment;
    }

    let pat: Vec<char> = pattern.chars().collect();
    let seg: Vec<char> = segment.chars().collect();

    // Two-pointer star matching with a single backtrack point.
    let (mut p, mut s) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while s < seg.len() {
        if p < pat.len() && pat[p] == '*' {
            star = Some((p, s));
            p += 1;
        } else if p < pat.len() && pat[p] == seg[s] {
            p += 1;
            s += 1;
        } else if let Some((sp, ss)) = star {
            p = sp + 1;
            s = ss + 1;
            star = Some((sp, ss + 1));
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn literal_segments_match_case_sensitively() {
        assert!(PathMatcher::matches("/api/users", "/api/users"));
        assert!(!PathMatcher::matches("/api/users", "/api/Users"));
        assert!(!PathMatcher::matches("/api/users", "/api/users/1"));
    }

    #[test]
    fn single_star_matches_one_segment() {
        assert!(PathMatcher::matches("/api/*/profile", "/api/alice/profile"));
        assert!(!PathMatcher::matches("/api/*/profile", "/api/profile"));
        assert!(!PathMatcher::matches("/api/*", "/api/a/b"));
    }

    #[test]
    fn double_star_matches_zero_or_more_segments() {
        assert!(PathMatcher::matches("/api/**", "/api"));
        assert!(PathMatcher::matches("/api/**", "/api/users"));
        assert!(PathMatcher::matches("/api/**", "/api/users/1/orders"));
        assert!(PathMatcher::matches("/api/**/orders", "/api/users/1/orders"));
        assert!(PathMatcher::matches("/**", "/anything/at/all"));
        assert!(!PathMatcher::matches("/api/**/orders", "/api/users/1"));
    }

    #[test]
    fn in_segment_wildcards() {
        assert!(PathMatcher::matches("/api/v*/users", "/api/v1/users"));
        assert!(PathMatcher::matches("/api/v*/users", "/api/v22/users"));
        assert!(PathMatcher::matches("/files/*.json", "/files/report.json"));
        assert!(!PathMatcher::matches("/files/*.json", "/files/report.xml"));
        assert!(!PathMatcher::matches("/api/v*/users", "/api/beta/users"));
    }

    #[test]
    fn variable_extraction_round_trip() {
        let vars =
            PathMatcher::extract_variables("/tenants/{tenant}/users/{user}", "/tenants/t1/users/42");
        assert_eq!(vars.get("tenant").map(String::as_str), Some("t1"));
        assert_eq!(vars.get("user").map(String::as_str), Some("42"));
    }

    #[test]
    fn non_matching_path_yields_empty_map() {
        let vars = PathMatcher::extract_variables("/tenants/{tenant}", "/users/42");
        assert!(vars.is_empty());
    }

    #[test]
    fn variables_combine_with_double_star() {
        let vars = PathMatcher::extract_variables("/api/{version}/**", "/api/v2/users/7");
        assert_eq!(vars.get("version").map(String::as_str), Some("v2"));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        assert!(PathMatcher::matches("/api/users", "/api/users/"));
        assert!(PathMatcher::matches("/api/users/", "/api/users"));
    }

    #[test]
    fn pattern_validation() {
        assert!(PathMatcher::validate("/api/**").is_ok());
        assert!(PathMatcher::validate("/api/{id}/detail").is_ok());
        assert!(PathMatcher::validate("/api/v*/users").is_ok());

        assert!(PathMatcher::validate("api/users").is_err());
        assert!(PathMatcher::validate("/api//users").is_err());
        assert!(PathMatcher::validate("/api/{id/detail").is_err());
        assert!(PathMatcher::validate("/api/{}").is_err());
        assert!(PathMatcher::validate("/api/x**").is_err());
        assert!(PathMatcher::validate("/api/{a}{b}").is_err());
    }

    fn rule(pattern: &str, priority: i32, offset_secs: i64, methods: Option<&str>) -> PolicyRule {
        PolicyRule {
            id: Uuid::new_v4(),
            policy_id: Uuid::new_v4(),
            name: format!("{}@{}", pattern, priority),
            resource_pattern: pattern.to_string(),
            http_methods: methods.map(str::to_string),
            priority,
            enabled: true,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn higher_priority_rule_wins() {
        let mut rules = vec![
            rule("/api/**", 5, 0, None),
            rule("/api/users/**", 20, 0, None),
        ];
        PathMatcher::sort_rules(&mut rules);

        let selected = PathMatcher::select_rule(&rules, "/api/users/123", None).unwrap();
        assert_eq!(selected.resource_pattern, "/api/users/**");
    }

    #[test]
    fn priority_ties_break_by_insertion_order() {
        let first = rule("/api/**", 10, 0, None);
        let second = rule("/api/*", 10, 5, None);
        let first_id = first.id;

        let mut rules = vec![second, first];
        PathMatcher::sort_rules(&mut rules);

        let selected = PathMatcher::select_rule(&rules, "/api/users", None).unwrap();
        assert_eq!(selected.id, first_id);
    }

    #[test]
    fn method_filter_applies() {
        let mut rules = vec![
            rule("/api/**", 20, 0, Some("POST")),
            rule("/api/**", 5, 0, None),
        ];
        PathMatcher::sort_rules(&mut rules);

        let get = PathMatcher::select_rule(&rules, "/api/users", Some("GET")).unwrap();
        assert_eq!(get.priority, 5);

        let post = PathMatcher::select_rule(&rules, "/api/users", Some("POST")).unwrap();
        assert_eq!(post.priority, 20);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let enabled = rule("/api/**", 5, 0, None);
        let mut disabled = rule("/api/**", 50, 0, None);
        disabled.enabled = false;
        let enabled_id = enabled.id;

        let mut rules = vec![disabled, enabled];
        PathMatcher::sort_rules(&mut rules);

        let selected = PathMatcher::select_rule(&rules, "/api/users", None).unwrap();
        assert_eq!(selected.id, enabled_id);
    }
}
