//! Path matching and rewriting.
//!
//! # Responsibilities
//! - Match path prefix (literal, case-sensitive)
//! - Strip a rewrite token from the outbound path
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching
//! - A missing rewrite token is not an error; the path passes through

/// Matches the request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefix {
    prefix: String,
}

impl PathPrefix {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }
}

/// Removes the first occurrence of a token from a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRewrite {
    token: String,
}

impl PathRewrite {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Rewrite `path`. The result is never empty: a fully stripped path
    /// becomes `/`.
    pub fn apply(&self, path: &str) -> String {
        if self.token.is_empty() {
            return path.to_string();
        }
        let rewritten = path.replacen(&self.token, "", 1);
        if rewritten.is_empty() {
            "/".to_string()
        } else {
            rewritten
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_prefix() {
        let matcher = PathPrefix::new("/api");
        assert!(matcher.matches("/api/v1"));
        assert!(matcher.matches("/api"));
        assert!(matcher.matches("/apiary"));
        assert!(!matcher.matches("/images"));
        assert!(!matcher.matches("/API"));
    }

    #[test]
    fn rewrite_strips_token() {
        let rewrite = PathRewrite::new("/~!frp");
        assert_eq!(rewrite.apply("/~!frp/status"), "/status");
    }

    #[test]
    fn rewrite_without_token_is_unchanged() {
        let rewrite = PathRewrite::new("/~!frp");
        assert_eq!(rewrite.apply("/status"), "/status");
    }

    #[test]
    fn rewrite_only_first_occurrence() {
        let rewrite = PathRewrite::new("/~!frp");
        assert_eq!(rewrite.apply("/~!frp/~!frp/x"), "/~!frp/x");
    }

    #[test]
    fn rewrite_of_bare_prefix_is_root() {
        let rewrite = PathRewrite::new("/~!frp");
        assert_eq!(rewrite.apply("/~!frp"), "/");
    }

    #[test]
    fn empty_rewrite_is_identity() {
        let rewrite = PathRewrite::default();
        assert_eq!(rewrite.apply("/a/b"), "/a/b");
    }
}
