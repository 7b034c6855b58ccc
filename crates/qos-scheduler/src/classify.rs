//! Failure classification from CLI error text.

use qos_core::FailureKind;
use regex::Regex;
use std::sync::OnceLock;

struct FailurePatterns {
    rate_limit: Regex,
    timeout: Regex,
    auth: Regex,
}

fn build_failure_patterns() -> Option<FailurePatterns> {
    Some(FailurePatterns {
        rate_limit: Regex::new(
            r#"(?ix)
                rate[\s_-]?limit
                | \b429\b
                | too\s+many\s+requests
                | quota
                | resource[\s_]exhausted
            "#,
        )
        .ok()?,
        timeout: Regex::new(
            r#"(?ix)
                time[\s_-]?out
                | timed\s+out
                | etimedout
                | econnreset
                | connection\s+reset
                | deadline
            "#,
        )
        .ok()?,
        auth: Regex::new(
            r#"(?ix)
                unauthori[sz]ed
                | forbidden
                | \b40[13]\b
                | credential
                | \bauth(?:entication|orization)?\b
                | \blog\s?in\b
                | permission\s+denied
            "#,
        )
        .ok()?,
    })
}

fn failure_patterns() -> Option<&'static FailurePatterns> {
    static PATTERNS: OnceLock<Option<FailurePatterns>> = OnceLock::new();
    PATTERNS.get_or_init(build_failure_patterns).as_ref()
}

/// Map an error message to a [`FailureKind`].
///
/// Categories are checked in order rate limit, timeout, auth; the first
/// match wins. Status codes only match as whole words, so identifiers that
/// merely contain `429` or `403` stay unclassified.
pub fn classify(error_text: &str) -> FailureKind {
    let Some(patterns) = failure_patterns() else {
        return FailureKind::Default;
    };
    if patterns.rate_limit.is_match(error_text) {
        FailureKind::RateLimit
    } else if patterns.timeout.is_match(error_text) {
        FailureKind::Timeout
    } else if patterns.auth.is_match(error_text) {
        FailureKind::Auth
    } else {
        FailureKind::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_requests_is_rate_limit() {
        assert_eq!(classify("429 Too Many Requests"), FailureKind::RateLimit);
    }

    #[test]
    fn test_codex_rate_limit_exceeded() {
        assert_eq!(
            classify("Error: rate_limit_exceeded - slow down"),
            FailureKind::RateLimit
        );
        assert_eq!(classify("Rate limit reached"), FailureKind::RateLimit);
    }

    #[test]
    fn test_gemini_quota_exhausted() {
        assert_eq!(
            classify("google.api.error: RESOURCE_EXHAUSTED"),
            FailureKind::RateLimit
        );
        assert_eq!(
            classify("quota exceeded for model gemini-2.5-pro"),
            FailureKind::RateLimit
        );
    }

    #[test]
    fn test_etimedout_is_timeout() {
        assert_eq!(classify("ETIMEDOUT"), FailureKind::Timeout);
        assert_eq!(classify("request timed out after 30s"), FailureKind::Timeout);
        assert_eq!(classify("read ECONNRESET"), FailureKind::Timeout);
        assert_eq!(classify("504 Gateway Timeout"), FailureKind::Timeout);
        assert_eq!(classify("deadline exceeded"), FailureKind::Timeout);
    }

    #[test]
    fn test_forbidden_is_auth() {
        assert_eq!(classify("403 Forbidden"), FailureKind::Auth);
        assert_eq!(classify("HTTP 401"), FailureKind::Auth);
        assert_eq!(classify("Unauthorized: bad token"), FailureKind::Auth);
        assert_eq!(classify("Please login again"), FailureKind::Auth);
        assert_eq!(classify("invalid credentials"), FailureKind::Auth);
    }

    #[test]
    fn test_rate_limit_wins_over_timeout() {
        assert_eq!(
            classify("timeout while waiting: 429 too many requests"),
            FailureKind::RateLimit
        );
    }

    #[test]
    fn test_timeout_wins_over_auth() {
        assert_eq!(classify("auth server timed out"), FailureKind::Timeout);
    }

    #[test]
    fn test_incidental_status_digits_do_not_match() {
        assert_eq!(classify("job id 74291 failed"), FailureKind::Default);
        assert_eq!(classify("trace_4030 exited 1"), FailureKind::Default);
        assert_eq!(classify("see author notes"), FailureKind::Default);
    }

    #[test]
    fn test_unclassified_and_empty() {
        assert_eq!(classify("Syntax error in prompt"), FailureKind::Default);
        assert_eq!(classify(""), FailureKind::Default);
    }
}
