use std::sync::LazyLock;

use regex::RegexSet;

/// Coarse, fixed signatures for the stage-5 suspicious-content scan
///: SQL injection, XSS, path traversal, and known scanner
/// user-agents. This is a heuristic tripwire that feeds the attacker
/// tracker, not a WAF — it never blocks on its own.
static PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
        RegexSet::new([
                r"(?i)(\bunion\b.{1,20}\bselect\b|\bor\b\s+1\s*=\s*1|;\s*drop\s+table|--\s*$)",
                r"(?i)(<script\b|javascript:|onerror\s*=|onload\s*=)",
                r"(\.\./|\.\.\\|%2e%2e%2f)",
                r"(?i)(sqlmap|nikto|nessus|acunetix|nmap scripting engine|masscan)",
        ])
        .expect("suspicious-content pattern set is a fixed, valid regex set")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackKind {
    SqlInjection,
    Xss,
    PathTraversal,
    ScannerUserAgent,
}

const KINDS: [AttackKind; 4] =
[AttackKind::SqlInjection, AttackKind::Xss, AttackKind::PathTraversal, AttackKind::ScannerUserAgent];

/// Scans `text` (path, query string, body, or a header value) against the
/// fixed pattern set and returns every attack kind that matched.
pub fn scan(text: &str) -> Vec<AttackKind> {
    PATTERNS.matches(text).into_iter().map(|idx| KINDS[idx]).collect()
}

pub fn is_suspicious(text: &str) -> bool {
    PATTERNS.is_match(text)
}
