//! Tamper-evident author attribution (§4.2).
//!
//! Every commit, lock acquisition, and audit event records an author
//! string rather than a bare user id, so that the identity embedded in
//! historical data survives independent of whatever auth store issued
//! the original JWT. The format is fixed and must round-trip through
//! [`parse`]:
//!
//! ```text
//! username (user_id) [verified|service][|ts:<rfc3339>|hash:<hex8>|roles:<csv>|tenant:<id>]
//! ```
//!
//! A delegated action appends a further `[delegated|on_behalf_of:<id>|reason:<text>]`
//! segment. Grounded on the original's
//! `core/auth_utils/secure_author_provider.py`.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// A formatted, tamper-evident author string. Opaque to callers beyond
/// `Display`/`as_str` — use [`parse`] to recover its components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorString(String);

impl AuthorString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<AuthorString> for String {
    fn from(value: AuthorString) -> Self {
        value.0
    }
}

/// The components recovered from parsing an [`AuthorString`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthor {
    pub username: String,
    pub user_id: String,
    pub is_service_account: bool,
    pub metadata: BTreeMap<String, String>,
    pub delegated_on_behalf_of: Option<String>,
    pub delegation_reason: Option<String>,
}

/// Why [`verify`] accepted or rejected an author string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyReason {
    Ok,
    Format,
    UserMismatch,
    HashMismatch,
    Stale,
}

/// Build a secure author string for `username`/`user_id`.
///
/// `secret` enables the HMAC metadata hash; without it (dev mode, or no
/// `JWT_SECRET` configured) the string still carries a timestamp but no
/// `hash:` segment, matching the original's behavior when no JWT secret
/// is configured.
#[allow(clippy::too_many_arguments)]
pub fn secure_author(
    username: &str,
    user_id: &str,
    roles: &[String],
    tenant: Option<&str>,
    is_service_account: bool,
    secret: Option<&str>,
) -> AuthorString {
    let mut out = format!("{username} ({user_id})");
    out.push_str(if is_service_account {
        " [service]"
    } else {
        " [verified]"
    });

    let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let mut parts = vec![format!("ts:{ts}")];

    if let Some(secret) = secret {
        let hash = author_hash(username, user_id, &ts, secret);
        parts.push(format!("hash:{}", &hash[..8]));
    }

    if !roles.is_empty() {
        let mut sorted_roles = roles.to_vec();
        sorted_roles.sort();
        sorted_roles.truncate(3);
        parts.push(format!("roles:{}", sorted_roles.join(",")));
    }

    if let Some(tenant) = tenant {
        parts.push(format!("tenant:{tenant}"));
    }

    out.push('|');
    out.push_str(&parts.join("|"));
    AuthorString(out)
}

/// Wrap `author` to record that the action was taken on behalf of
/// `on_behalf_of`, for `reason`. The delegator's identity is preserved
/// verbatim ahead of the delegation segment.
pub fn delegated_author(author: &AuthorString, on_behalf_of: &str, reason: &str) -> AuthorString {
    AuthorString(format!(
        "{} [delegated|on_behalf_of:{on_behalf_of}|reason:{reason}]",
        author.as_str()
    ))
}

/// Parse an [`AuthorString`] (or any string claiming to be one) back
/// into its components. Returns `None` if the fixed format doesn't
/// match at all — callers should treat that as an unverified author.
pub fn parse(author_string: &str) -> Option<ParsedAuthor> {
    let (head, metadata_str) = match author_string.split_once('|') {
        Some((h, m)) => (h, Some(m)),
        None => (author_string, None),
    };

    let open = head.rfind(" [")?;
    let close = head.rfind(']')?;
    if close < open {
        return None;
    }
    let tag = &head[open + 2..close];
    let is_service_account = match tag {
        "service" => true,
        "verified" => false,
        _ => return None,
    };

    let rest = head[..open].trim_end();
    let paren_open = rest.rfind('(')?;
    let paren_close = rest.rfind(')')?;
    if paren_close < paren_open {
        return None;
    }
    let username = rest[..paren_open].trim_end().to_string();
    let user_id = rest[paren_open + 1..paren_close].to_string();
    if username.is_empty() || user_id.is_empty() {
        return None;
    }

    let mut metadata = BTreeMap::new();
    let mut delegated_on_behalf_of = None;
    let mut delegation_reason = None;

    if let Some(metadata_str) = metadata_str {
        // A delegation segment is its own bracketed group at the tail:
        // "...|ts:...[delegated|on_behalf_of:x|reason:y]"
        let (plain_metadata, delegation) = match metadata_str.find("[delegated|") {
            Some(idx) => {
                let delegation_tag = &metadata_str[idx..];
                let delegation_body = delegation_tag
                    .strip_prefix("[delegated|")
                    .and_then(|s| s.strip_suffix(']'))
                    .unwrap_or("");
                (&metadata_str[..idx.saturating_sub(0)], Some(delegation_body))
            }
            None => (metadata_str, None),
        };

        let plain_metadata = plain_metadata.trim_end_matches('|');
        for part in plain_metadata.split('|') {
            if let Some((k, v)) = part.split_once(':') {
                metadata.insert(k.to_string(), v.to_string());
            }
        }

        if let Some(delegation_body) = delegation {
            for part in delegation_body.split('|') {
                if let Some((k, v)) = part.split_once(':') {
                    match k {
                        "on_behalf_of" => delegated_on_behalf_of = Some(v.to_string()),
                        "reason" => delegation_reason = Some(v.to_string()),
                        _ => {}
                    }
                }
            }
        }
    }

    Some(ParsedAuthor {
        username,
        user_id,
        is_service_account,
        metadata,
        delegated_on_behalf_of,
        delegation_reason,
    })
}

/// Verify an author string's integrity: structural validity, optional
/// match against a known `(username, user_id)`, optional HMAC hash
/// check against `secret`, and timestamp freshness (rejects anything
/// older than `max_age`).
pub fn verify(
    author_string: &str,
    expected: Option<(&str, &str)>,
    secret: Option<&str>,
    max_age: Duration,
) -> (bool, VerifyReason) {
    let parsed = match parse(author_string) {
        Some(p) => p,
        None => return (false, VerifyReason::Format),
    };

    if let Some((username, user_id)) = expected {
        if parsed.username != username || parsed.user_id != user_id {
            return (false, VerifyReason::UserMismatch);
        }
    }

    if let Some(ts) = parsed.metadata.get("ts") {
        match DateTime::parse_from_rfc3339(ts) {
            Ok(parsed_ts) => {
                let age = Utc::now().signed_duration_since(parsed_ts.with_timezone(&Utc));
                if age > max_age {
                    return (false, VerifyReason::Stale);
                }
            }
            Err(_) => return (false, VerifyReason::Format),
        }

        if let (Some(secret), Some(hash)) = (secret, parsed.metadata.get("hash")) {
            let expected_hash = author_hash(&parsed.username, &parsed.user_id, ts, secret);
            let matches: bool = expected_hash[..8]
                .as_bytes()
                .ct_eq(hash.as_bytes())
                .into();
            if !matches {
                return (false, VerifyReason::HashMismatch);
            }
        }
    }

    (true, VerifyReason::Ok)
}

/// The user an action should be attributed to: the delegate's target
/// if present, otherwise the primary author's own `user_id`.
pub fn effective_user(parsed: &ParsedAuthor) -> &str {
    parsed
        .delegated_on_behalf_of
        .as_deref()
        .unwrap_or(&parsed.user_id)
}

fn author_hash(username: &str, user_id: &str, ts: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(username.as_bytes());
    mac.update(b"|");
    mac.update(user_id.as_bytes());
    mac.update(b"|");
    mac.update(ts.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_verified_author_without_secret() {
        let author = secure_author("alice", "u-123", &[], None, false, None);
        let parsed = parse(author.as_str()).expect("parses");
        assert_eq!(parsed.username, "alice");
        assert_eq!(parsed.user_id, "u-123");
        assert!(!parsed.is_service_account);
        assert!(parsed.metadata.contains_key("ts"));
    }

    #[test]
    fn service_account_tag_round_trips() {
        let author = secure_author("ingest-bot", "svc-1", &[], None, true, None);
        let parsed = parse(author.as_str()).unwrap();
        assert!(parsed.is_service_account);
    }

    #[test]
    fn roles_are_sorted_and_capped_at_three() {
        let roles = vec!["viewer".to_string(), "admin".to_string(), "editor".to_string(), "reviewer".to_string()];
        let author = secure_author("alice", "u-123", &roles, None, false, None);
        let parsed = parse(author.as_str()).unwrap();
        assert_eq!(parsed.metadata.get("roles").unwrap(), "admin,editor,reviewer");
    }

    #[test]
    fn verify_detects_tampered_hash() {
        let author = secure_author("alice", "u-123", &[], None, false, Some("s3cr3t"));
        let tampered = author.as_str().replace(|c: char| c.is_ascii_hexdigit(), "0");
        let (ok, reason) = verify(&tampered, Some(("alice", "u-123")), Some("s3cr3t"), Duration::hours(24));
        assert!(!ok);
        assert_ne!(reason, VerifyReason::Ok);
    }

    #[test]
    fn verify_accepts_untampered_author_with_matching_secret() {
        let author = secure_author("alice", "u-123", &[], None, false, Some("s3cr3t"));
        let (ok, reason) = verify(author.as_str(), Some(("alice", "u-123")), Some("s3cr3t"), Duration::hours(24));
        assert!(ok);
        assert_eq!(reason, VerifyReason::Ok);
    }

    #[test]
    fn verify_rejects_user_id_mismatch() {
        let author = secure_author("alice", "u-123", &[], None, false, None);
        let (ok, reason) = verify(author.as_str(), Some(("alice", "u-999")), None, Duration::hours(24));
        assert!(!ok);
        assert_eq!(reason, VerifyReason::UserMismatch);
    }

    #[test]
    fn delegated_author_exposes_effective_user() {
        let author = secure_author("admin-bob", "u-1", &[], None, false, None);
        let delegated = delegated_author(&author, "u-999", "customer support request #42");
        let parsed = parse(delegated.as_str()).unwrap();
        assert_eq!(effective_user(&parsed), "u-999");
        assert_eq!(parsed.delegation_reason.as_deref(), Some("customer support request #42"));
    }

    #[test]
    fn malformed_string_fails_to_parse() {
        assert!(parse("not an author string at all").is_none());
    }
}
