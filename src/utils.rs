use axum::http::{HeaderMap, header::AUTHORIZATION};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::net::IpAddr;

pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
pub const HEADER_REAL_IP: &str = "x-real-ip";

/// Short salted hash of an identifier, for log lines that must not carry the
/// identifier itself (subjects are e-mail addresses).
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let hash = hasher.finalize();

    hash[..4].iter().map(|b| format!("{:02x}", b)).collect::<String>()
}

/// Rejects signing secrets that are short or obviously low-entropy.
pub fn validate_secret_strength(secret: &str, min_length: usize) -> Result<(), String> {
    if secret.len() < min_length {
        return Err(format!("Secret must be at least {} characters long", min_length));
    }

    if let Some(first) = secret.chars().next()
        && secret.chars().all(|c| c == first)
    {
        return Err("Secret must not consist of a single repeated character".to_string());
    }

    // "abab...", "123123..."
    if secret.is_ascii() && secret.len() >= 4 {
        for pattern_len in 2..=(secret.len() / 2).min(8) {
            let pattern = &secret[..pattern_len];
            let repeated = pattern.repeat(secret.len() / pattern_len);
            if secret.starts_with(&repeated) {
                return Err("Secret must not contain simple repeating patterns".to_string());
            }
        }
    }

    if secret.len() >= 32 {
        let unique_chars: HashSet<char> = secret.chars().collect();
        if unique_chars.len() < 8 {
            return Err("Secret must contain at least 8 different characters".to_string());
        }
    }

    Ok(())
}

/// Resolves the identity a request is rate limited under.
///
/// Precedence:
/// 1. first entry of `X-Forwarded-For` ("client, proxy1, proxy2")
/// 2. `X-Real-IP`
/// 3. the transport peer address
/// 4. the literal `unknown`
///
/// Header values are client-controlled. Only trust them when the gateway sits
/// behind a proxy that overwrites both headers.
pub fn extract_client_ip(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> String {
    if let Some(forwarded_for) = headers.get(HEADER_FORWARDED_FOR)
        && let Ok(forwarded_str) = forwarded_for.to_str()
    {
        let first = forwarded_str.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return normalize_ip(first);
        }
    }

    if let Some(real_ip) = headers.get(HEADER_REAL_IP)
        && let Ok(real_ip_str) = real_ip.to_str()
    {
        let real_ip_str = real_ip_str.trim();
        if !real_ip_str.is_empty() {
            return normalize_ip(real_ip_str);
        }
    }

    if let Some(ip) = direct_ip {
        return ip.to_string();
    }

    "unknown".to_string()
}

/// Canonical form for parseable addresses ("[::1]" and "::1" share a key);
/// anything else is kept verbatim.
fn normalize_ip(raw: &str) -> String {
    let unbracketed = raw.trim_start_matches('[').trim_end_matches(']');
    match unbracketed.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// The token of an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let h = headers(&[("x-forwarded-for", "203.0.113.5, 10.0.0.1")]);
        assert_eq!(extract_client_ip(&h, None), "203.0.113.5");
    }

    #[test]
    fn test_forwarded_for_beats_real_ip_and_peer() {
        let h = headers(&[("x-forwarded-for", " 198.51.100.7 "), ("x-real-ip", "10.9.9.9")]);
        let peer = Some("127.0.0.1".parse().unwrap());
        assert_eq!(extract_client_ip(&h, peer), "198.51.100.7");
    }

    #[test]
    fn test_real_ip_used_without_forwarded_for() {
        let h = headers(&[("x-real-ip", "10.0.0.42")]);
        assert_eq!(extract_client_ip(&h, None), "10.0.0.42");
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let h = headers(&[("x-forwarded-for", " , 10.0.0.1"), ("x-real-ip", "10.0.0.42")]);
        assert_eq!(extract_client_ip(&h, None), "10.0.0.42");
    }

    #[test]
    fn test_peer_address_then_unknown() {
        let peer = Some("192.0.2.10".parse().unwrap());
        assert_eq!(extract_client_ip(&HeaderMap::new(), peer), "192.0.2.10");
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_ipv6_brackets_normalized() {
        let h = headers(&[("x-forwarded-for", "[2001:db8::1]")]);
        assert_eq!(extract_client_ip(&h, None), "2001:db8::1");
    }

    #[test]
    fn test_bearer_token() {
        let h = headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&h), Some("abc.def.ghi"));

        let basic = headers(&[("authorization", "Basic dXNlcjpwdw==")]);
        assert_eq!(bearer_token(&basic), None);

        let empty = headers(&[("authorization", "Bearer ")]);
        assert_eq!(bearer_token(&empty), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_log_safe_id_is_stable_and_salted() {
        let a = log_safe_id("u1@example.com", "salt-a");
        assert_eq!(a, log_safe_id("u1@example.com", "salt-a"));
        assert_ne!(a, log_safe_id("u1@example.com", "salt-b"));
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_secret_all_same_char() {
        assert!(validate_secret_strength(&"a".repeat(32), 32).is_err());
    }

    #[test]
    fn test_secret_repeating_pattern() {
        assert!(validate_secret_strength(&"1234".repeat(8), 32).is_err());
    }

    #[test]
    fn test_secret_low_diversity() {
        assert!(validate_secret_strength(&"abcdefg".repeat(5), 32).is_err());
    }

    #[test]
    fn test_secret_valid() {
        assert!(validate_secret_strength("a1b2c3d4e5f6g7h8i9j0k1l2m3n4o5p6", 32).is_ok());
    }
}
