use juicebox_drop::error::DropError;
use juicebox_drop::expiry::{ExpiryPolicy, MAX_EXPIRY_DAYS};
use juicebox_drop::id::{generate_id, is_valid_id, ID_LENGTH};
use juicebox_drop::utils::{client_ip, sanitize_filename};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::net::SocketAddr;

#[test]
fn test_sanitize_filename() {
    // basic alphanumeric with extension
    assert_eq!(sanitize_filename("hello.txt"), "hello.txt");
    assert_eq!(sanitize_filename("hello-world_123.txt"), "hello-world_123.txt");

    // path components are dropped
    assert_eq!(sanitize_filename("../hello.txt"), "hello.txt");
    assert_eq!(sanitize_filename("foo/bar.txt"), "bar.txt");
    assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
    assert_eq!(sanitize_filename("C:\\Users\\me\\report.pdf"), "report.pdf");

    // special characters become underscores
    assert_eq!(sanitize_filename("hello world!.txt"), "hello_world_.txt");
    assert_eq!(sanitize_filename("héllo.txt"), "h_llo.txt");

    // nothing usable left
    assert_eq!(sanitize_filename(""), "file");
    assert_eq!(sanitize_filename(".."), "file");
    assert_eq!(sanitize_filename("dir/"), "file");
}

#[test]
fn test_sanitize_filename_truncates_keeping_extension() {
    let long = format!("{}.tar", "a".repeat(300));
    let cleaned = sanitize_filename(&long);
    assert_eq!(cleaned.len(), 200);
    assert!(cleaned.ends_with(".tar"));
    assert!(cleaned.starts_with("aaaa"));
}

#[test]
fn test_generate_id() {
    let id = generate_id();
    assert_eq!(id.len(), ID_LENGTH);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    assert!(is_valid_id(&id));

    // 1000 ids out of 62^8 shouldn't collide
    let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
    assert_eq!(ids.len(), 1000);
}

#[test]
fn test_is_valid_id() {
    assert!(is_valid_id("aZ09bY18"));
    assert!(!is_valid_id("short"));
    assert!(!is_valid_id("../etc/x"));
    assert!(!is_valid_id("abcd efg"));
    assert!(!is_valid_id("abcdefghi"));
}

#[test]
fn test_client_ip() {
    let peer: SocketAddr = "10.0.0.5:5000".parse().unwrap();

    let mut headers = HeaderMap::new();
    assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.5"));
    assert_eq!(client_ip(&headers, None), None);

    headers.insert("x-real-ip", "192.168.1.2".parse().unwrap());
    assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("192.168.1.2"));

    headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
    assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("1.2.3.4"));
}

#[test]
fn test_expiry_policy_parse() {
    assert_eq!("".parse::<ExpiryPolicy>().unwrap(), ExpiryPolicy::Default);
    assert_eq!("default".parse::<ExpiryPolicy>().unwrap(), ExpiryPolicy::Default);
    assert_eq!("never".parse::<ExpiryPolicy>().unwrap(), ExpiryPolicy::Never);
    assert_eq!("7".parse::<ExpiryPolicy>().unwrap(), ExpiryPolicy::Days(7));
    assert_eq!("7d".parse::<ExpiryPolicy>().unwrap(), ExpiryPolicy::Days(7));
    assert_eq!(ExpiryPolicy::parse_opt(None).unwrap(), ExpiryPolicy::Default);

    assert!("0".parse::<ExpiryPolicy>().is_err());
    assert!("-3".parse::<ExpiryPolicy>().is_err());
    assert!("soon".parse::<ExpiryPolicy>().is_err());

    // display output parses back
    for policy in [ExpiryPolicy::Default, ExpiryPolicy::Never, ExpiryPolicy::Days(14)] {
        assert_eq!(policy.to_string().parse::<ExpiryPolicy>().unwrap(), policy);
    }
}

#[test]
fn test_expiry_policy_resolve() {
    let now = Utc::now();
    let default = Some(Duration::days(30));

    assert_eq!(ExpiryPolicy::Default.resolve(now, default), Some(now + Duration::days(30)));
    assert_eq!(ExpiryPolicy::Default.resolve(now, None), None);
    assert_eq!(ExpiryPolicy::Never.resolve(now, default), None);
    assert_eq!(ExpiryPolicy::Days(2).resolve(now, default), Some(now + Duration::days(2)));
}

#[test]
fn test_expiry_policy_rejects_huge_day_counts() {
    let max = MAX_EXPIRY_DAYS.to_string();
    assert_eq!(max.parse::<ExpiryPolicy>().unwrap(), ExpiryPolicy::Days(MAX_EXPIRY_DAYS));

    for value in [(MAX_EXPIRY_DAYS + 1).to_string(), "4294967295".to_string(), "99999999999d".to_string()] {
        let err = value.parse::<ExpiryPolicy>().unwrap_err();
        assert!(matches!(err, DropError::Validation(_)), "{value}: {err:?}");
    }
}

#[test]
fn test_expiry_policy_resolve_never_overflows() {
    let now = Utc::now();

    // day counts past the cap are clamped to it
    let capped = Some(now + Duration::days(i64::from(MAX_EXPIRY_DAYS)));
    assert_eq!(ExpiryPolicy::Days(u32::MAX).resolve(now, None), capped);
    assert_eq!(ExpiryPolicy::Days(MAX_EXPIRY_DAYS + 1).resolve(now, None), capped);

    // results chrono can't represent come back as None
    assert_eq!(ExpiryPolicy::Days(1).resolve(DateTime::<Utc>::MAX_UTC, None), None);
    assert_eq!(ExpiryPolicy::Default.resolve(now, Some(Duration::MAX)), None);
}
