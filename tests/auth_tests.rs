use juicebox_drop::auth::{Authenticator, PasswordAuth, UNLOCK_TTL_SECS};

#[test]
fn test_password_hashing() {
    let auth = PasswordAuth::new(Some("secret"));
    let hash = auth.hash_password("hunter2").unwrap();

    assert!(hash.starts_with("$argon2"));
    assert!(auth.verify_password("hunter2", &hash));
    assert!(!auth.verify_password("hunter3", &hash));
    assert!(!auth.verify_password("hunter2", "not a phc string"));

    // salted
    let again = auth.hash_password("hunter2").unwrap();
    assert_ne!(hash, again);
    assert!(auth.verify_password("hunter2", &again));
}

#[test]
fn test_unlock_token() {
    let auth = PasswordAuth::new(Some("secret"));
    let token = auth.issue_unlock_token("AbCd1234");

    assert!(auth.validate_unlock_token("AbCd1234", &token));
    assert!(!auth.validate_unlock_token("Other123", &token));
    assert!(!auth.validate_unlock_token("AbCd1234", ""));
    assert!(!auth.validate_unlock_token("AbCd1234", "garbage"));

    // any change to the signed part breaks it
    let forged = token.replacen("AbCd1234", "Other123", 1);
    assert!(!auth.validate_unlock_token("Other123", &forged));

    let (value, _) = token.rsplit_once('.').unwrap();
    assert!(!auth.validate_unlock_token("AbCd1234", &format!("{}.AAAA", value)));
}

#[test]
fn test_unlock_token_secret() {
    let token = PasswordAuth::new(Some("secret")).issue_unlock_token("AbCd1234");

    // same secret across restarts keeps tokens valid
    assert!(PasswordAuth::new(Some("secret")).validate_unlock_token("AbCd1234", &token));
    assert!(!PasswordAuth::new(Some("different")).validate_unlock_token("AbCd1234", &token));
    // random secrets never agree
    assert!(!PasswordAuth::new(None).validate_unlock_token("AbCd1234", &token));
}

#[test]
fn test_unlock_token_expiry() {
    let auth = PasswordAuth::new(Some("secret"));
    let now = chrono::Utc::now().timestamp();

    let fresh = auth.issue_unlock_token_at("AbCd1234", now - UNLOCK_TTL_SECS + 60);
    assert!(auth.validate_unlock_token("AbCd1234", &fresh));

    let stale = auth.issue_unlock_token_at("AbCd1234", now - UNLOCK_TTL_SECS - 60);
    assert!(!auth.validate_unlock_token("AbCd1234", &stale));

    let future = auth.issue_unlock_token_at("AbCd1234", now + 3600);
    assert!(!auth.validate_unlock_token("AbCd1234", &future));
}

#[test]
fn test_unlock_token_random_secret() {
    // empty secret means a random key, still stable for the life of the instance
    for auth in [PasswordAuth::new(None), PasswordAuth::new(Some(""))] {
        let token = auth.issue_unlock_token("AbCd1234");
        assert!(auth.validate_unlock_token("AbCd1234", &token));
        assert!(auth.validate_unlock_token("AbCd1234", &auth.issue_unlock_token("AbCd1234")));
    }
}

#[test]
fn test_unlock_token_extreme_issue_times() {
    let auth = PasswordAuth::new(Some("secret"));

    let ancient = auth.issue_unlock_token_at("AbCd1234", i64::MIN);
    assert!(!auth.validate_unlock_token("AbCd1234", &ancient));

    let far_future = auth.issue_unlock_token_at("AbCd1234", i64::MAX);
    assert!(!auth.validate_unlock_token("AbCd1234", &far_future));
}
