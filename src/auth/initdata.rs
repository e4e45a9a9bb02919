//! Validation of Telegram mini-app init data. The payload is a query
//! string signed by Telegram: `hash` is HMAC-SHA256 over the sorted
//! `key=value` lines, keyed with HMAC-SHA256("WebAppData", bot_token).

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// The `user` JSON blob embedded in init data.
#[derive(Debug, Clone, Deserialize)]
pub struct InitDataUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub allows_write_to_pm: bool,
}

#[derive(Debug, Clone)]
pub struct InitData {
    pub user: InitDataUser,
    pub auth_date: i64,
}

/// Validates the signature and freshness of raw init data and extracts the
/// user. `max_age_secs` bounds how old `auth_date` may be.
pub fn validate(raw: &str, bot_token: &str, max_age_secs: i64) -> Result<InitData, AppError> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();

    let hash = pairs
        .iter()
        .find(|(k, _)| k == "hash")
        .map(|(_, v)| v.clone())
        .ok_or_else(|| AppError::Unauthorized("init data has no hash".into()))?;

    let mut lines: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k != "hash")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    lines.sort();
    let data_check_string = lines.join("\n");

    if !constant_time_eq(&sign(&data_check_string, bot_token), &hash) {
        return Err(AppError::Unauthorized("init data signature mismatch".into()));
    }

    let auth_date: i64 = pairs
        .iter()
        .find(|(k, _)| k == "auth_date")
        .and_then(|(_, v)| v.parse().ok())
        .ok_or_else(|| AppError::Unauthorized("init data has no auth_date".into()))?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    if now - auth_date > max_age_secs {
        return Err(AppError::Unauthorized("init data expired".into()));
    }

    let user_json = pairs
        .iter()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.clone())
        .ok_or_else(|| AppError::Unauthorized("init data has no user".into()))?;

    let user: InitDataUser = serde_json::from_str(&user_json)
        .map_err(|e| AppError::Unauthorized(format!("init data user field: {e}")))?;

    Ok(InitData { user, auth_date })
}

fn sign(data_check_string: &str, bot_token: &str) -> String {
    let mut secret = HmacSha256::new_from_slice(b"WebAppData").expect("hmac accepts any key size");
    secret.update(bot_token.as_bytes());
    let secret = secret.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret).expect("hmac accepts any key size");
    mac.update(data_check_string.as_bytes());
    let digest = mac.finalize().into_bytes();

    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
