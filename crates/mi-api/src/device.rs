//! Device identity and cookie formatting.

use std::time::{SystemTime, UNIX_EPOCH};

use sha1::{Digest, Sha1};

const VERSION_CODE: &str = "500411";
const VERSION_NAME: &str = "5.4.11";

/// Random upper-case SHA-1 hex id, generated once per service.
#[must_use]
pub fn random_device_id() -> String {
    let unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let seed = format!("{}-{unix_ms}", rand::random::<f64>());

    hex::encode_upper(Sha1::digest(seed.as_bytes()))
}

/// Cookie header value for a session token.
#[must_use]
pub fn cookie_value(token: &str, device_id: &str) -> String {
    format!(
        "new_bbs_serviceToken={token};versionCode={VERSION_CODE};versionName={VERSION_NAME};deviceId={device_id};"
    )
}
