//! Credentials and the per-(credential, shift) threshold key.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Placeholder secret shipped in the sample configuration.
pub const DEFAULT_TOKEN_VALUE: &str = "YOUR_TOKEN_HERE";

/// A service credential: the cookie token plus its configured index.
///
/// Equality and hashing use the index and an ASCII case-insensitive
/// comparison of the secret.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenInfo {
    /// Cookie secret.
    #[serde(default = "default_token")]
    pub token: String,

    /// Unique, 1-based index.
    #[serde(default)]
    pub index: u32,
}

fn default_token() -> String {
    DEFAULT_TOKEN_VALUE.to_string()
}

impl TokenInfo {
    /// Creates a credential.
    pub fn new(token: impl Into<String>, index: u32) -> Self {
        Self {
            token: token.into(),
            index,
        }
    }

    /// Whether the secret is blank or still the placeholder.
    #[must_use]
    pub fn has_placeholder_secret(&self) -> bool {
        self.token.trim().is_empty() || self.token == DEFAULT_TOKEN_VALUE
    }

    /// Secret with everything but the first and last few characters hidden.
    #[must_use]
    pub fn masked_token(&self) -> String {
        mask(&self.token)
    }
}

impl Default for TokenInfo {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_VALUE, 0)
    }
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("index", &self.index)
            .field("token", &self.masked_token())
            .finish()
    }
}

impl fmt::Display for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token #{}", self.index)
    }
}

impl PartialEq for TokenInfo {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.token.eq_ignore_ascii_case(&other.token)
    }
}

impl Eq for TokenInfo {}

impl Hash for TokenInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        hash_ignore_case(&self.token, state);
    }
}

impl PartialOrd for TokenInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TokenInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| cmp_ignore_case(&self.token, &other.token))
    }
}

/// Identifies one schedulable trigger: a credential combined with one shift.
#[derive(Clone)]
pub struct ThresholdKey {
    /// Index of the credential.
    pub token_index: u32,

    /// Secret of the credential.
    pub token: String,

    /// 1-based position of the shift in the configuration.
    pub shift_index: u32,

    /// Milliseconds the trigger fires ahead of the daily anchor.
    pub shift_ms: i32,
}

impl ThresholdKey {
    /// Creates a threshold key.
    pub fn new(token_index: u32, token: impl Into<String>, shift_index: u32, shift_ms: i32) -> Self {
        Self {
            token_index,
            token: token.into(),
            shift_index,
            shift_ms,
        }
    }

    /// The credential this threshold belongs to.
    #[must_use]
    pub fn token_info(&self) -> TokenInfo {
        TokenInfo::new(self.token.clone(), self.token_index)
    }
}

impl fmt::Debug for ThresholdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdKey")
            .field("token_index", &self.token_index)
            .field("token", &mask(&self.token))
            .field("shift_index", &self.shift_index)
            .field("shift_ms", &self.shift_ms)
            .finish()
    }
}

impl fmt::Display for ThresholdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token #{} Shift #{}", self.token_index, self.shift_index)
    }
}

impl PartialEq for ThresholdKey {
    fn eq(&self, other: &Self) -> bool {
        self.token_index == other.token_index
            && self.shift_index == other.shift_index
            && self.shift_ms == other.shift_ms
            && self.token.eq_ignore_ascii_case(&other.token)
    }
}

impl Eq for ThresholdKey {}

impl Hash for ThresholdKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token_index.hash(state);
        self.shift_index.hash(state);
        self.shift_ms.hash(state);
        hash_ignore_case(&self.token, state);
    }
}

impl PartialOrd for ThresholdKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ThresholdKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token_index
            .cmp(&other.token_index)
            .then_with(|| self.shift_index.cmp(&other.shift_index))
            .then_with(|| self.shift_ms.cmp(&other.shift_ms))
            .then_with(|| cmp_ignore_case(&self.token, &other.token))
    }
}

fn hash_ignore_case<H: Hasher>(value: &str, state: &mut H) {
    for byte in value.bytes() {
        state.write_u8(byte.to_ascii_lowercase());
    }
    state.write_u8(0xff);
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|b| b.to_ascii_lowercase())
        .cmp(b.bytes().map(|b| b.to_ascii_lowercase()))
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
