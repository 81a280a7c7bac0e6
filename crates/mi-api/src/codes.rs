//! Envelope status codes returned by the remote API.

/// Any failure without a more specific code.
pub const STATUS_OTHER_FAILURE: i32 = -1;

/// Call succeeded.
pub const STATUS_SUCCESS: i32 = 0;

/// Request rejected; the account may only apply once per period.
pub const STATUS_REQUEST_REJECTED: i32 = 100_001;

/// Request may already have been submitted.
pub const STATUS_REQUEST_POTENTIALLY_VALID: i32 = 100_003;

/// Session cookie expired.
pub const STATUS_COOKIE_EXPIRED: i32 = 100_004;
