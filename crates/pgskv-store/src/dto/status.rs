//! Substrate status codes.

use std::fmt;

/// Status returned by every substrate call.
///
/// Codes follow HTTP conventions; 2xx is success.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkvStatus {
    /// Numeric status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Set when the request named a transaction that is no longer open.
    pub invalid_txn: bool,
}

macro_rules! status_ctor {
    ($($(#[$doc:meta])* $name:ident => $code:expr),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(message: impl Into<String>) -> Self {
                Self::new($code, message)
            }
        )*
    };
}

impl SkvStatus {
    /// Creates a status with an arbitrary code.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), invalid_txn: false }
    }

    /// 405 for a request on a transaction that ended or never existed.
    pub fn invalid_txn(message: impl Into<String>) -> Self {
        Self { invalid_txn: true, ..Self::operation_not_allowed(message) }
    }

    /// Plain 200 OK.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    status_ctor! {
        /// 201: resource created.
        created => 201,
        /// 400: malformed request.
        bad_request => 400,
        /// 403: request too old for the transaction.
        forbidden => 403,
        /// 404: key, schema, or collection missing.
        not_found => 404,
        /// 405: operation not allowed, such as an unknown transaction.
        operation_not_allowed => 405,
        /// 406: request not acceptable.
        not_acceptable => 406,
        /// 408: deadline exceeded.
        request_timeout => 408,
        /// 409: conflict.
        conflict => 409,
        /// 410: transaction or partition gone.
        gone => 410,
        /// 412: precondition failed, such as insert on an existing key.
        precondition_failed => 412,
        /// 422: request understood but unprocessable.
        unprocessable_entity => 422,
        /// 500: internal substrate error.
        internal_error => 500,
        /// 503: partition or routing unavailable.
        service_unavailable => 503,
    }

    /// Returns true for 2xx codes.
    #[must_use]
    pub const fn is_2xx(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns true for 404.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.code == 404
    }

    /// Returns true when the transaction is no longer open: the request
    /// named an unknown handle, or the substrate timed out or already
    /// ended the transaction.
    #[must_use]
    pub const fn ends_txn(&self) -> bool {
        self.invalid_txn || self.code == 408 || self.code == 410
    }
}

impl fmt::Display for SkvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}
