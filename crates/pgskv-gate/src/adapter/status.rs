//! Substrate status translation.
//!
//! | code            | outcome                                   |
//! |-----------------|-------------------------------------------|
//! | 2xx             | ok                                        |
//! | 400             | usage error                               |
//! | 403, 409        | restart required                          |
//! | 404             | ok (empty) for reads, not found otherwise |
//! | 405, txn tagged | invalid transaction                       |
//! | 405, 406, 422   | usage error                               |
//! | 408             | timeout                                   |
//! | 410, 503        | service unavailable                       |
//! | 412             | duplicate key                             |
//! | 500             | corruption                                |
//! | anything else   | internal error                            |

use pgskv_common::{GateError, GateResult, RequestStatus};
use pgskv_store::{SkvResponse, SkvStatus};
use tracing::error;

/// What kind of operation produced a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Point or scan read; a missing row is an empty result.
    Read,
    /// Any other operation.
    Other,
}

/// Translates a substrate status.
pub fn check_status(status: &SkvStatus, kind: OpKind) -> GateResult<()> {
    let message = || format!("{} (status {})", status.message, status.code);
    if status.invalid_txn {
        return Err(GateError::invalid_transaction(message()));
    }
    match status.code {
        200..=299 => Ok(()),
        400 => Err(GateError::usage(message())),
        403 | 409 => Err(GateError::restart_required(message())),
        404 if kind == OpKind::Read => Ok(()),
        404 => Err(GateError::not_found(message())),
        405 | 406 | 422 => Err(GateError::invalid_argument(message())),
        408 => Err(GateError::timeout(message())),
        410 | 503 => Err(GateError::service_unavailable(message())),
        412 => Err(GateError::duplicate_key(message())),
        500 => Err(GateError::corruption(message())),
        code => {
            error!(code, message = %status.message, "unexpected substrate status");
            Err(GateError::internal(format!("unknown substrate status: {}", message())))
        }
    }
}

/// Relational request status for a substrate status.
#[must_use]
pub fn request_status(status: &SkvStatus, kind: OpKind) -> RequestStatus {
    match check_status(status, kind) {
        Ok(()) => RequestStatus::Ok,
        Err(e) => e.request_status(),
    }
}

/// Unwraps a response payload, translating failures.
pub fn into_value<T>(response: SkvResponse<T>) -> GateResult<T> {
    response.into_result().map_err(|status| match check_status(&status, OpKind::Other) {
        Err(e) => e,
        // a 2xx without payload
        Ok(()) => GateError::internal(status.message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> SkvStatus {
        SkvStatus::new(code, "x")
    }

    #[test]
    fn test_request_status_table() {
        use RequestStatus::*;
        let table = [
            (200, Ok),
            (201, Ok),
            (400, UsageError),
            (403, RestartRequired),
            (404, Ok),
            (405, UsageError),
            (406, UsageError),
            (408, RuntimeError),
            (409, RestartRequired),
            (410, RuntimeError),
            (412, DuplicateKey),
            (422, UsageError),
            (500, RuntimeError),
            (503, RuntimeError),
        ];
        for (code, expected) in table {
            assert_eq!(request_status(&status(code), OpKind::Read), expected, "code {code}");
        }
    }

    #[test]
    fn test_unknown_codes_never_succeed() {
        for code in (100..200).chain(300..400).chain([401, 418, 429, 501, 504, 599, 999]) {
            assert!(check_status(&status(code), OpKind::Read).is_err(), "code {code}");
            assert_eq!(request_status(&status(code), OpKind::Other), RequestStatus::RuntimeError);
        }
    }

    #[test]
    fn test_not_found_depends_on_kind() {
        assert!(check_status(&status(404), OpKind::Read).is_ok());
        assert!(matches!(
            check_status(&status(404), OpKind::Other),
            Err(GateError::NotFound { .. })
        ));
    }

    #[test]
    fn test_error_classes() {
        assert!(matches!(check_status(&status(409), OpKind::Other), Err(GateError::RestartRequired { .. })));
        assert!(matches!(check_status(&status(408), OpKind::Other), Err(GateError::Timeout { .. })));
        assert!(matches!(check_status(&status(410), OpKind::Other), Err(GateError::ServiceUnavailable { .. })));
        assert!(matches!(check_status(&status(412), OpKind::Other), Err(GateError::DuplicateKey { .. })));
        assert!(matches!(check_status(&status(500), OpKind::Other), Err(GateError::Corruption { .. })));
        assert!(check_status(&status(409), OpKind::Other).unwrap_err().is_retryable());
    }

    #[test]
    fn test_dead_transaction_is_not_a_usage_error() {
        let status = SkvStatus::invalid_txn("transaction 3 is not live");
        let err = check_status(&status, OpKind::Read).unwrap_err();
        assert!(matches!(err, GateError::InvalidTransaction { .. }));
        assert!(!err.is_retryable());
        assert!(matches!(
            check_status(&SkvStatus::operation_not_allowed("x"), OpKind::Other),
            Err(GateError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_into_value() {
        assert_eq!(into_value(SkvResponse::ok(3)).unwrap(), 3);
        let missing: SkvResponse<u8> = SkvResponse::status(SkvStatus::not_found("gone"));
        assert!(matches!(into_value(missing), Err(GateError::NotFound { .. })));
    }
}
