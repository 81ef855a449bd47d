//! AWS SDK error classification
//!
//! Uses the `.code()` carried by SDK errors rather than string matching on
//! Debug output. Errors that never reached the service (timeouts, dispatch
//! failures, unparseable responses) are treated as transient.

use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use converge_common::{RemoteError, classify_remote_error};
use std::error::Error;
use std::fmt::Debug;

/// Classify an SDK error into a [`RemoteError`].
pub fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + Error + 'static,
    R: Debug,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            RemoteError::unavailable(DisplayErrorContext(err).to_string())
        }
        _ => {
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(err).to_string());
            classify_remote_error(err.code(), Some(&message))
        }
    }
}
