//! Classification of AWS SDK failures into application error kinds.

use std::error::Error;
use std::fmt::Debug;

use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use jit_core::AppError;

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "ServerException",
    "InternalFailure",
    "IDPCommunicationError",
];

/// Maps an SDK error code to the application error kind it represents.
fn classify(code: Option<&str>, message: String) -> AppError {
    match code {
        Some(code) if THROTTLING_CODES.contains(&code) => AppError::Transient(message),
        Some("ResourceNotFoundException" | "NotFoundException") => AppError::NotFound(message),
        Some("ResourceInUseException" | "ResourceLimitExceededException") => {
            AppError::Conflict(message)
        }
        _ => AppError::ExternalFailure(message),
    }
}

/// Converts any AWS SDK operation error into an [`AppError`].
pub(crate) fn map_sdk_error<E, R>(action: &str, error: SdkError<E, R>) -> AppError
where
    E: ProvideErrorMetadata + Error + 'static,
    R: Debug,
{
    let message = format!("failed to {action}: {}", DisplayErrorContext(&error));
    match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            AppError::Transient(message)
        }
        SdkError::ServiceError(context) => classify(context.err().code(), message),
        SdkError::ConstructionFailure(_) => AppError::Internal(message),
        _ => AppError::ExternalFailure(message),
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_eks::error::ErrorMetadata;
    use aws_sdk_eks::operation::create_access_entry::CreateAccessEntryError;

    use super::*;

    fn service_error(code: &str) -> SdkError<CreateAccessEntryError, ()> {
        SdkError::service_error(
            CreateAccessEntryError::generic(ErrorMetadata::builder().code(code).build()),
            (),
        )
    }

    #[test]
    fn service_codes_map_to_error_kinds() {
        assert!(matches!(
            map_sdk_error("create entry", service_error("ResourceInUseException")),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            map_sdk_error("delete entry", service_error("ResourceNotFoundException")),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            map_sdk_error("assume role", service_error("ThrottlingException")),
            AppError::Transient(_)
        ));
        assert!(matches!(
            map_sdk_error("assume role", service_error("AccessDenied")),
            AppError::ExternalFailure(_)
        ));
    }

    #[test]
    fn timeouts_are_transient() {
        let error = SdkError::<CreateAccessEntryError, ()>::timeout_error("operation timed out");
        let mapped = map_sdk_error("create entry", error);
        assert!(mapped.is_retryable());
        assert!(mapped.to_string().contains("create entry"));
    }
}
