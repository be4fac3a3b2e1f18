use serde::Serialize;

/// Machine-readable reason attached to an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    NotFound,
    UnprocessableEntity,
    SeatLimitReached,
}

/// Uniform outcome of a business operation.
///
/// User-facing failures are returned as `ServiceResponse::error(..)` rather than
/// as `Err`, so callers decide how to surface them. An error may still carry a
/// payload describing partial work.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceResponse<T> {
    pub status: Status,
    pub message: Option<String>,
    pub reason: Option<ErrorReason>,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

impl<T> ServiceResponse<T> {
    pub fn success(payload: T) -> Self {
        Self {
            status: Status::Success,
            message: None,
            reason: None,
            payload,
        }
    }

    pub fn success_with_message(message: impl Into<String>, payload: T) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(payload)
        }
    }

    pub fn error(message: impl Into<String>, reason: ErrorReason, payload: T) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            reason: Some(reason),
            payload,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}
