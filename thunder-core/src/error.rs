/// A stable error code plus a user-safe description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Service-layer error split by HTTP-mappable class.
///
/// Flow failures (wrong password, user exists) are never represented here;
/// they are ordinary executor outcomes carried in the flow response.
#[derive(Debug)]
pub enum ServiceError {
    BadRequest(ErrorDetail),
    NotFound(ErrorDetail),
    Conflict(ErrorDetail),
    /// Internal fault. The inner message is logged with a correlation id and
    /// never sent to clients verbatim.
    Internal(String),
}

impl ServiceError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ServiceError::BadRequest(ErrorDetail::new(code, message))
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        ServiceError::NotFound(ErrorDetail::new(code, message))
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Conflict(ErrorDetail::new(code, message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            ServiceError::BadRequest(d) | ServiceError::NotFound(d) | ServiceError::Conflict(d) => {
                Some(d)
            }
            ServiceError::Internal(_) => None,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::BadRequest(d) => write!(f, "Bad request [{}]: {}", d.code, d.message),
            ServiceError::NotFound(d) => write!(f, "Not found [{}]: {}", d.code, d.message),
            ServiceError::Conflict(d) => write!(f, "Conflict [{}]: {}", d.code, d.message),
            ServiceError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}
