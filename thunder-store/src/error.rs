use thunder_core::error::ServiceError;
use thunder_core::flow::FlowType;

/// Errors from the flow definition stores.
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    VersionNotFound { id: String, version: u32 },
    HandleTaken { handle: String, flow_type: FlowType },
    /// The definition is declarative-origin and cannot be mutated.
    ReadOnly(String),
    /// The backing does not support the operation (file-store writes).
    Unsupported(&'static str),
    Serialization(String),
    Database(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap a driver-specific error.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Database(Box::new(err))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Flow '{id}' not found"),
            StoreError::VersionNotFound { id, version } => {
                write!(f, "Flow '{id}' has no version {version}")
            }
            StoreError::HandleTaken { handle, flow_type } => {
                write!(f, "Handle '{handle}' already exists for flow type {flow_type}")
            }
            StoreError::ReadOnly(id) => write!(f, "Flow '{id}' is read-only"),
            StoreError::Unsupported(op) => write!(f, "Operation not supported: {op}"),
            StoreError::Serialization(msg) => write!(f, "Flow serialization error: {msg}"),
            StoreError::Database(err) => write!(f, "Database error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => {
                ServiceError::not_found("FLOW_NOT_FOUND", format!("Flow '{id}' not found"))
            }
            StoreError::VersionNotFound { id, version } => ServiceError::not_found(
                "FLOW_VERSION_NOT_FOUND",
                format!("Flow '{id}' has no version {version}"),
            ),
            StoreError::HandleTaken { handle, flow_type } => ServiceError::conflict(
                "FLOW_HANDLE_EXISTS",
                format!("Handle '{handle}' already exists for flow type {flow_type}"),
            ),
            StoreError::ReadOnly(_) => {
                ServiceError::conflict("FLOW_READ_ONLY", "flow is read-only")
            }
            StoreError::Unsupported(op) => ServiceError::bad_request(
                "FLOW_STORE_UNSUPPORTED",
                format!("Operation not supported: {op}"),
            ),
            StoreError::Serialization(msg) => ServiceError::internal(msg),
            StoreError::Database(e) => ServiceError::internal(e.to_string()),
        }
    }
}
