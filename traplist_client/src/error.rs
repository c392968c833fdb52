use thiserror::Error;

/// Server failure codes, mirrored from the backend's error bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    ResourceExhausted,
    AlreadyExists,
    Internal,
    Unknown(String),
}

impl ErrorCode {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "UNAUTHENTICATED" => ErrorCode::Unauthenticated,
            "PERMISSION_DENIED" => ErrorCode::PermissionDenied,
            "INVALID_ARGUMENT" => ErrorCode::InvalidArgument,
            "NOT_FOUND" => ErrorCode::NotFound,
            "FAILED_PRECONDITION" => ErrorCode::FailedPrecondition,
            "RESOURCE_EXHAUSTED" => ErrorCode::ResourceExhausted,
            "ALREADY_EXISTS" => ErrorCode::AlreadyExists,
            "INTERNAL" => ErrorCode::Internal,
            other => ErrorCode::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{message} ({code:?}, HTTP {status})")]
    Api {
        status: u16,
        code: ErrorCode,
        message: String,
    },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl ClientError {
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            ClientError::Transport(_) => None,
        }
    }

    /// Rate-limit rejections are the one failure callers may retry later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.code(), Some(ErrorCode::ResourceExhausted))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.into())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
