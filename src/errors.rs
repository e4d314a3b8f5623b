use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure of a single call to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionError {
    MissingApiKey,
    Transport(String),
    Timeout(Duration),
    Status { status: u16, message: String },
    Malformed(String),
}

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionError::MissingApiKey => write!(f, "no API key configured for the completion service"),
            CompletionError::Transport(msg) => write!(f, "could not reach the completion service: {}", msg),
            CompletionError::Timeout(after) => {
                write!(f, "the completion service did not answer within {}s", after.as_secs())
            }
            CompletionError::Status { status, message } => {
                write!(f, "the completion service returned {}: {}", status, message)
            }
            CompletionError::Malformed(msg) => write!(f, "unexpected completion response: {}", msg),
        }
    }
}

impl std::error::Error for CompletionError {}

/// Why a generation attempt did not produce a result.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateError {
    EmptyPrompt,
    QuotaExceeded { limit: u32 },
    Busy,
    UnknownTool(String),
    /// The session was reset while the call was in flight.
    Superseded,
    Completion(CompletionError),
}

impl GenerateError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::EmptyPrompt => "validation",
            GenerateError::QuotaExceeded { .. } => "quota_exceeded",
            GenerateError::Busy => "busy",
            GenerateError::UnknownTool(_) => "unknown_tool",
            GenerateError::Superseded => "superseded",
            GenerateError::Completion(_) => "completion_service",
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match self {
            GenerateError::EmptyPrompt => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        }
    }

    pub fn notice(&self) -> Notice {
        Notice {
            level: self.level(),
            message: self.to_string(),
        }
    }
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::EmptyPrompt => write!(f, "Please enter a prompt."),
            GenerateError::QuotaExceeded { limit } => write!(
                f,
                "Request limit reached ({} generations per session). Reset the session to continue.",
                limit
            ),
            GenerateError::Busy => write!(f, "A generation is already running for this session."),
            GenerateError::UnknownTool(id) => write!(f, "Unknown tool: {}", id),
            GenerateError::Superseded => write!(f, "The session was reset before the generation finished."),
            GenerateError::Completion(e) => write!(f, "Error generating code: {}", e),
        }
    }
}

impl std::error::Error for GenerateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerateError::Completion(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CompletionError> for GenerateError {
    fn from(e: CompletionError) -> Self {
        GenerateError::Completion(e)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message shown next to the page after an operation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<&GenerateError> for ErrorBody {
    fn from(e: &GenerateError) -> Self {
        ErrorBody {
            error: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl ResponseError for GenerateError {
    fn status_code(&self) -> StatusCode {
        match self {
            GenerateError::EmptyPrompt => StatusCode::UNPROCESSABLE_ENTITY,
            GenerateError::UnknownTool(_) => StatusCode::BAD_REQUEST,
            GenerateError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GenerateError::Busy | GenerateError::Superseded => StatusCode::CONFLICT,
            GenerateError::Completion(CompletionError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GenerateError::Completion(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/json")
            .body(ErrorBody::from(self).to_json())
    }
}
