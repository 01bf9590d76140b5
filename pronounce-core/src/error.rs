//! Error types for Pronounce

use thiserror::Error;

use crate::types::SessionState;

/// Result type alias using Pronounce's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in Pronounce
#[derive(Error, Debug)]
pub enum Error {
    #[error("Microphone unavailable: {0}")]
    DeviceAccess(String),

    #[error("Speech recognition not supported: {0}")]
    UnsupportedCapability(String),

    #[error("Analysis service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Message shown to the learner when a session ends with this error
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DeviceAccess(_) | Self::Audio(_) => {
                "Không thể truy cập Microphone. Vui lòng kiểm tra quyền cài đặt!"
            }
            Self::UnsupportedCapability(_) => {
                "Trình duyệt của bạn không hỗ trợ nhận dạng giọng nói."
            }
            Self::ServiceUnavailable(_)
            | Self::MalformedResponse(_)
            | Self::Network(_)
            | Self::Serialization(_)
            | Self::ProviderNotConfigured(_) => "AI đang bận một chút, bạn thử lại nhé! 🙏",
            Self::InvalidTransition { .. } => "Vui lòng đợi phiên luyện tập hiện tại kết thúc.",
            Self::Storage(_) | Self::Io(_) | Self::Config(_) => {
                "Đã xảy ra lỗi, bạn thử lại nhé!"
            }
        }
    }
}
