//! Status codes that close every response.

use crate::error::RobolinkError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusCode {
    Ok,
    InvalidHandle,
    Warning,
    ApplicationError,
    InvalidLicense,
    /// 4..=8 and 10..=99.
    Unknown(i32),
    /// 100 and above, or negative: the stream is misaligned.
    Corrupt(i32),
}

/// How far the consequences of a status reach.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    None,
    Warning,
    Call,
    Session,
}

impl StatusCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidHandle,
            2 => Self::Warning,
            3 => Self::ApplicationError,
            9 => Self::InvalidLicense,
            4..=99 => Self::Unknown(code),
            _ => Self::Corrupt(code),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::InvalidHandle => 1,
            Self::Warning => 2,
            Self::ApplicationError => 3,
            Self::InvalidLicense => 9,
            Self::Unknown(code) | Self::Corrupt(code) => code,
        }
    }

    /// Whether a diagnostic line follows the status on the wire.
    pub fn has_trailing_line(self) -> bool {
        matches!(
            self,
            Self::Warning | Self::ApplicationError | Self::Unknown(_)
        )
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Ok => Severity::None,
            Self::Warning => Severity::Warning,
            Self::InvalidHandle | Self::ApplicationError | Self::Unknown(_) => Severity::Call,
            Self::InvalidLicense | Self::Corrupt(_) => Severity::Session,
        }
    }

    /// Whether return values are read after this status.
    pub fn carries_values(self) -> bool {
        matches!(self, Self::Ok | Self::Warning)
    }

    /// Maps a failing status and its diagnostic text to the crate error.
    ///
    /// Returns `None` for statuses that let the call continue.
    pub fn into_error(self, message: Option<String>) -> Option<RobolinkError> {
        let message = message.unwrap_or_default();
        match self {
            Self::Ok | Self::Warning => None,
            Self::InvalidHandle => Some(RobolinkError::InvalidHandle),
            Self::ApplicationError => Some(RobolinkError::Application {
                code: self.code(),
                message,
            }),
            Self::InvalidLicense => Some(RobolinkError::InvalidLicense),
            Self::Unknown(code) => Some(RobolinkError::UnknownStatus { code, message }),
            Self::Corrupt(code) => Some(RobolinkError::Framing {
                reason: format!("status {code} received"),
            }),
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::InvalidHandle => write!(f, "invalid-handle"),
            Self::Warning => write!(f, "warning"),
            Self::ApplicationError => write!(f, "application-error"),
            Self::InvalidLicense => write!(f, "invalid-license"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
            Self::Corrupt(code) => write!(f, "corrupt({code})"),
        }
    }
}
