//! Status codes shared by every transport.

use std::borrow::Cow;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::{CourierError, SessionError};

/// Closed set of status codes returned to clients.
///
/// Serialized as `{"code": <int>, "msg": <str>}` on every transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateCode {
    Success,
    AuthKeyFail,
    NoBot,
    IllegalSession,
    NotVerifySession,
    NoElement,
    NoOperateSupport,
    PermissionDenied,
    BotMuted,
    MessageTooLarge,
    InvalidParameter(Option<String>),
    /// Carries the client-facing message; the cause stays in the server log
    /// unless surfacing it was configured.
    InternalError(Option<String>),
}

impl StateCode {
    /// Numeric wire code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::AuthKeyFail => 1,
            Self::NoBot => 2,
            Self::IllegalSession => 3,
            Self::NotVerifySession => 4,
            Self::NoElement => 5,
            Self::NoOperateSupport => 6,
            Self::PermissionDenied => 10,
            Self::BotMuted => 20,
            Self::MessageTooLarge => 30,
            Self::InvalidParameter(_) => 400,
            Self::InternalError(_) => 500,
        }
    }

    /// Human readable message.
    pub fn msg(&self) -> Cow<'_, str> {
        match self {
            Self::Success => "success".into(),
            Self::AuthKeyFail => "Auth Key错误".into(),
            Self::NoBot => "指定Bot不存在".into(),
            Self::IllegalSession => "Session失效或不存在".into(),
            Self::NotVerifySession => "Session未认证".into(),
            Self::NoElement => "指定对象不存在".into(),
            Self::NoOperateSupport => "无操作支持".into(),
            Self::PermissionDenied => "无操作权限".into(),
            Self::BotMuted => "Bot被禁言".into(),
            Self::MessageTooLarge => "消息过长".into(),
            Self::InvalidParameter(None) => "参数错误".into(),
            Self::InternalError(None) => "内部错误".into(),
            Self::InvalidParameter(Some(m)) | Self::InternalError(Some(m)) => m.as_str().into(),
        }
    }

    /// Returns `true` for [`StateCode::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Maps an error, optionally exposing the cause of internal errors.
    pub fn from_error(err: &CourierError, expose_internal: bool) -> Self {
        match err {
            CourierError::Internal(_) | CourierError::Transport(_) if expose_internal => {
                Self::InternalError(Some(err.to_string()))
            }
            _ => Self::from(err),
        }
    }

    /// Renders the code as a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "code": self.code(), "msg": self.msg() })
    }
}

impl From<&CourierError> for StateCode {
    fn from(err: &CourierError) -> Self {
        match err {
            CourierError::AuthFailure => Self::AuthKeyFail,
            CourierError::Session(SessionError::IllegalSession) => Self::IllegalSession,
            CourierError::Session(SessionError::NotVerified) => Self::NotVerifySession,
            CourierError::Session(e @ SessionError::AlreadyAuthenticated) => {
                Self::InvalidParameter(Some(e.to_string()))
            }
            CourierError::Session(e @ SessionError::CapacityExceeded { .. }) => {
                Self::InternalError(Some(e.to_string()))
            }
            CourierError::NotFound(_) | CourierError::NoBot => Self::NoBot,
            CourierError::InvalidParameter(m) => Self::InvalidParameter(Some(m.clone())),
            CourierError::UnsupportedEventType(_) => Self::InvalidParameter(Some(err.to_string())),
            CourierError::UnsupportedCommand(_) => Self::NoOperateSupport,
            CourierError::Transport(_) | CourierError::Internal(_) => Self::InternalError(None),
        }
    }
}

impl From<CourierError> for StateCode {
    fn from(err: CourierError) -> Self {
        Self::from(&err)
    }
}

impl Serialize for StateCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("StateCode", 2)?;
        s.serialize_field("code", &self.code())?;
        s.serialize_field("msg", &self.msg())?;
        s.end()
    }
}
