use std::fmt;

use crate::status_code::{self, status_code_t, ActorCode, StatusCodeType};

/// Error value passed between tiers: a numeric code plus free-form detail.
///
/// Detail accumulates outermost-first as the error travels up through
/// [`Status::context`], so a failed ask reads like
/// `Actor::ReplyDropped(1001) snapshot: job monitor`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Status {
    code: status_code_t,
    detail: Option<String>,
}

impl Status {
    pub fn new(code: status_code_t) -> Self {
        Self { code, detail: None }
    }

    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self::new(code).context(msg.into())
    }

    /// The named actor no longer accepts messages.
    pub fn mailbox_closed(actor: &str) -> Self {
        Self::with_message(ActorCode::MAILBOX_CLOSED, actor)
    }

    /// The named actor dropped a reply channel without answering.
    pub fn reply_dropped(actor: &str) -> Self {
        Self::with_message(ActorCode::REPLY_DROPPED, actor)
    }

    /// Prefix the detail with `ctx`, keeping whatever was there before.
    pub fn context(mut self, ctx: impl fmt::Display) -> Self {
        self.detail = Some(match self.detail.take() {
            Some(inner) => format!("{}: {}", ctx, inner),
            None => ctx.to_string(),
        });
        self
    }

    pub fn code(&self) -> status_code_t {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn kind(&self) -> StatusCodeType {
        status_code::type_of(self.code)
    }

    pub fn is_ok(&self) -> bool {
        self.code == status_code::StatusCode::OK
    }

    /// True when the peer actor is gone rather than the request being bad.
    pub fn is_peer_gone(&self) -> bool {
        self.kind() == StatusCodeType::Actor
    }

    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", status_code::to_string(self.code), self.code)?;
        if let Some(detail) = &self.detail {
            write!(f, " {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}
