/// Numeric status code carried by every [`Status`](crate::Status).
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// General-purpose codes shared by every crate (0xxx).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const INVALID_ARG: status_code_t = 3;
    pub const INVALID_CONFIG: status_code_t = 4;
    pub const CONFIG_PARSE_ERROR: status_code_t = 5;
    pub const IO_ERROR: status_code_t = 6;
    pub const FOUND_BUG: status_code_t = 998;
    pub const UNKNOWN: status_code_t = 999;
}

/// Actor messaging status codes (1xxx).
pub mod ActorCode {
    use super::status_code_t;

    /// The target actor has stopped and its mailbox no longer accepts messages.
    pub const MAILBOX_CLOSED: status_code_t = 1000;
    /// The actor dropped the reply channel without answering.
    pub const REPLY_DROPPED: status_code_t = 1001;
    /// The actor task panicked or was aborted.
    pub const TASK_FAILED: status_code_t = 1002;
}

/// Rebalance computation status codes (2xxx).
pub mod RebalanceCode {
    use super::status_code_t;

    pub const NO_CANDIDATES: status_code_t = 2000;
    pub const RATIO_SUM_MISMATCH: status_code_t = 2001;
    pub const RATIO_OUT_OF_RANGE: status_code_t = 2002;
}

/// Family a code belongs to, by numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCodeType {
    Invalid,
    Common,
    Actor,
    Rebalance,
}

/// Determine the family of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        1000..=1999 => StatusCodeType::Actor,
        2000..=2999 => StatusCodeType::Rebalance,
        _ => StatusCodeType::Invalid,
    }
}

/// Stable name used in logs and `Status` rendering.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::CONFIG_PARSE_ERROR => "ConfigParseError",
        StatusCode::IO_ERROR => "IOError",
        StatusCode::FOUND_BUG => "FoundBug",
        StatusCode::UNKNOWN => "Unknown",

        ActorCode::MAILBOX_CLOSED => "Actor::MailboxClosed",
        ActorCode::REPLY_DROPPED => "Actor::ReplyDropped",
        ActorCode::TASK_FAILED => "Actor::TaskFailed",

        RebalanceCode::NO_CANDIDATES => "Rebalance::NoCandidates",
        RebalanceCode::RATIO_SUM_MISMATCH => "Rebalance::RatioSumMismatch",
        RebalanceCode::RATIO_OUT_OF_RANGE => "Rebalance::RatioOutOfRange",

        _ => "UnknownCode",
    }
}
