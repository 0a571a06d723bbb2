use std::fmt;

use crate::status::Status;
use crate::status_code::status_code_t;

pub type Result<T> = std::result::Result<T, Status>;

pub fn make_error<T>(code: status_code_t) -> Result<T> {
    Err(Status::new(code))
}

pub fn make_error_msg<T>(code: status_code_t, msg: impl Into<String>) -> Result<T> {
    Err(Status::with_message(code, msg))
}

/// Attach context to the error side of a [`Result`] without touching its code.
pub trait ResultExt<T> {
    fn context(self, ctx: impl fmt::Display) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, ctx: impl fmt::Display) -> Result<T> {
        self.map_err(|status| status.context(ctx))
    }
}
