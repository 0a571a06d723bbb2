#[allow(non_snake_case)]
pub mod status_code;

pub mod result;
pub mod status;

#[macro_use]
pub mod strong_type;

pub mod host;
pub mod ids;
pub mod time;

pub use host::HostAddress;
pub use ids::*;
pub use result::{make_error, make_error_msg, Result, ResultExt};
pub use status::Status;
pub use status_code::*;
pub use time::{elapsed_millis, BatchDuration, UtcTime};
