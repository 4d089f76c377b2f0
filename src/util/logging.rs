use once_cell::sync::OnceCell;

static SESSION_ID: OnceCell<String> = OnceCell::new();

pub fn set_session_id(session_id: impl Into<String>) {
    let _ = SESSION_ID.set(session_id.into());
}

pub fn session_id() -> Option<&'static str> {
    SESSION_ID.get().map(String::as_str)
}

#[macro_export]
macro_rules! log_with_session_id {
    ($level:expr, $($arg:tt)+) => {{
        if log::log_enabled!($level) {
            match $crate::util::logging::session_id() {
                Some(id) => log::log!($level, "[{}] {}", id, format_args!($($arg)+)),
                None => log::log!($level, "[-] {}", format_args!($($arg)+)),
            }
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::log_with_session_id!(log::Level::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::log_with_session_id!(log::Level::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::log_with_session_id!(log::Level::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        $crate::log_with_session_id!(log::Level::Debug, $($arg)+)
    };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        $crate::log_with_session_id!(log::Level::Trace, $($arg)+)
    };
}

pub use crate::{debug, error, info, trace, warn};
