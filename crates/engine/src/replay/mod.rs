mod atomic_io;
mod digest;
mod log;
mod player;

pub use digest::NotificationDigest;
pub use log::{CommandLog, LogHeader, LoggedCommand, ReplayError, LOG_FORMAT, LOG_VERSION};
pub use player::{replay, ReplayReport};
