pub mod context;
pub mod history;
pub mod init;
pub mod status;
pub mod sweep;
pub mod verify;

pub use context::AppContext;
