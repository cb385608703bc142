// Agent command HTTP adapter

mod commands;
mod response;

pub use commands::{create_router, AppState};
pub use response::{AppError, Envelope};
