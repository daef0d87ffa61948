//! Poll domain: publication-window rules and the persistence operations the
//! HTTP layer is built on.

pub mod store;
pub mod window;

use sea_orm::DbErr;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Poll number {0} does not exist.")]
    NotFound(i32),
    #[error("Poll number {0} is already closed.")]
    Closed(i32),
    #[error("You didn't select a choice.")]
    MissingSelection,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}
