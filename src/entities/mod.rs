pub mod prelude;

pub mod choice;
pub mod question;
pub mod user;
pub mod vote;
