#![allow(unused_imports)]

pub use super::choice::Entity as Choice;
pub use super::question::Entity as Question;
pub use super::user::Entity as User;
pub use super::vote::Entity as Vote;
