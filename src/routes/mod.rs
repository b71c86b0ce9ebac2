pub mod comment;
pub mod cors;
pub mod user;
