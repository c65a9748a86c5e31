pub mod auth;
pub mod scope;
