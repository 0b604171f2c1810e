pub mod access;
pub mod catalog;
pub mod config;
pub mod expression;
pub mod session;
