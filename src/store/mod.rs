//! Data store modules

pub mod accounts;

pub use accounts::{AccountError, AccountStore};
