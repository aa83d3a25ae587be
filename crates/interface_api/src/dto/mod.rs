//! Request and response bodies

pub mod claims;
