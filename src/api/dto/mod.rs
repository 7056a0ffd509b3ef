//! Data Transfer Objects for REST request/response serialization.

pub mod transaction_dto;

pub use transaction_dto::*;
