//! Request / response types of the `/v1` API.

pub mod chat;
pub mod job;
