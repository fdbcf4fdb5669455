//! Database queries

pub mod job;
pub mod parcel;
pub mod survey;
