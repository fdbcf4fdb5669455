//! Type definitions

pub mod job;
pub mod messages;
pub mod parcel;
pub mod survey;

pub use job::*;
pub use messages::*;
pub use parcel::*;
pub use survey::*;
