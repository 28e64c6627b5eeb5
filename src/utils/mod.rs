//! Small shared helpers.

pub mod fmt;
pub mod fs;
pub mod hash;
pub mod mime;
pub mod slug;
