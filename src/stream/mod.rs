//! Streaming primitives shared by the read and write paths
pub(crate) mod cursor;
pub(crate) mod rows;
pub(crate) mod utils;
