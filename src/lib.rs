//! Upload files to object storage through presigned URLs handed out by a
//! coordinating API.
//!
//! Large files are split into parts that are uploaded concurrently, each with
//! its own retry budget, and then committed (or aborted) as a whole.

pub mod api;
pub mod cli;
pub mod upload;
