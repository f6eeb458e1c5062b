//! mediabatch - batch media processing
//!
//! Drives batches of local files through a remote processing service
//! (create, upload, start, poll, download, delete) and runs local ffmpeg
//! transforms, under sequential, concurrent or batched scheduling.

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod naming;
pub mod remote;
pub mod scheduler;
pub mod workflow;
