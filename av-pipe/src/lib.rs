//! Staged media pipeline: blocking queues between worker stages, a stream
//! splitter, per-stream transform chains and a timestamp-ordered merge.
//!
//! The `ffmpeg` feature adds the FFmpeg-backed source, sink and codec
//! collaborators, plus [`ffmpeg::build_transcode`].

pub mod config;
pub mod filter_spec;
pub mod graph;
pub mod interleave;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod source;
pub mod split;
pub mod stage;
pub mod unit;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
