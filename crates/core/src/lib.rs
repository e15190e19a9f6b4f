//! Real-time detection pipeline: pull frames from a camera or stream, run a
//! pluggable detector, map its boxes back onto the frame, draw them, and
//! hand both the annotated frame and structured events to an output sink.

pub mod annotation;
pub mod capture;
pub mod detection;
pub mod pipeline;
pub mod shared;
