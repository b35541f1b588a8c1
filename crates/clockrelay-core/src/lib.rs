//! Core attendance model and device payload normalization.
//!
//! Provides the canonical [`AttendanceEvent`], the status vocabulary that
//! maps device tokens onto a [`Direction`], and the normalizer that turns
//! raw XML, JSON and multipart device pushes into events. Nothing in this
//! crate performs I/O; receipt time comes from an injected [`Clock`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod normalize;
pub mod time;

pub use error::{NormalizationError, Result};
pub use models::{AttendanceEvent, Direction, EventBuilder, EventSource, ReceiptContext};
pub use normalize::{detect_shape, normalize_at, Normalizer, NormalizerConfig, PayloadShape};
pub use time::{Clock, RealClock, TestClock};
