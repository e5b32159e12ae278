//! Fundus photo channel decomposition and contrast stretching.
//!
//! The pipeline runs in three steps:
//!
//! 1. [`ops::extract`] splits an RGB photo into five 8-bit rasters
//!    (grayscale, green, red, blue, and a red/blue weighted gray that
//!    ignores green).
//! 2. [`ops::adjustments::autocontrast`] stretches each one to fill 0..=255.
//! 3. [`ops::adjustments::stretch`] applies a two-threshold piecewise-linear
//!    remap with optional inverted clipping.
//!
//! [`session::Session`] owns one loaded photo and its parameters and keeps
//! all fifteen rasters current.

pub mod logger;

pub mod channels;
pub mod io;
pub mod ops;
pub mod params;
pub mod session;

pub use channels::{Channel, ChannelSet, ImageKey, Stage};
pub use params::{StretchParams, Weights};
pub use session::{Advisory, Dirty, Session, SessionError, SessionObserver, Update};
