//! Client library for a livestream recording server.
//!
//! [`ApiClient`] wraps the REST surface (recording control, room metadata,
//! file browsing, conversion queue) behind a cookie session.
//! [`download`] saves recorded files locally with progress and
//! cancellation.

mod auth;
mod cache;
mod client;
pub mod download;
mod error;

pub use auth::AuthEvent;
pub use cache::{Clock, DEFAULT_ROOM_INFO_TTL, ManualClock, RoomInfoCache, SystemClock};
pub use client::{
    ApiClient, ApiClientConfig, DEFAULT_TIMEOUT, SubscribedRoom, build_agent, encode_path,
};
pub use download::{
    CancelToken, DownloadOutcome, FixedPicker, Handoff, SavePicker, Strategies, StreamWorker,
    SystemHandoff,
};
pub use error::{ApiError, Result};
pub use recorder_types as types;
