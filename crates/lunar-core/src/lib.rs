//! Core types for the Lunar bot runtime.
//!
//! - [`error`]: transport, API and decode error taxonomy
//! - [`segment`]: message segments and the pluggable [`SegmentDecoder`]
//! - [`event`]: the typed event taxonomy
//! - [`classifier`]: [`EventClassifier`], raw frame to [`Event`]
//! - [`api`]: the [`BotApi`] handle handlers use to talk back

pub mod api;
pub mod classifier;
pub mod command;
pub mod error;
pub mod event;
pub mod segment;

pub use api::BotApi;
pub use classifier::{DEFAULT_TRIGGER_PREFIX, EventClassifier, lifecycle};
pub use command::{Command, extract_command};
pub use error::{
    ApiError, ApiResult, DecodeError, DecodeResult, TransportError, TransportResult,
};
pub use event::{Category, Event, LifecycleEvent, MessageEvent};
pub use segment::{BoxedDecoder, Message, OneBotDecoder, Segment, SegmentDecoder};
