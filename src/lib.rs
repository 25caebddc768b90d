//! vorbis_web - Ogg Vorbis encode/decode bridge for web audio hosts.
//!
//! Drives a precompiled Vorbis engine through its lifecycle (one-time setup,
//! per-session encoder state, chunked processing, finish) and translates
//! container comment metadata to and from structured tags.
//!
//! The engine is reached through the [`engine::CodecEngine`] capability
//! trait, so the crate works over a native middle layer (feature
//! `middle-layer`) or any other implementation. Container-to-samples
//! decoding goes through the [`platform::PlatformDecoder`] service instead;
//! the engine is only consulted for metadata.
//!
//! ```no_run
//! # async fn demo(engine: std::sync::Arc<dyn vorbis_web::CodecEngine>) {
//! use std::sync::Arc;
//! use vorbis_web::{EncodeOptions, SymphoniaDecoder, Tag, VorbisWebCodec};
//!
//! let codec = VorbisWebCodec::new(engine, Arc::new(SymphoniaDecoder::new()));
//! let audio = vorbis_web::AudioData::new(48000, vec![vec![0.0; 48000]]);
//! let options = EncodeOptions {
//!     tags: vec![Tag::new("TITLE", "Night Drive")],
//!     ..Default::default()
//! };
//! let container = codec.encode(&audio, &options).await.unwrap();
//! let (_samples, tags) = codec.decode_with_tags(container).await.unwrap();
//! assert_eq!(tags[0].value, "Night Drive");
//! # }
//! ```

pub mod audio;
pub mod engine;
pub mod platform;
pub mod session;
pub mod tags;

pub use audio::AudioData;
pub use engine::{CodecEngine, EngineError, RawBuffer};
pub use platform::{PlatformDecoder, SymphoniaDecoder};
pub use session::{DecodeError, EncodeError, EncodeOptions, VorbisWebCodec};
pub use tags::{buffer_to_tags, tags_to_buffer, Tag, TagError, TagMemory};

#[cfg(feature = "middle-layer")]
pub use engine::middle_layer::MiddleLayerEngine;

/// MIME type of the produced container.
pub const OGG_MIME_TYPE: &str = "audio/ogg";
