//! Encode/decode session orchestration.
//!
//! Sequences the opaque engine (one-time setup, per-session encoder state,
//! chunked processing, finish) and the platform decode service, moving tag
//! metadata across the engine boundary through the tag codec. Every engine
//! buffer acquired here is released through a guard, on every exit path.

use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

use crate::audio::AudioData;
use crate::engine::{BufferGuard, CodecEngine, EncoderGuard, EngineError};
use crate::platform::PlatformDecoder;
use crate::tags::{buffer_to_tags, tags_to_buffer, Tag, TagError};

/// Options for one encode session.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Target quality, 0.0 to 1.0
    pub quality: f32,
    /// Comment tags embedded in the container header
    pub tags: Vec<Tag>,
    /// Samples per channel fed to the engine per chunk. Clamped to the
    /// engine's analysis capacity; `None` uses the full capacity.
    pub chunk_samples: Option<usize>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: 0.5,
            tags: Vec::new(),
            chunk_samples: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    /// A tag failed validation, or tag serialization could not allocate.
    #[error(transparent)]
    Tag(#[from] TagError),
    /// The engine module never completed (or cannot complete) its setup.
    #[error("codec engine is not ready: {0}")]
    EngineNotReady(&'static str),
    /// The engine failed mid-session.
    #[error("engine failure during encode: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The engine module never completed (or cannot complete) its setup.
    #[error("codec engine is not ready: {0}")]
    EngineNotReady(&'static str),
    /// The engine failed during tag extraction.
    #[error("engine failure during tag extraction: {0}")]
    Engine(#[from] EngineError),
    /// The container could not be parsed or decoded.
    #[error("container decode failed: {0}")]
    Malformed(String),
    /// The platform decode service itself failed.
    #[error("platform decode failed: {0}")]
    Platform(String),
}

/// One-time engine setup, memoized. Concurrent callers attach to the same
/// pending signal; setup is never observed twice.
enum InitState {
    Uninitialized,
    Initializing(watch::Receiver<bool>),
    Ready,
}

/// Ogg Vorbis encode/decode sessions over an opaque engine and a platform
/// decode service.
///
/// Cheap to share behind an `Arc`; the engine's per-session encoder state is
/// created and torn down inside each call, so concurrent sessions never share
/// one.
pub struct VorbisWebCodec {
    engine: Arc<dyn CodecEngine>,
    platform: Arc<dyn PlatformDecoder>,
    init: Mutex<InitState>,
}

impl VorbisWebCodec {
    pub fn new(engine: Arc<dyn CodecEngine>, platform: Arc<dyn PlatformDecoder>) -> Self {
        Self {
            engine,
            platform,
            init: Mutex::new(InitState::Uninitialized),
        }
    }

    /// Codec over the process-wide native middle layer and the Symphonia
    /// platform decoder.
    #[cfg(feature = "middle-layer")]
    pub fn with_middle_layer() -> Self {
        Self::new(
            crate::engine::middle_layer::middle_layer(),
            Arc::new(crate::platform::SymphoniaDecoder::new()),
        )
    }

    /// Encode samples into an Ogg container.
    ///
    /// Waits for engine setup, writes the serialized tags into engine memory,
    /// then feeds samples in bounded chunks, yielding between chunks so long
    /// streams never monopolize the host. Output bytes are concatenated in
    /// production order.
    pub async fn encode(
        &self,
        audio: &AudioData,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, EncodeError> {
        self.wait_engine_ready()
            .await
            .map_err(EncodeError::EngineNotReady)?;

        let engine = &*self.engine;
        let tags_buffer = BufferGuard::new(engine, tags_to_buffer(&options.tags, engine)?);

        let state = engine.init_encoder(
            audio.channel_count() as u32,
            audio.sample_rate,
            options.quality,
            tags_buffer.raw(),
        )?;
        let session = EncoderGuard::new(engine, state);

        let capacity = engine.analysis_sample_count().max(1);
        let chunk = options.chunk_samples.unwrap_or(capacity).clamp(1, capacity);
        let total = audio.frame_len();
        debug!(
            "encoder ready: {} ch @ {} Hz, quality {}, {} samples in chunks of {}",
            audio.channel_count(),
            audio.sample_rate,
            options.quality,
            total,
            chunk
        );

        let mut container = Vec::new();
        let mut from = 0;
        while from < total {
            let take = chunk.min(total - from);
            let analysis = engine.create_analysis_buffer(session.state())?;
            for (channel, samples) in audio.channels.iter().enumerate() {
                engine.load_channel(analysis, channel, &samples[from..from + take])?;
            }
            engine.process(session.state(), take)?;
            let produced = engine.take_output(session.state())?;
            trace!("chunk {}..{} produced {} bytes", from, from + take, produced.len());
            container.extend_from_slice(&produced);
            from += take;
            tokio::task::yield_now().await;
        }

        // Zero-count process flushes the tail of the stream.
        engine.process(session.state(), 0)?;
        let tail = engine.take_output(session.state())?;
        container.extend_from_slice(&tail);

        debug!("encoded {} samples into {} container bytes", total, container.len());
        Ok(container)
    }

    /// Decode an Ogg container into samples.
    ///
    /// Pure platform decode; the engine is not involved and does not need to
    /// be ready.
    pub async fn decode(&self, container: Vec<u8>) -> Result<AudioData, DecodeError> {
        let platform = Arc::clone(&self.platform);
        tokio::task::spawn_blocking(move || platform.decode(container))
            .await
            .map_err(|e| DecodeError::Platform(format!("decode task failed: {e}")))?
    }

    /// Decode an Ogg container into samples and its comment tags.
    ///
    /// Tags come out first: the platform decoder takes the container by
    /// value, and the byte source is spent once it starts.
    pub async fn decode_with_tags(
        &self,
        container: Vec<u8>,
    ) -> Result<(AudioData, Vec<Tag>), DecodeError> {
        self.wait_engine_ready()
            .await
            .map_err(DecodeError::EngineNotReady)?;

        let tags = self.extract_tags(&container)?;
        let audio = self.decode(container).await?;
        Ok((audio, tags))
    }

    /// Pull the comment block out of a container via the engine, releasing
    /// both boundary buffers before returning.
    fn extract_tags(&self, container: &[u8]) -> Result<Vec<Tag>, DecodeError> {
        let engine = &*self.engine;
        let input = BufferGuard::new(engine, engine.alloc_bytes(container)?);
        let comments = BufferGuard::new(
            engine,
            engine.extract_comments(input.raw(), container.len())?,
        );
        Ok(buffer_to_tags(comments.raw(), engine))
    }

    /// Resolve the engine's one-time setup, sharing one pending signal among
    /// concurrent callers.
    async fn wait_engine_ready(&self) -> Result<(), &'static str> {
        let mut rx = {
            let mut state = self.init.lock();
            match &*state {
                InitState::Ready => return Ok(()),
                InitState::Initializing(rx) => rx.clone(),
                InitState::Uninitialized => match self.engine.initialized() {
                    None => return Err("module exposes no readiness flag"),
                    Some(true) => {
                        *state = InitState::Ready;
                        return Ok(());
                    }
                    Some(false) => {
                        let rx = self.engine.ready_signal();
                        *state = InitState::Initializing(rx.clone());
                        rx
                    }
                },
            }
        };

        if rx.wait_for(|ready| *ready).await.is_err() {
            return Err("setup signal dropped before completion");
        }
        *self.init.lock() = InitState::Ready;
        Ok(())
    }
}
