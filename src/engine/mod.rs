//! Opaque codec engine boundary.
//!
//! The Vorbis engine is a precompiled module; this module defines the
//! capability surface the orchestrator drives (one-time setup, per-session
//! encoder state, chunked processing, raw buffer exchange) plus the guard
//! types that keep every buffer released on every exit path.

use thiserror::Error;
use tokio::sync::watch;

use crate::tags::TagMemory;

#[cfg(feature = "middle-layer")]
pub mod middle_layer;

/// Address of a raw buffer inside the engine's heap.
///
/// Zero is the absence marker: [`RawBuffer::NULL`] is never read or freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawBuffer(usize);

impl RawBuffer {
    pub const NULL: RawBuffer = RawBuffer(0);

    pub fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub fn addr(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Handle to one encode session's state inside the engine.
///
/// Exclusively owned by a single orchestrator call; released via
/// [`CodecEngine::clear_encoder`], which also reclaims any analysis buffers
/// created for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderState(RawBuffer);

impl EncoderState {
    pub fn new(raw: RawBuffer) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> RawBuffer {
        self.0
    }
}

/// Scratch buffer the engine analyses one chunk of samples from.
///
/// Owned by the encoder state, never freed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisBuffer(RawBuffer);

impl AnalysisBuffer {
    pub fn new(raw: RawBuffer) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> RawBuffer {
        self.0
    }
}

/// Engine-boundary failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Buffer allocation of the given size failed.
    #[error("engine allocation of {0} bytes failed")]
    AllocFailed(usize),
    /// Encoder state could not be created.
    #[error("encoder state could not be created")]
    InitFailed,
    /// Engine library call failed with an error code.
    #[error("engine library error: {0}")]
    Library(i32),
    /// Other failure with message.
    #[error("{0}")]
    Other(String),
}

/// Capability surface of the opaque codec engine.
///
/// Implementable over a foreign-function boundary to a native library, or
/// mocked entirely for testing the orchestrator and tag codec in isolation.
pub trait CodecEngine: TagMemory + Send + Sync {
    /// Whether one-time setup has completed. `None` means the module never
    /// installed its readiness flag at all (a broken build, not a pending
    /// one).
    fn initialized(&self) -> Option<bool>;

    /// Completion signal for one-time setup. Receivers observe `true` once
    /// the engine is usable; the value never goes back to `false`.
    fn ready_signal(&self) -> watch::Receiver<bool>;

    /// Samples per channel one analysis buffer holds, i.e. the largest chunk
    /// [`CodecEngine::process`] accepts.
    fn analysis_sample_count(&self) -> usize;

    /// Copy `bytes` into a newly allocated engine buffer. Caller frees.
    fn alloc_bytes(&self, bytes: &[u8]) -> Result<RawBuffer, EngineError>;

    /// Release a buffer previously handed out by this engine. Freeing
    /// [`RawBuffer::NULL`] is a no-op.
    fn free_buffer(&self, buf: RawBuffer);

    /// Create encoder state for one session. `tags` is a text buffer in the
    /// serialized tag format (may be empty text, must not be NULL).
    fn init_encoder(
        &self,
        channels: u32,
        sample_rate: u32,
        quality: f32,
        tags: RawBuffer,
    ) -> Result<EncoderState, EngineError>;

    /// Prepare the analysis buffer for the next chunk.
    fn create_analysis_buffer(&self, state: EncoderState) -> Result<AnalysisBuffer, EngineError>;

    /// Stage one channel's samples for the current chunk. `samples` holds at
    /// most [`CodecEngine::analysis_sample_count`] entries.
    fn load_channel(
        &self,
        analysis: AnalysisBuffer,
        channel: usize,
        samples: &[f32],
    ) -> Result<(), EngineError>;

    /// Encode the staged chunk. `sample_count == 0` flushes the stream tail.
    fn process(&self, state: EncoderState, sample_count: usize) -> Result<(), EngineError>;

    /// Pull whatever container bytes the encoder has produced since the last
    /// pull. May be empty.
    fn take_output(&self, state: EncoderState) -> Result<Vec<u8>, EngineError>;

    /// Release encoder state and everything it owns. Must be called exactly
    /// once per successful [`CodecEngine::init_encoder`].
    fn clear_encoder(&self, state: EncoderState);

    /// Extract the comment block of a container held in engine memory.
    /// Returns the serialized tag text, or [`RawBuffer::NULL`] when the
    /// container carries no comment block. Caller frees the result.
    fn extract_comments(&self, container: RawBuffer, len: usize) -> Result<RawBuffer, EngineError>;
}

/// Frees an engine buffer on drop, on every exit path. NULL is skipped.
pub struct BufferGuard<'a> {
    engine: &'a dyn CodecEngine,
    buf: RawBuffer,
}

impl<'a> BufferGuard<'a> {
    pub fn new(engine: &'a dyn CodecEngine, buf: RawBuffer) -> Self {
        Self { engine, buf }
    }

    pub fn raw(&self) -> RawBuffer {
        self.buf
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        if !self.buf.is_null() {
            self.engine.free_buffer(self.buf);
        }
    }
}

/// Clears an encoder state on drop, on every exit path.
pub struct EncoderGuard<'a> {
    engine: &'a dyn CodecEngine,
    state: EncoderState,
}

impl<'a> EncoderGuard<'a> {
    pub fn new(engine: &'a dyn CodecEngine, state: EncoderState) -> Self {
        Self { engine, state }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }
}

impl Drop for EncoderGuard<'_> {
    fn drop(&mut self) {
        self.engine.clear_encoder(self.state);
    }
}
