//! FFI bindings to the precompiled Vorbis middle layer.
//!
//! The middle layer is the compiled library wrapping libvorbis/libogg behind
//! a small surface: one-time startup, a malloc/free pair for boundary
//! buffers, per-session encoder state, and comment extraction. Link against
//! `vorbis_middle_layer` when building with the `middle-layer` feature.

use std::ffi::{c_char, c_float, c_int, c_uchar, c_void, CStr};
use std::ptr;
use std::sync::Arc;
use std::thread;

use lazy_static::lazy_static;
use tokio::sync::watch;

use super::{AnalysisBuffer, CodecEngine, EncoderState, EngineError, RawBuffer};
use crate::tags::TagMemory;

/// Opaque encoder state structure owned by the middle layer
#[repr(C)]
pub struct VmlEncoderState {
    _private: [u8; 0],
}

#[link(name = "vorbis_middle_layer")]
extern "C" {
    // One-time startup (codebook setup etc.); safe to call once per process
    fn vml_startup();
    fn vml_analysis_sample_count() -> c_int;

    // Boundary buffer allocator
    fn vml_malloc(len: usize) -> *mut c_void;
    fn vml_free(p: *mut c_void);

    // Encoding
    fn vml_init_encoder(
        channels: c_int,
        sample_rate: c_int,
        quality: c_float,
        tags: *const c_char,
    ) -> *mut VmlEncoderState;
    fn vml_create_analysis_buffer(state: *mut VmlEncoderState) -> *mut *mut c_float;
    fn vml_process_encoding(state: *mut VmlEncoderState, sample_count: c_int);
    fn vml_encoded_data_len(state: *mut VmlEncoderState) -> c_int;
    fn vml_transfer_encoded_data(state: *mut VmlEncoderState) -> *const c_uchar;
    fn vml_clear_encoder(state: *mut *mut VmlEncoderState);

    // Comment extraction; returns a malloc'd tag text or null
    fn vml_decode_comments(container: *const c_uchar, len: c_int) -> *mut c_char;
}

/// [`CodecEngine`] over the native middle layer.
///
/// Startup runs on a background thread at construction; the readiness watch
/// channel flips to `true` when the engine becomes usable.
pub struct MiddleLayerEngine {
    ready_rx: watch::Receiver<bool>,
}

// SAFETY: middle-layer globals (startup, malloc/free, comment extraction) are
// thread-safe; per-encoder state is exclusively owned by one session at a time.
unsafe impl Send for MiddleLayerEngine {}
unsafe impl Sync for MiddleLayerEngine {}

impl MiddleLayerEngine {
    pub fn new() -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);

        let spawned = thread::Builder::new()
            .name("vorbis-middle-layer-init".to_string())
            .spawn(move || {
                unsafe { vml_startup() };
                let _ = ready_tx.send(true);
            });
        if let Err(e) = spawned {
            log::warn!("middle layer init thread failed to spawn: {}", e);
        }

        Self { ready_rx }
    }
}

impl Default for MiddleLayerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TagMemory for MiddleLayerEngine {
    fn alloc_text(&self, text: &str) -> Result<RawBuffer, EngineError> {
        let bytes = text.as_bytes();
        unsafe {
            // NUL-terminated so the engine reads it as a C string.
            let p = vml_malloc(bytes.len() + 1) as *mut u8;
            if p.is_null() {
                return Err(EngineError::AllocFailed(bytes.len() + 1));
            }
            ptr::copy_nonoverlapping(bytes.as_ptr(), p, bytes.len());
            *p.add(bytes.len()) = 0;
            Ok(RawBuffer::new(p as usize))
        }
    }

    fn read_text(&self, buf: RawBuffer) -> String {
        if buf.is_null() {
            return String::new();
        }
        unsafe {
            CStr::from_ptr(buf.addr() as *const c_char)
                .to_string_lossy()
                .into_owned()
        }
    }
}

impl CodecEngine for MiddleLayerEngine {
    fn initialized(&self) -> Option<bool> {
        Some(*self.ready_rx.borrow())
    }

    fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    fn analysis_sample_count(&self) -> usize {
        unsafe { vml_analysis_sample_count() as usize }
    }

    fn alloc_bytes(&self, bytes: &[u8]) -> Result<RawBuffer, EngineError> {
        unsafe {
            let p = vml_malloc(bytes.len()) as *mut u8;
            if p.is_null() {
                return Err(EngineError::AllocFailed(bytes.len()));
            }
            ptr::copy_nonoverlapping(bytes.as_ptr(), p, bytes.len());
            Ok(RawBuffer::new(p as usize))
        }
    }

    fn free_buffer(&self, buf: RawBuffer) {
        if !buf.is_null() {
            unsafe { vml_free(buf.addr() as *mut c_void) };
        }
    }

    fn init_encoder(
        &self,
        channels: u32,
        sample_rate: u32,
        quality: f32,
        tags: RawBuffer,
    ) -> Result<EncoderState, EngineError> {
        unsafe {
            let state = vml_init_encoder(
                channels as c_int,
                sample_rate as c_int,
                quality,
                tags.addr() as *const c_char,
            );
            if state.is_null() {
                return Err(EngineError::InitFailed);
            }
            Ok(EncoderState::new(RawBuffer::new(state as usize)))
        }
    }

    fn create_analysis_buffer(&self, state: EncoderState) -> Result<AnalysisBuffer, EngineError> {
        unsafe {
            let p = vml_create_analysis_buffer(state.raw().addr() as *mut VmlEncoderState);
            if p.is_null() {
                return Err(EngineError::Other("analysis buffer unavailable".to_string()));
            }
            Ok(AnalysisBuffer::new(RawBuffer::new(p as usize)))
        }
    }

    fn load_channel(
        &self,
        analysis: AnalysisBuffer,
        channel: usize,
        samples: &[f32],
    ) -> Result<(), EngineError> {
        unsafe {
            let channel_buffers = analysis.raw().addr() as *const *mut c_float;
            let dst = *channel_buffers.add(channel);
            if dst.is_null() {
                return Err(EngineError::Other(format!(
                    "no analysis buffer for channel {}",
                    channel
                )));
            }
            ptr::copy_nonoverlapping(samples.as_ptr(), dst, samples.len());
        }
        Ok(())
    }

    fn process(&self, state: EncoderState, sample_count: usize) -> Result<(), EngineError> {
        unsafe {
            vml_process_encoding(
                state.raw().addr() as *mut VmlEncoderState,
                sample_count as c_int,
            );
        }
        Ok(())
    }

    fn take_output(&self, state: EncoderState) -> Result<Vec<u8>, EngineError> {
        unsafe {
            let p = state.raw().addr() as *mut VmlEncoderState;
            let len = vml_encoded_data_len(p);
            if len < 0 {
                return Err(EngineError::Library(len));
            }
            if len == 0 {
                return Ok(Vec::new());
            }
            let data = vml_transfer_encoded_data(p);
            if data.is_null() {
                return Err(EngineError::Other("encoded data unavailable".to_string()));
            }
            Ok(std::slice::from_raw_parts(data, len as usize).to_vec())
        }
    }

    fn clear_encoder(&self, state: EncoderState) {
        unsafe {
            let mut p = state.raw().addr() as *mut VmlEncoderState;
            vml_clear_encoder(&mut p);
        }
    }

    fn extract_comments(&self, container: RawBuffer, len: usize) -> Result<RawBuffer, EngineError> {
        unsafe {
            let comments =
                vml_decode_comments(container.addr() as *const c_uchar, len as c_int);
            Ok(RawBuffer::new(comments as usize))
        }
    }
}

lazy_static! {
    /// Process-wide middle layer instance; startup begins on first access.
    static ref MIDDLE_LAYER: Arc<MiddleLayerEngine> = Arc::new(MiddleLayerEngine::new());
}

/// Shared handle to the process-wide middle layer engine.
pub fn middle_layer() -> Arc<MiddleLayerEngine> {
    MIDDLE_LAYER.clone()
}
