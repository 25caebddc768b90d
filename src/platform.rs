//! Platform audio decode service.
//!
//! Container bytes in, multi-channel samples out. The codec engine is not
//! involved on this path; decoding runs on the demuxer/decoder stack the host
//! platform provides, which here is Symphonia.

use std::io::Cursor;

use log::warn;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::AudioData;
use crate::session::DecodeError;

/// Black-box bytes-to-samples decoder.
///
/// Takes the container by value: the byte source is spent once decoding
/// starts, which is why tag extraction must happen first.
pub trait PlatformDecoder: Send + Sync {
    fn decode(&self, container: Vec<u8>) -> Result<AudioData, DecodeError>;
}

/// Symphonia-backed [`PlatformDecoder`] covering the containers a browser
/// decode service would accept (ogg/vorbis, mp3, flac, wav, aac, mp4).
#[derive(Debug, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformDecoder for SymphoniaDecoder {
    fn decode(&self, container: Vec<u8>) -> Result<AudioData, DecodeError> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(container)),
            MediaSourceStreamOptions::default(),
        );

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Malformed(format!("format probe failed: {e}")))?;

        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| DecodeError::Malformed("no supported audio track".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Malformed(format!("decoder init failed: {e}")))?;

        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channels: Vec<Vec<f32>> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                // End of the in-memory source.
                Err(SymphoniaError::IoError(_)) => break,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Malformed(format!("demux error: {e}"))),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet; skip.
                    warn!("skipping corrupt packet: {}", e);
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(DecodeError::Malformed(format!("decode error: {e}"))),
            };

            let spec = SignalSpec::new(decoded.spec().rate, decoded.spec().channels);
            sample_rate = spec.rate;
            let chans = spec.channels.count();
            if chans == 0 {
                continue;
            }
            if channels.len() < chans {
                channels.resize_with(chans, Vec::new);
            }

            let frames = decoded.frames();
            let mut sbuf = SampleBuffer::<f32>::new(frames as u64, spec);
            sbuf.copy_interleaved_ref(decoded);

            for frame in sbuf.samples().chunks_exact(chans) {
                for (channel, sample) in frame.iter().enumerate() {
                    channels[channel].push(*sample);
                }
            }
        }

        if channels.is_empty() || channels[0].is_empty() {
            return Err(DecodeError::Malformed(
                "no decodable audio frames".to_string(),
            ));
        }

        Ok(AudioData::new(sample_rate, channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal 16-bit PCM WAV container around interleaved samples.
    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let byte_rate = sample_rate * block_align as u32;

        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_decode_wav_stereo() {
        // Interleaved L/R frames; powers of two convert to f32 exactly.
        let samples: Vec<i16> = vec![0, 16384, -16384, 8192, 16384, 0];
        let bytes = wav_bytes(44100, 2, &samples);

        let audio = SymphoniaDecoder::new().decode(bytes).unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.frame_len(), 3);
        assert_eq!(audio.channels[0], vec![0.0, -0.5, 0.5]);
        assert_eq!(audio.channels[1], vec![0.5, 0.25, 0.0]);
    }

    #[test]
    fn test_decode_wav_mono() {
        let bytes = wav_bytes(22050, 1, &[16384, -16384]);
        let audio = SymphoniaDecoder::new().decode(bytes).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.channel_count(), 1);
        assert_eq!(audio.channels[0], vec![0.5, -0.5]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = SymphoniaDecoder::new()
            .decode(b"definitely not audio".to_vec())
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        let err = SymphoniaDecoder::new().decode(Vec::new()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
