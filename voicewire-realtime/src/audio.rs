//! Audio codec utilities.
//!
//! Bidirectional conversion between mono float32 PCM in `[-1, 1]` and
//! little-endian PCM16 base64, bucket-average downsampling for microphone
//! capture, and a serial playback queue for received audio chunks.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::{broadcast, mpsc};

use crate::error::Result;
use crate::events::{AudioDelta, ServerEvent};

/// Sample rate of model output audio when an event does not declare one.
pub const DEFAULT_OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;

/// Sample rate platforms typically capture microphones at.
pub const MICROPHONE_SAMPLE_RATE_HZ: u32 = 48_000;

/// Sample rate the model expects for input audio.
pub const MODEL_INPUT_SAMPLE_RATE_HZ: u32 = 16_000;

/// Encode float32 samples as base64 little-endian PCM16.
///
/// Samples are clamped to `[-1, 1]`. Negatives scale by 32768 and
/// non-negatives by 32767, so exact `-1.0` and `+1.0` map onto the full
/// i16 range without overflow.
pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0) as i16
        } else {
            (clamped * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

/// Decode base64 little-endian PCM16 into float32 samples.
///
/// The inverse mapping divides by 32768 and clamps to `[-1, 1]`. A truncated
/// trailing byte is dropped; invalid base64 yields an empty buffer rather
/// than an error.
pub fn decode_pcm16_base64(encoded: &str) -> Vec<f32> {
    let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(_) => return Vec::new(),
    };
    bytes
        .chunks_exact(2)
        .map(|pair| {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            (value as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Downsample by average-of-bucket decimation.
///
/// Pass-through when the target rate is not below the source rate.
pub fn downsample(samples: &[f32], source_hz: u32, target_hz: u32) -> Vec<f32> {
    if target_hz >= source_hz || source_hz == 0 || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * target_hz as u64 / source_hz as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for index in 0..out_len {
        let start = (index as u64 * source_hz as u64 / target_hz as u64) as usize;
        let end = (((index + 1) as u64 * source_hz as u64 / target_hz as u64) as usize)
            .min(samples.len());
        if start >= end {
            continue;
        }
        let bucket = &samples[start..end];
        out.push(bucket.iter().sum::<f32>() / bucket.len() as f32);
    }
    out
}

/// Injected playback surface standing in for a platform audio context.
///
/// `play` must not resolve until the chunk has finished playing; the queue
/// relies on that to serialize chunks.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Resume a suspended output context. Called before the first chunk.
    async fn resume(&self) -> Result<()>;

    /// Play one decoded chunk to completion at the given sample rate.
    async fn play(&self, samples: Vec<f32>, sample_rate_hz: u32) -> Result<()>;
}

/// Serial playback chain for received audio chunks.
///
/// Chunks are enqueued synchronously and played strictly in receipt order by
/// a background task. A failing chunk publishes one structured error event
/// on the local stream and does not stall the chunks behind it. Dropping the
/// queue ends the task.
pub struct PlaybackQueue {
    chunk_tx: mpsc::UnboundedSender<(String, u32)>,
}

impl PlaybackQueue {
    /// Spawn the playback task over the given sink, reporting failures on
    /// the provided event stream.
    pub fn new(sink: Arc<dyn AudioSink>, events: broadcast::Sender<ServerEvent>) -> Self {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<(String, u32)>();
        tokio::spawn(async move {
            let mut resumed = false;
            while let Some((encoded, sample_rate_hz)) = chunk_rx.recv().await {
                if !resumed {
                    match sink.resume().await {
                        Ok(()) => resumed = true,
                        Err(e) => {
                            tracing::warn!(error = %e, "audio output resume failed");
                            let _ = events.send(ServerEvent::local_error(
                                "playback_error",
                                format!("Audio playback failed: {e}"),
                            ));
                            continue;
                        }
                    }
                }
                let samples = decode_pcm16_base64(&encoded);
                if samples.is_empty() {
                    continue;
                }
                if let Err(e) = sink.play(samples, sample_rate_hz).await {
                    tracing::warn!(error = %e, "audio chunk playback failed");
                    let _ = events.send(ServerEvent::local_error(
                        "playback_error",
                        format!("Audio playback failed: {e}"),
                    ));
                }
            }
        });
        Self { chunk_tx }
    }

    /// Enqueue one received chunk for playback.
    pub fn enqueue(&self, chunk: &AudioDelta) {
        let _ = self.chunk_tx.send((chunk.delta.clone(), chunk.sample_rate()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn encode_full_scale_is_asymmetric() {
        let encoded = encode_pcm16_base64(&[1.0, -1.0]);
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -32768);
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let hot = encode_pcm16_base64(&[2.5, -2.5]);
        let full = encode_pcm16_base64(&[1.0, -1.0]);
        assert_eq!(hot, full);
    }

    #[test]
    fn decode_is_inverse_within_quantization_error() {
        let samples = [0.0f32, 0.25, -0.25, 0.99, -0.99, 1.0, -1.0];
        let decoded = decode_pcm16_base64(&encode_pcm16_base64(&samples));
        assert_eq!(decoded.len(), samples.len());
        // Non-negatives scale by 32767 but decode divides by 32768, so the
        // round trip is exact only at full scale; elsewhere it is within
        // two quantization steps.
        for (original, recovered) in samples.iter().zip(&decoded) {
            assert!((original - recovered).abs() <= 2.0 / 32768.0);
        }
        assert_eq!(decoded[6], -1.0);
    }

    #[test]
    fn decode_drops_truncated_trailing_byte() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([0x00, 0x40, 0x7f]);
        let decoded = decode_pcm16_base64(&encoded);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn decode_invalid_base64_is_empty() {
        assert!(decode_pcm16_base64("not base64!!!").is_empty());
    }

    #[test]
    fn downsample_averages_buckets() {
        let samples = [3.0f32, 3.0, 3.0, 6.0, 6.0, 6.0];
        let out = downsample(&samples, 48_000, 16_000);
        assert_eq!(out, vec![3.0, 6.0]);
    }

    #[test]
    fn downsample_equal_rates_is_passthrough() {
        let samples = [0.5f32, -0.5, 0.25];
        assert_eq!(downsample(&samples, 24_000, 24_000), samples.to_vec());
    }

    #[test]
    fn downsample_drops_partial_tail_bucket() {
        // 7 samples at 3:1 -> 2 complete buckets, tail discarded.
        let samples = [1.0f32; 7];
        assert_eq!(downsample(&samples, 48_000, 16_000).len(), 2);
    }

    struct RecordingSink {
        played: Mutex<Vec<usize>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        async fn play(&self, samples: Vec<f32>, _sample_rate_hz: u32) -> Result<()> {
            let index = {
                let mut played = self.played.lock();
                played.push(samples.len());
                played.len() - 1
            };
            if self.fail_on == Some(index) {
                return Err(crate::error::RealtimeError::audio("sink rejected chunk"));
            }
            Ok(())
        }
    }

    fn chunk(samples: &[f32]) -> AudioDelta {
        AudioDelta {
            delta: encode_pcm16_base64(samples),
            sample_rate_hz: None,
            item_id: None,
            response_id: None,
            event_id: None,
        }
    }

    #[tokio::test]
    async fn playback_preserves_order_across_failures() {
        let sink = Arc::new(RecordingSink { played: Mutex::new(Vec::new()), fail_on: Some(1) });
        let (events, mut errors) = broadcast::channel(8);
        let queue = PlaybackQueue::new(sink.clone(), events);

        queue.enqueue(&chunk(&[0.1]));
        queue.enqueue(&chunk(&[0.1, 0.2]));
        queue.enqueue(&chunk(&[0.1, 0.2, 0.3]));

        let error = errors.recv().await.unwrap();
        assert!(error.is_error());

        for _ in 0..100 {
            if sink.played.lock().len() == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*sink.played.lock(), vec![1, 2, 3]);
    }
}
