//! Bounded audio chunk queue between the demodulator and the audio callback.
//!
//! The producer never blocks: pushing into a full ring drops the oldest chunk.
//! The consumer never blocks either: [`AudioRenderer::render`] fills silence
//! when the ring is empty, whatever the size of the output buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use tracing::{debug, trace};

/// Frames per audio chunk, also the hardware callback buffer size.
pub const AUDIO_CHUNK_SIZE: usize = 8192;

/// Audio output rate in Hz.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Default ring capacity, in chunks.
pub const DEFAULT_RING_CAPACITY: usize = 16;

/// Silence chunks queued before the stream starts.
pub const DEFAULT_SILENCE_PRELOAD: usize = 4;

/// A fixed-length run of mono audio samples.
pub type AudioChunk = Vec<f32>;

/// Cuts `samples` into `chunk_size` pieces; a trailing partial chunk is
/// dropped.
pub fn split_chunks(samples: &[f32], chunk_size: usize) -> impl Iterator<Item = AudioChunk> + '_ {
    samples.chunks_exact(chunk_size.max(1)).map(<[f32]>::to_vec)
}

/**
 * Single-producer/single-consumer ring of audio chunks
 */
pub struct AudioRingBuffer {
    queue: ArrayQueue<AudioChunk>,
    chunk_size: usize,
    overflows: AtomicU64,
    underruns: AtomicU64,
}

impl AudioRingBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, chunk_size: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            chunk_size,
            overflows: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Appends `chunk`, evicting the oldest chunk when full.
    pub fn push(&self, chunk: AudioChunk) {
        if self.queue.force_push(chunk).is_some() {
            let n = self.overflows.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("audio ring full, dropped oldest chunk ({} so far)", n);
        }
    }

    /// Oldest chunk, if any.
    pub fn pop(&self) -> Option<AudioChunk> {
        self.queue.pop()
    }

    /// Queues `count` chunks of silence.
    pub fn preload_silence(&self, count: usize) {
        for _ in 0..count {
            self.push(vec![0.0; self.chunk_size]);
        }
    }

    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    /// Chunks dropped because the ring was full.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Callback periods served with silence.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    fn record_underrun(&self) {
        let n = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("audio underrun ({} so far)", n);
    }
}

/**
 * Consumer side of the ring, driven by the audio callback
 *
 * Chunks are consumed whole. When the output buffer matches the chunk size
 * each call takes one chunk; other sizes walk through the current chunk.
 */
pub struct AudioRenderer {
    ring: Arc<AudioRingBuffer>,
    current: AudioChunk,
    position: usize,
}

impl AudioRenderer {
    pub fn new(ring: Arc<AudioRingBuffer>) -> Self {
        Self {
            ring,
            current: Vec::new(),
            position: 0,
        }
    }

    pub fn ring(&self) -> &Arc<AudioRingBuffer> {
        &self.ring
    }

    /// Fills `out` completely, with silence where no audio is queued.
    pub fn render(&mut self, out: &mut [f32]) {
        let mut written = 0;
        let mut starved = false;
        while written < out.len() {
            if self.position >= self.current.len() {
                match self.ring.pop() {
                    Some(chunk) => {
                        self.current = chunk;
                        self.position = 0;
                        if self.current.is_empty() {
                            continue;
                        }
                    }
                    None => {
                        out[written..].iter_mut().for_each(|s| *s = 0.0);
                        starved = true;
                        break;
                    }
                }
            }
            let n = (self.current.len() - self.position).min(out.len() - written);
            out[written..written + n]
                .copy_from_slice(&self.current[self.position..self.position + n]);
            self.position += n;
            written += n;
        }
        if starved {
            self.ring.record_underrun();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: f32) -> AudioChunk {
        vec![value; 4]
    }

    #[test]
    fn test_fifo_order() {
        let ring = AudioRingBuffer::new(8, 4);
        for i in 0..5 {
            ring.push(chunk(i as f32));
        }
        for i in 0..5 {
            assert_eq!(ring.pop().unwrap()[0], i as f32);
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let ring = AudioRingBuffer::new(4, 4);
        for i in 1..=5 {
            ring.push(chunk(i as f32));
        }
        let order: Vec<f32> = std::iter::from_fn(|| ring.pop()).map(|c| c[0]).collect();
        assert_eq!(order, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ring.overflows(), 1);
    }

    #[test]
    fn test_split_drops_remainder() {
        let samples = vec![1.0; 10];
        let chunks: Vec<_> = split_chunks(&samples, 4).collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 4));
        assert_eq!(split_chunks(&samples[..3], 4).count(), 0);
    }

    #[test]
    fn test_preload_silence() {
        let ring = AudioRingBuffer::new(16, AUDIO_CHUNK_SIZE);
        ring.preload_silence(DEFAULT_SILENCE_PRELOAD);
        assert_eq!(ring.len(), 4);
        assert!(ring.pop().unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_empty_ring_renders_silence_for_any_size() {
        let ring = Arc::new(AudioRingBuffer::new(4, 4));
        let mut renderer = AudioRenderer::new(ring.clone());
        for size in [0usize, 1, 3, 4, 7, 8192] {
            let mut out = vec![1.0f32; size];
            renderer.render(&mut out);
            assert!(out.iter().all(|&s| s == 0.0), "size {size}");
        }
        assert!(ring.underruns() >= 5);
    }

    #[test]
    fn test_render_whole_chunks() {
        let ring = Arc::new(AudioRingBuffer::new(4, 4));
        ring.push(vec![1.0, 2.0, 3.0, 4.0]);
        ring.push(vec![5.0, 6.0, 7.0, 8.0]);
        let mut renderer = AudioRenderer::new(ring.clone());

        let mut out = [0.0f32; 4];
        renderer.render(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        renderer.render(&mut out);
        assert_eq!(out, [5.0, 6.0, 7.0, 8.0]);
        renderer.render(&mut out);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_render_partial_then_underrun() {
        let ring = Arc::new(AudioRingBuffer::new(4, 4));
        ring.push(vec![1.0, 2.0, 3.0, 4.0]);
        let mut renderer = AudioRenderer::new(ring.clone());

        let mut out = [9.0f32; 6];
        renderer.render(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
        assert_eq!(ring.underruns(), 1);
    }
}
