use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

pub(super) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16
}

pub(super) fn u16_to_i16(sample: u16) -> i16 {
    (i32::from(sample) - 32_768) as i16
}

/// Number of interleaved samples making up one block of `block_ms`.
pub(super) fn block_len(sample_rate: u32, channels: usize, block_ms: u64) -> usize {
    let frames = (u64::from(sample_rate) * block_ms / 1000).max(1) as usize;
    frames * channels.max(1)
}

/// Re-slices whatever buffer sizes the audio host delivers into fixed-size
/// 16-bit blocks and hands them to the consumer thread. The callback never
/// blocks: a full channel drops the block and bumps `dropped`.
pub(super) struct BlockDispatcher {
    block_len: usize,
    pending: Vec<i16>,
    sender: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
}

impl BlockDispatcher {
    pub(super) fn new(block_len: usize, sender: Sender<Vec<i16>>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            block_len: block_len.max(1),
            pending: Vec::with_capacity(block_len),
            sender,
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], convert: F)
    where
        T: Copy,
        F: FnMut(T) -> i16,
    {
        self.pending.extend(data.iter().copied().map(convert));

        while self.pending.len() >= self.block_len {
            let block: Vec<i16> = self.pending.drain(..self.block_len).collect();
            if let Err(err) = self.sender.try_send(block) {
                match err {
                    TrySendError::Full(_) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    TrySendError::Disconnected(_) => {
                        self.pending.clear();
                        break;
                    }
                }
            }
        }
    }
}
