//! Block allocation: a freelist deque plus a sparse-image watermark.
//!
//! The deque is seeded on open with every free index from the bitmap, in
//! ascending order.  Allocation pops the front; freed indices are pushed
//! back to the front so recently released blocks are reused promptly.
//!
//! For sparse images the builder also tracks how many block slots have been
//! physically written to the backing file.  Handing out an index past that
//! watermark first writes a zeroed slot at its offset — this is how sparse
//! images grow on demand.

use std::collections::VecDeque;

use log::trace;

use crate::error::Result;
use crate::stream::ImageStream;
use crate::superblock::{self, BLOCK_SIZE};

pub struct BlockBuilder {
    free:           VecDeque<u64>,
    /// Number of leading block slots physically present in the backing file.
    blocks_written: u64,
}

impl BlockBuilder {
    /// Seed the freelist from the bitmap and derive the physical watermark
    /// from the backing file's length.
    pub fn seed(stream: &mut ImageStream, blocks: u64) -> Result<BlockBuilder> {
        let free_now = blocks - superblock::count_allocated(stream, blocks)?;
        let free: VecDeque<u64> =
            superblock::first_n_free(stream, blocks, free_now)?.into();

        let data_bytes = stream.len()?.saturating_sub(superblock::blocks_begin(blocks));
        let blocks_written = (data_bytes / BLOCK_SIZE).min(blocks);

        Ok(BlockBuilder { free, blocks_written })
    }

    /// Pop the next free index, or `None` when the image is full.
    pub fn pop_free(&mut self) -> Option<u64> {
        self.free.pop_front()
    }

    /// Remove a specific index from the freelist (root-block enforcement).
    pub fn take_index(&mut self, index: u64) {
        self.free.retain(|&i| i != index);
    }

    /// Push a freed index to the front of the deque.
    pub fn release(&mut self, index: u64) {
        self.free.push_front(index);
    }

    /// Ensure the slot for `index` physically exists, writing a zeroed block
    /// if the image is sparse and the slot has never been touched.
    pub fn materialize(&mut self, stream: &mut ImageStream, blocks: u64, index: u64) -> Result<()> {
        if index < self.blocks_written {
            return Ok(());
        }
        trace!("materializing sparse block slot {index}");
        stream.seek_put(superblock::block_offset(index, blocks));
        stream.write(&[0u8; BLOCK_SIZE as usize])?;
        stream.flush()?;
        self.blocks_written = index + 1;
        Ok(())
    }
}
