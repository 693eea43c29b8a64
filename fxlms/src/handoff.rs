//! Single-slot, latest-wins block handoff between the processing context and
//! the playback context.
//!
//! Built on a triple buffer: the publisher always writes into its own block
//! and swaps it into the shared slot, the consumer swaps out whatever is
//! newest. Neither side waits on the other and nothing is allocated after
//! construction.

use triple_buffer::{Input, Output, TripleBuffer};

/// Creates a connected publisher/consumer pair carrying blocks of `block_size` samples.
pub fn block_slot(block_size: usize) -> (BlockPublisher, BlockConsumer) {
    let silence = vec![0.0f32; block_size].into_boxed_slice();
    let (input, output) = TripleBuffer::new(&silence).split();
    (
        BlockPublisher {
            input,
            block_size,
            overwritten: 0,
        },
        BlockConsumer { output, block_size },
    )
}

/// Producing half; lives on the processing context.
pub struct BlockPublisher {
    input: Input<Box<[f32]>>,
    block_size: usize,
    overwritten: u64,
}

impl BlockPublisher {
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Publishes `block`, replacing any block the consumer has not taken yet.
    pub fn publish(&mut self, block: &[f32]) {
        assert_eq!(block.len(), self.block_size, "block size mismatch");
        self.input.input_buffer_mut().copy_from_slice(block);
        if self.input.publish() {
            self.overwritten += 1;
        }
    }

    /// Blocks that were replaced before the consumer read them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

/// Consuming half; lives on the playback context.
pub struct BlockConsumer {
    output: Output<Box<[f32]>>,
    block_size: usize,
}

impl BlockConsumer {
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Copies the latest unread block into `out`, or fills it with silence.
    ///
    /// Returns whether a fresh block was available.
    pub fn consume(&mut self, out: &mut [f32]) -> bool {
        assert_eq!(out.len(), self.block_size, "block size mismatch");
        if !self.output.update() {
            out.fill(0.0);
            return false;
        }
        out.copy_from_slice(self.output.output_buffer());
        true
    }
}
