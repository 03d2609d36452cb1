//! Raw deflate codec for compressed sessions.
//!
//! Both directions use headerless deflate (no zlib header or adler32
//! trailer) with a 32 KiB window. The compressor and decompressor are
//! long-lived: one pair per session, fed chunk by chunk.
//!
//! Every outgoing chunk is terminated with a full flush. The peer can
//! decode a response as soon as it arrives, and the stream itself is
//! never finished, so later chunks keep extending it.

use flate2::{
    Compress, CompressError, Compression, Decompress, DecompressError, FlushCompress,
    FlushDecompress, Status,
};
use thiserror::Error;

/// Spare output space added each time a codec call runs out of room.
const OUTPUT_RESERVE: usize = 4096;

/// Errors raised while compressing or decompressing a chunk.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("deflate failed: {0}")]
    Compress(#[from] CompressError),

    #[error("inflate failed: {0}")]
    Decompress(#[from] DecompressError),
}

/// Per-session deflate state.
pub struct DeflateCodec {
    compress: Compress,
    decompress: Decompress,
}

impl DeflateCodec {
    /// Create both contexts with the encoder-default level and raw framing.
    pub fn new() -> Self {
        Self {
            compress: Compress::new(Compression::default(), false),
            decompress: Decompress::new(false),
        }
    }

    /// Compress `input` and full-flush the result.
    ///
    /// The returned bytes form a complete block sequence ending on a byte
    /// boundary; a peer inflater can decode all of `input` from them without
    /// waiting for further data.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut output = Vec::with_capacity(input.len() + OUTPUT_RESERVE);
        let start = self.compress.total_in();

        loop {
            if output.len() == output.capacity() {
                output.reserve(OUTPUT_RESERVE);
            }

            let consumed = (self.compress.total_in() - start) as usize;
            self.compress
                .compress_vec(&input[consumed..], &mut output, FlushCompress::Full)?;

            // The flush is complete once all input is taken and the encoder
            // stopped short of filling the output.
            let consumed = (self.compress.total_in() - start) as usize;
            if consumed == input.len() && output.len() < output.capacity() {
                return Ok(output);
            }
        }
    }

    /// Inflate one received chunk.
    ///
    /// Returns whatever plaintext the chunk completes, which may be empty
    /// when the chunk only carries part of a block. Bytes after the end of
    /// a finished stream are ignored.
    pub fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut output = Vec::with_capacity(input.len().saturating_mul(4) + OUTPUT_RESERVE);
        let start = self.decompress.total_in();

        loop {
            if output.len() == output.capacity() {
                output.reserve(OUTPUT_RESERVE);
            }

            let consumed_before = (self.decompress.total_in() - start) as usize;
            let produced_before = output.len();

            let status = self.decompress.decompress_vec(
                &input[consumed_before..],
                &mut output,
                FlushDecompress::None,
            )?;

            let consumed = (self.decompress.total_in() - start) as usize;
            match status {
                Status::StreamEnd => return Ok(output),
                Status::Ok | Status::BufError => {
                    if consumed == input.len() && output.len() < output.capacity() {
                        return Ok(output);
                    }
                    // No progress with output space available
                    if consumed == consumed_before && output.len() == produced_before {
                        return Ok(output);
                    }
                }
            }
        }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeflateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateCodec")
            .field("total_in", &self.compress.total_in())
            .field("total_out", &self.compress.total_out())
            .field("inflated_in", &self.decompress.total_in())
            .field("inflated_out", &self.decompress.total_out())
            .finish()
    }
}
