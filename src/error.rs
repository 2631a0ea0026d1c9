//! Error type shared by every stage of the pipeline.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Opening, seeking, reading or writing a file failed.
    #[error("error {action} {path:?}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A vocabulary file did not have the expected layout.
    #[error("invalid vocabulary file {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// The Huffman tree is too deep; the vocabulary counts are degenerate.
    #[error("Huffman code for token {id} is longer than {max} bits")]
    CodeTooLong { id: u32, max: usize },

    /// The summed token counts of a Huffman subtree do not fit in a `u64`.
    #[error("token counts are too large to build a Huffman tree")]
    CountOverflow,

    #[error("failed to allocate {bytes} bytes of aligned memory: {message}")]
    Allocation { bytes: usize, message: String },

    #[error("vocabulary is full ({max_tokens} tokens)")]
    VocabularyFull { max_tokens: u32 },

    #[error("model has {model} vectors but the vocabulary has {vocab} tokens")]
    ModelMismatch { model: usize, vocab: usize },

    #[error("error serializing model to {path:?}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("invalid training parameters: {0}")]
    InvalidParams(String),

    #[error("vocabulary contains no tokens besides the end-of-sentence marker")]
    EmptyVocabulary,

    #[error("training file {path:?} is empty")]
    EmptyCorpus { path: PathBuf },

    #[error("a training thread panicked")]
    WorkerPanicked,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Builds a `map_err` adapter that attaches what we were doing and to which file.
pub(crate) fn io_error(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Io {
        action,
        path,
        source,
    }
}
