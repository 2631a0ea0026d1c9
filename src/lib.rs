//! Word embeddings with the continuous bag-of-words model.
//!
//! The pipeline is: [`vocabulary::collect`] counts the tokens of a corpus,
//! [`HuffmanTree::new`] codes them for hierarchical softmax,
//! [`train::train_cbow`] learns the embeddings on several threads at once, and
//! [`model::save`] writes them out.

pub mod arena;
pub mod error;
pub mod huffman;
pub mod matrix;
pub mod model;
pub mod numeric;
pub mod rng;
pub mod token_reader;
pub mod train;
pub mod unigram;
pub mod vocabulary;

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

pub use error::{Error, Result};
pub use huffman::HuffmanTree;
pub use model::{Model, OutputFormat};
pub use train::{train_cbow, Params};
pub use unigram::SamplerKind;
pub use vocabulary::Vocabulary;
