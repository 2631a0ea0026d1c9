//! Multi-threaded CBOW training.
//!
//! The corpus is split into one contiguous byte range per thread. Every thread
//! makes `iterations` passes over its own range, updating the shared weight
//! matrices without locks (see [`crate::matrix`]). The threads only meet again
//! when they are joined at the end.

mod sigmoid;
mod worker;

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::error::{io_error, Error, Result};
use crate::huffman::HuffmanTree;
use crate::matrix::{Matrix, Real};
use crate::model::Model;
use crate::real;
use crate::rng::Rng;
use crate::token_reader::TokenReader;
use crate::unigram::{SamplerKind, UnigramDistribution, DEFAULT_TABLE_SIZE};
use crate::vocabulary::Vocabulary;

pub use sigmoid::SigmoidTable;
use worker::Worker;

#[derive(Debug, Clone)]
pub struct Params {
    /// Passes each thread makes over its part of the corpus.
    pub iterations: u32,
    pub starting_alpha: real,
    pub max_sentence_length: usize,
    /// Subsampling threshold; 0 disables subsampling.
    pub sample: real,
    /// Negative samples per position; 0 disables negative sampling.
    pub negative: usize,
    pub hierarchical_softmax: bool,
    pub vector_size: usize,
    /// Maximum distance between the target and a context word.
    pub window: usize,
    pub seed: u64,
    pub threads: usize,
    pub sampler: SamplerKind,
    pub unigram_table_size: usize,
    pub show_progress: bool,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            iterations: 5,
            starting_alpha: 0.05,
            max_sentence_length: 1000,
            sample: 1e-3,
            negative: 5,
            hierarchical_softmax: false,
            vector_size: 100,
            window: 5,
            seed: 1,
            threads: 1,
            sampler: SamplerKind::Table,
            unigram_table_size: DEFAULT_TABLE_SIZE,
            show_progress: false,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::InvalidParams(msg.to_string()));
        if self.iterations == 0 {
            return fail("iterations must be at least 1");
        }
        if self.vector_size == 0 {
            return fail("vector size must be at least 1");
        }
        if self.window == 0 {
            return fail("window must be at least 1");
        }
        if self.threads == 0 {
            return fail("threads must be at least 1");
        }
        if self.max_sentence_length == 0 {
            return fail("max sentence length must be at least 1");
        }
        if !(self.starting_alpha.is_finite() && self.starting_alpha > 0.0) {
            return fail("learning rate must be a positive number");
        }
        if !(self.sample.is_finite() && self.sample >= 0.0) {
            return fail("sample threshold must not be negative");
        }
        if !self.hierarchical_softmax && self.negative == 0 {
            return fail("enable hierarchical softmax, negative sampling, or both");
        }
        if self.negative > 0 && self.sampler == SamplerKind::Table && self.unigram_table_size == 0 {
            return fail("unigram table size must be at least 1");
        }
        Ok(())
    }
}

/// Split `file_size` bytes into at most `threads` contiguous `(offset, length)`
/// ranges. The last range takes the remainder. Every range is non-empty.
pub fn shards(file_size: u64, threads: usize) -> Vec<(u64, u64)> {
    let count = (threads as u64).min(file_size).max(1);
    let per_shard = file_size / count;
    (0..count)
        .map(|i| {
            let offset = i * per_shard;
            let length = if i == count - 1 {
                file_size - offset
            } else {
                per_shard
            };
            (offset, length)
        })
        .collect()
}

/// Everything the workers share. The weight matrices and the two atomics are
/// written by all threads at once; the rest is read-only.
pub(crate) struct SharedState<'a> {
    params: &'a Params,
    vocab: &'a Vocabulary,
    tree: &'a HuffmanTree,
    embeddings: &'a Matrix,
    hierarchical_softmax: Option<&'a Matrix>,
    negative_sampling: Option<(&'a Matrix, &'a UnigramDistribution)>,
    sigmoid: SigmoidTable,
    /// Total token occurrences in the corpus, the `T` of the decay schedule.
    train_words: u64,
    alpha: Real,
    processed_words: AtomicU64,
    start: Instant,
    progress: ProgressBar,
}

fn progress_bar(params: &Params, total: u64) -> ProgressBar {
    if !params.show_progress {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] {wide_bar} {human_pos}/{human_len} words ({per_sec}) {msg}",
    ) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_secs(1));
    pb
}

/// Train CBOW embeddings for `vocab` on the text in `corpus`.
///
/// `tree` must have been built from `vocab`; it is only consulted when
/// hierarchical softmax is enabled.
pub fn train_cbow(
    corpus: &Path,
    vocab: &Vocabulary,
    tree: &HuffmanTree,
    params: &Params,
) -> Result<Model> {
    params.validate()?;
    if vocab.is_empty() {
        return Err(Error::EmptyVocabulary);
    }
    if params.hierarchical_softmax && tree.len() != vocab.len() {
        return Err(Error::InvalidParams(format!(
            "Huffman tree has {} leaves but the vocabulary has {} tokens",
            tree.len(),
            vocab.len()
        )));
    }
    let file_size = fs::metadata(corpus)
        .map_err(io_error("checking size of", corpus))?
        .len();
    if file_size == 0 {
        return Err(Error::EmptyCorpus {
            path: corpus.to_path_buf(),
        });
    }
    if params.window >= params.max_sentence_length {
        warn!(
            "window {} is not smaller than the sentence length cap {}",
            params.window, params.max_sentence_length
        );
    }

    let mut rng = Rng::new(params.seed);
    let embeddings = Matrix::random(vocab.len(), params.vector_size, &mut rng)?;
    let hs_weights = if params.hierarchical_softmax {
        Some(Matrix::zeros(tree.internal_nodes().max(1), params.vector_size)?)
    } else {
        None
    };
    let negative_sampling = if params.negative > 0 {
        Some((
            Matrix::zeros(vocab.len(), params.vector_size)?,
            UnigramDistribution::new(vocab, params.sampler, params.unigram_table_size)?,
        ))
    } else {
        None
    };

    let shards = shards(file_size, params.threads);
    if shards.len() < params.threads {
        warn!(
            "corpus is only {file_size} bytes; using {} threads instead of {}",
            shards.len(),
            params.threads
        );
    }
    debug!("shards: {shards:?}");

    let train_words = vocab.text_word_count();
    info!(
        "training on {:?}: {} tokens in vocabulary, {} words, {} threads",
        corpus,
        vocab.len(),
        train_words,
        shards.len()
    );

    let shared = SharedState {
        params,
        vocab,
        tree,
        embeddings: &embeddings,
        hierarchical_softmax: hs_weights.as_ref(),
        negative_sampling: negative_sampling.as_ref().map(|(m, d)| (m, d)),
        sigmoid: SigmoidTable::new(),
        train_words,
        alpha: Real::new(params.starting_alpha),
        processed_words: AtomicU64::new(0),
        start: Instant::now(),
        progress: progress_bar(params, params.iterations as u64 * train_words),
    };

    let result = thread::scope(|s| {
        let shared = &shared;
        let threads = shards
            .iter()
            .enumerate()
            .map(|(id, &(offset, length))| {
                s.spawn(move || -> Result<()> {
                    let reader = TokenReader::new(corpus, offset, length)?;
                    let seed = params.seed.wrapping_add(id as u64 + 1);
                    Worker::new(shared, reader, seed)?.run()
                })
            })
            .collect::<Vec<_>>();

        let mut first_error = None;
        for thread in threads {
            let outcome = match thread.join() {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::WorkerPanicked),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    });

    shared.progress.finish_and_clear();
    result?;
    info!(
        "training finished in {:.1}s",
        shared.start.elapsed().as_secs_f64()
    );
    drop(shared);
    Ok(Model::new(embeddings))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::vocabulary;

    #[test]
    fn shards_cover_the_file() {
        assert_eq!(shards(10, 3), vec![(0, 3), (3, 3), (6, 4)]);
        assert_eq!(shards(10, 1), vec![(0, 10)]);
        assert_eq!(shards(2, 8), vec![(0, 1), (1, 1)]);
        for (size, threads) in [(1, 1), (7, 7), (1000, 12), (13, 5)] {
            let s = shards(size, threads);
            assert!(s.len() <= threads);
            assert_eq!(s[0].0, 0);
            assert!(s.iter().all(|&(_, len)| len > 0));
            assert_eq!(s.iter().map(|&(_, len)| len).sum::<u64>(), size);
            for w in s.windows(2) {
                assert_eq!(w[0].0 + w[0].1, w[1].0);
            }
        }
    }

    #[test]
    fn validation() {
        assert!(Params::default().validate().is_ok());
        let bad = [
            Params { iterations: 0, ..Params::default() },
            Params { vector_size: 0, ..Params::default() },
            Params { window: 0, ..Params::default() },
            Params { threads: 0, ..Params::default() },
            Params { max_sentence_length: 0, ..Params::default() },
            Params { starting_alpha: -1.0, ..Params::default() },
            Params { sample: real::NAN, ..Params::default() },
            Params { negative: 0, hierarchical_softmax: false, ..Params::default() },
            Params { unigram_table_size: 0, ..Params::default() },
        ];
        for params in bad {
            assert!(matches!(params.validate(), Err(Error::InvalidParams(_))), "{params:?}");
        }
        let hs_only = Params {
            negative: 0,
            hierarchical_softmax: true,
            unigram_table_size: 0,
            ..Params::default()
        };
        assert!(hs_only.validate().is_ok());
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let empty = NamedTempFile::new().unwrap();
        let vocab = Vocabulary::from_counts(10, [(&b"a"[..], 1)]).unwrap();
        let tree = HuffmanTree::new(&vocab).unwrap();
        let err = train_cbow(empty.path(), &vocab, &tree, &Params::default()).err().unwrap();
        assert!(matches!(err, Error::EmptyCorpus { .. }));

        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"a a a\n").unwrap();
        let nothing = Vocabulary::new(10).unwrap();
        let tree = HuffmanTree::new(&nothing).unwrap();
        let err = train_cbow(f.path(), &nothing, &tree, &Params::default()).err().unwrap();
        assert!(matches!(err, Error::EmptyVocabulary));
    }

    #[test]
    fn mismatched_tree_is_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"a b\n").unwrap();
        let vocab = vocabulary::collect(f.path(), 1, 10).unwrap();
        let other = Vocabulary::from_counts(10, [(&b"z"[..], 1)]).unwrap();
        let tree = HuffmanTree::new(&other).unwrap();
        let params = Params {
            hierarchical_softmax: true,
            ..Params::default()
        };
        let err = train_cbow(f.path(), &vocab, &tree, &params).err().unwrap();
        assert!(matches!(err, Error::InvalidParams(_)));
    }
}
