use std::sync::atomic::Ordering;

use aligned_box::AlignedBox;

use super::SharedState;
use crate::error::Result;
use crate::matrix::{aligned_floats, Matrix};
use crate::numeric;
use crate::real;
use crate::rng::Rng;
use crate::token_reader::TokenReader;
use crate::unigram::UnigramDistribution;
use crate::vocabulary::SENTENCE_END_ID;

/// Words a thread processes between learning-rate updates.
const WORDS_PER_UPDATE: u64 = 10_000;

/// Give up on a negative sample after this many draws hit the target.
const MAX_NEGATIVE_DRAWS: usize = 8;

/// One training thread, working through its own byte range of the corpus.
pub(super) struct Worker<'a> {
    shared: &'a SharedState<'a>,
    reader: TokenReader,
    rng: Rng,
    sentence: Vec<u32>,
    /// Mean of the context embeddings.
    hidden: AlignedBox<[f32]>,
    /// Accumulated gradient for the context embeddings.
    hidden_error: AlignedBox<[f32]>,
    /// Private copy of whichever weight row is being worked on.
    row: AlignedBox<[f32]>,
    alpha: real,
    word_count: u64,
    last_word_count: u64,
    iteration: u32,
}

impl<'a> Worker<'a> {
    pub fn new(shared: &'a SharedState<'a>, reader: TokenReader, seed: u64) -> Result<Self> {
        let size = shared.params.vector_size;
        Ok(Worker {
            shared,
            reader,
            rng: Rng::new(seed),
            sentence: Vec::with_capacity(shared.params.max_sentence_length),
            hidden: aligned_floats(size)?,
            hidden_error: aligned_floats(size)?,
            row: aligned_floats(size)?,
            alpha: shared.alpha.get(),
            word_count: 0,
            last_word_count: 0,
            iteration: 0,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        while self.iteration < self.shared.params.iterations {
            if self.word_count - self.last_word_count > WORDS_PER_UPDATE {
                self.update_alpha();
            }
            let exhausted = self.read_sentence()?;
            self.alpha = self.shared.alpha.get();
            self.train_sentence();
            if exhausted {
                self.finish_pass()?;
            }
        }
        Ok(())
    }

    /// Fill `self.sentence` with the ids of the next sentence. Returns true if
    /// the end of the range was reached.
    fn read_sentence(&mut self) -> Result<bool> {
        let vocab = self.shared.vocab;
        let max_length = self.shared.params.max_sentence_length;
        self.sentence.clear();
        while let Some(token) = self.reader.read()? {
            let Some(id) = vocab.id(token) else {
                continue;
            };
            self.word_count += 1;
            if id == SENTENCE_END_ID {
                if self.sentence.is_empty() {
                    continue;
                }
                return Ok(false);
            }
            if !self.keep(id) {
                continue;
            }
            self.sentence.push(id);
            if self.sentence.len() >= max_length {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Subsampling: frequent words are randomly discarded.
    fn keep(&mut self, id: u32) -> bool {
        let sample = self.shared.params.sample;
        if sample <= 0.0 {
            return true;
        }
        let count = self.shared.vocab.count(id) as real;
        let threshold = sample * self.shared.train_words as real;
        let p = ((count / threshold).sqrt() + 1.0) * threshold / count;
        p as f64 >= self.rng.rand_unit()
    }

    fn train_sentence(&mut self) {
        let window = self.shared.params.window;
        for pos in 0..self.sentence.len() {
            let indent = (self.rng.rand_u64() % window as u64) as usize;
            let begin = (pos + indent).saturating_sub(window);
            let end = (pos + window + 1 - indent).min(self.sentence.len());
            // The context is [begin, end) without `pos`, which may be nothing.
            if end - begin > 1 {
                self.train_position(pos, begin, end);
            }
        }
    }

    fn train_position(&mut self, pos: usize, begin: usize, end: usize) {
        let shared = self.shared;
        numeric::zero(&mut self.hidden);
        numeric::zero(&mut self.hidden_error);

        // in -> hidden
        for c in (begin..end).filter(|&c| c != pos) {
            shared.embeddings.read_row(self.sentence[c] as usize, &mut self.row);
            numeric::add(&mut self.hidden, &self.row);
        }
        numeric::scale(&mut self.hidden, 1.0 / (end - begin - 1) as real);

        let target = self.sentence[pos];
        if let Some(weights) = shared.hierarchical_softmax {
            let tree = shared.tree;
            for (&node, &bit) in tree.path(target).iter().zip(tree.code(target)) {
                self.learn_output(weights, node as usize, 1.0 - bit as real);
            }
        }
        if let Some((weights, sampler)) = shared.negative_sampling {
            self.learn_output(weights, target as usize, 1.0);
            for _ in 0..shared.params.negative {
                if let Some(id) = self.draw_negative(sampler, target) {
                    self.learn_output(weights, id as usize, 0.0);
                }
            }
        }

        // hidden -> in
        for c in (begin..end).filter(|&c| c != pos) {
            let id = self.sentence[c] as usize;
            shared.embeddings.read_row(id, &mut self.row);
            numeric::add(&mut self.row, &self.hidden_error);
            shared.embeddings.write_row(id, &self.row);
        }
    }

    /// One logistic regression step on output row `index` towards `label`.
    fn learn_output(&mut self, weights: &Matrix, index: usize, label: real) {
        weights.read_row(index, &mut self.row);
        let f = numeric::dot(&self.hidden, &self.row);
        let g = (label - self.shared.sigmoid.get(f)) * self.alpha;
        numeric::add_scaled(&mut self.hidden_error, &self.row, g);
        numeric::add_scaled(&mut self.row, &self.hidden, g);
        weights.write_row(index, &self.row);
    }

    fn draw_negative(&mut self, sampler: &UnigramDistribution, target: u32) -> Option<u32> {
        (0..MAX_NEGATIVE_DRAWS)
            .map(|_| sampler.sample(&mut self.rng))
            .find(|&id| id != target && id != SENTENCE_END_ID)
    }

    fn flush_word_count(&mut self) -> u64 {
        let delta = self.word_count - self.last_word_count;
        self.last_word_count = self.word_count;
        self.shared.progress.inc(delta);
        self.shared.processed_words.fetch_add(delta, Ordering::Relaxed) + delta
    }

    fn update_alpha(&mut self) {
        let processed = self.flush_word_count();
        let params = self.shared.params;
        let expected = params.iterations as u64 * self.shared.train_words + 1;
        let alpha =
            params.starting_alpha * (1.0 - processed as real / expected as real).max(0.0001);
        self.shared.alpha.set(alpha);
        self.shared.progress.set_message(format!("alpha {alpha:.6}"));
    }

    fn finish_pass(&mut self) -> Result<()> {
        self.flush_word_count();
        self.word_count = 0;
        self.last_word_count = 0;
        self.iteration += 1;
        if self.iteration < self.shared.params.iterations {
            self.reader.restart()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::AtomicU64;
    use std::time::Instant;

    use indicatif::ProgressBar;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::huffman::HuffmanTree;
    use crate::matrix::{Matrix, Real};
    use crate::rng::Rng;
    use crate::train::{train_cbow, Params, SigmoidTable};
    use crate::unigram::SamplerKind;
    use crate::vocabulary::{self, Vocabulary};

    fn corpus(text: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    fn small_params() -> Params {
        Params {
            iterations: 3,
            vector_size: 12,
            window: 2,
            sample: 0.0,
            negative: 3,
            hierarchical_softmax: true,
            unigram_table_size: 10_000,
            seed: 7,
            ..Params::default()
        }
    }

    fn text() -> String {
        let mut s = String::new();
        for i in 0..200 {
            s.push_str(&format!("the cat sat on mat{} while dog {} ran\n", i % 7, i % 3));
        }
        s
    }

    fn embeddings(vocab: &Vocabulary, model: &crate::Model) -> Vec<Vec<f32>> {
        (0..vocab.len()).map(|id| model.embeddings().row_values(id)).collect()
    }

    #[test]
    fn single_thread_is_reproducible() {
        let f = corpus(&text());
        let vocab = vocabulary::collect(f.path(), 1, 1000).unwrap();
        let tree = HuffmanTree::new(&vocab).unwrap();
        let params = small_params();
        let a = train_cbow(f.path(), &vocab, &tree, &params).unwrap();
        let b = train_cbow(f.path(), &vocab, &tree, &params).unwrap();
        assert_eq!(embeddings(&vocab, &a), embeddings(&vocab, &b));

        let mut rng = Rng::new(params.seed);
        let initial = Matrix::random(vocab.len(), params.vector_size, &mut rng).unwrap();
        let the = vocab.id(b"the").unwrap() as usize;
        assert_ne!(a.embeddings().row_values(the), initial.row_values(the));
        assert!(embeddings(&vocab, &a).iter().flatten().all(|x| x.is_finite()));
    }

    #[test]
    fn one_word_sentences_never_train() {
        let f = corpus("alpha\nbeta\nalpha\ngamma\n\nbeta\n");
        let vocab = vocabulary::collect(f.path(), 1, 100).unwrap();
        let tree = HuffmanTree::new(&vocab).unwrap();
        let params = small_params();
        let model = train_cbow(f.path(), &vocab, &tree, &params).unwrap();

        let mut rng = Rng::new(params.seed);
        let initial = Matrix::random(vocab.len(), params.vector_size, &mut rng).unwrap();
        for id in 0..vocab.len() {
            assert_eq!(model.embeddings().row_values(id), initial.row_values(id));
        }
    }

    #[test]
    fn every_output_layer_and_sampler_trains() {
        let f = corpus(&text());
        let vocab = vocabulary::collect(f.path(), 1, 1000).unwrap();
        let tree = HuffmanTree::new(&vocab).unwrap();
        let variants = [
            Params { negative: 0, ..small_params() },
            Params { hierarchical_softmax: false, ..small_params() },
            Params {
                hierarchical_softmax: false,
                sampler: SamplerKind::Alias,
                ..small_params()
            },
            Params { sample: 1e-2, ..small_params() },
        ];
        for params in variants {
            let model = train_cbow(f.path(), &vocab, &tree, &params).unwrap();
            let values = embeddings(&vocab, &model);
            assert!(values.iter().flatten().all(|x| x.is_finite()), "{params:?}");
        }
    }

    #[test]
    fn many_threads() {
        let f = corpus(&text());
        let vocab = vocabulary::collect(f.path(), 1, 1000).unwrap();
        let tree = HuffmanTree::new(&vocab).unwrap();
        let params = Params {
            threads: 4,
            ..small_params()
        };
        let model = train_cbow(f.path(), &vocab, &tree, &params).unwrap();
        assert_eq!(model.len(), vocab.len());
        // Row padding is never touched.
        for id in 0..vocab.len() {
            let row = model.embeddings().row(id);
            assert!(row[params.vector_size..].iter().all(|c| c.get() == 0.0));
        }
    }

    #[test]
    fn learning_rate_decays_linearly_to_a_floor() {
        let f = corpus("a b c\n");
        let vocab = vocabulary::collect(f.path(), 1, 10).unwrap();
        let tree = HuffmanTree::new(&vocab).unwrap();
        let params = Params {
            iterations: 2,
            starting_alpha: 0.1,
            ..small_params()
        };
        let embeddings = Matrix::zeros(vocab.len(), params.vector_size).unwrap();
        let shared = SharedState {
            params: &params,
            vocab: &vocab,
            tree: &tree,
            embeddings: &embeddings,
            hierarchical_softmax: None,
            negative_sampling: None,
            sigmoid: SigmoidTable::new(),
            train_words: 1000,
            alpha: Real::new(params.starting_alpha),
            processed_words: AtomicU64::new(0),
            start: Instant::now(),
            progress: ProgressBar::hidden(),
        };
        let reader = TokenReader::open(f.path()).unwrap();
        let mut worker = Worker::new(&shared, reader, 1).unwrap();

        // Halfway through 2 iterations over 1000 words.
        worker.word_count = 1000;
        worker.update_alpha();
        assert_eq!(shared.processed_words.load(Ordering::Relaxed), 1000);
        let expected = 0.1 * (1.0 - 1000.0 / 2001.0);
        assert!((shared.alpha.get() - expected).abs() < 1e-6, "{}", shared.alpha.get());

        // Another thread's words count too.
        shared.processed_words.fetch_add(500, Ordering::Relaxed);
        worker.word_count = 1200;
        worker.update_alpha();
        assert_eq!(shared.processed_words.load(Ordering::Relaxed), 1700);
        let expected = 0.1 * (1.0 - 1700.0 / 2001.0);
        assert!((shared.alpha.get() - expected).abs() < 1e-6, "{}", shared.alpha.get());

        // Past the expected total the rate stays at its floor.
        worker.word_count = 5000;
        worker.update_alpha();
        assert!((shared.alpha.get() - 0.1 * 0.0001).abs() < 1e-9);
        assert_eq!(worker.last_word_count, 5000);
    }
}
