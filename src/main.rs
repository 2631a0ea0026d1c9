use std::path::PathBuf;
use std::process;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use cbowvec::unigram::DEFAULT_TABLE_SIZE;
use cbowvec::vocabulary::{self, Vocabulary};
use cbowvec::{model, real, train_cbow, HuffmanTree, OutputFormat, Params, SamplerKind};

fn default_threads() -> usize {
    let cpus = thread::available_parallelism().map_or(1, |n| n.get());
    (cpus + 1) / 2
}

#[derive(Parser)]
#[command(
    about = "Train word vectors with the continuous bag-of-words model",
    long_about = None,
    version
)]
struct Options {
    /// Use text data from FILE to train the model
    #[arg(long = "train", value_name = "FILE")]
    train_file: PathBuf,

    /// Use FILE to save the resulting word vectors
    #[arg(long = "output", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Set size of word vectors
    #[arg(long = "size", default_value_t = 100)]
    vector_size: usize,

    /// Set max skip length between words
    #[arg(long, default_value_t = 5)]
    window: usize,

    /// Set threshold for occurrence of words. Those that appear with higher
    /// frequency in the training data will be randomly down-sampled; useful
    /// range is (0, 1e-5); 0 disables
    #[arg(long, default_value_t = 1e-3)]
    sample: real,

    /// Use hierarchical softmax
    #[arg(long)]
    hs: bool,

    /// Number of negative examples; common values are 3 - 10 (0 = not used)
    #[arg(long, default_value_t = 5)]
    negative: usize,

    /// Use N threads (default: half the available CPUs)
    #[arg(long = "threads", value_name = "N")]
    threads: Option<usize>,

    /// Run more training iterations
    #[arg(long, default_value_t = 5)]
    iter: u32,

    /// Discard words that appear less than N times
    #[arg(long = "min-count", value_name = "N", default_value_t = 5)]
    min_count: u64,

    /// Set the starting learning rate
    #[arg(long, default_value_t = 0.05)]
    alpha: real,

    /// Split sentences longer than N words
    #[arg(long = "max-sentence-length", value_name = "N", default_value_t = 1000)]
    max_sentence_length: usize,

    /// Seed for the random number generator
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Draw negative samples with the alias method instead of a lookup table
    #[arg(long = "exact-sampling")]
    exact_sampling: bool,

    /// Number of entries in the negative-sampling lookup table
    #[arg(long = "unigram-table-size", value_name = "N", default_value_t = DEFAULT_TABLE_SIZE)]
    unigram_table_size: usize,

    /// Keep at most N distinct words while reading the training data
    #[arg(
        long = "max-vocab-size",
        value_name = "N",
        default_value_t = 21_000_000,
        value_parser = clap::value_parser!(u32).range(2..)
    )]
    max_vocab_size: u32,

    /// Format of the output file
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// The vocabulary will be saved to FILE
    #[arg(long = "save-vocab", value_name = "FILE")]
    save_vocab_file: Option<PathBuf>,

    /// The vocabulary will be saved to FILE as `count<TAB>word` lines
    #[arg(long = "save-vocab-tsv", value_name = "FILE")]
    save_vocab_tsv_file: Option<PathBuf>,

    /// The vocabulary will be read from FILE, not constructed from the training data
    #[arg(long = "read-vocab", value_name = "FILE")]
    read_vocab_file: Option<PathBuf>,

    /// Don't show a progress bar
    #[arg(long, short)]
    quiet: bool,
}

impl Options {
    fn params(&self) -> Params {
        Params {
            iterations: self.iter,
            starting_alpha: self.alpha,
            max_sentence_length: self.max_sentence_length,
            sample: self.sample,
            negative: self.negative,
            hierarchical_softmax: self.hs,
            vector_size: self.vector_size,
            window: self.window,
            seed: self.seed,
            threads: self.threads.unwrap_or_else(default_threads),
            sampler: if self.exact_sampling {
                SamplerKind::Alias
            } else {
                SamplerKind::Table
            },
            unigram_table_size: self.unigram_table_size,
            show_progress: !self.quiet,
        }
    }
}

fn build_vocabulary(options: &Options) -> Result<Vocabulary> {
    let vocab = match &options.read_vocab_file {
        Some(path) => vocabulary::load_filtered(path, options.min_count)
            .with_context(|| format!("failed to read vocabulary from {path:?}"))?,
        None => vocabulary::collect(&options.train_file, options.min_count, options.max_vocab_size)
            .context("failed to build vocabulary from training data")?,
    };
    info!("vocabulary size: {}", vocab.len());
    info!("words in train file: {}", vocab.text_word_count());

    if let Some(path) = &options.save_vocab_file {
        vocabulary::store(path, &vocab).context("failed to save vocabulary")?;
    }
    if let Some(path) = &options.save_vocab_tsv_file {
        vocabulary::write_tsv(path, &vocab).context("failed to save vocabulary")?;
    }
    Ok(vocab)
}

fn run(options: &Options) -> Result<()> {
    let params = options.params();
    params.validate()?;

    let vocab = build_vocabulary(options)?;
    let output_file = match &options.output_file {
        Some(f) => f,
        None => return Ok(()),
    };

    let tree = HuffmanTree::new(&vocab).context("failed to build Huffman tree")?;
    let model = train_cbow(&options.train_file, &vocab, &tree, &params).context("training failed")?;
    model::save(output_file, &vocab, &model, options.format).context("failed to save vectors")?;
    info!("saved {} vectors to {:?}", model.len(), output_file);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = Options::parse();
    if let Err(err) = run(&options) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}
