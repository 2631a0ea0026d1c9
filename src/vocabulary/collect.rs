//! One streaming pass over a corpus to count its tokens.
//!
//! The vocabulary has a fixed capacity. When it fills up, rare tokens are
//! pruned: survivors are spilled to a temporary file and read back into a
//! fresh table, which also compacts the arena.

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use super::{io, Vocabulary, SENTENCE_END_ID};
use crate::error::{io_error, Result};
use crate::token_reader::TokenReader;

/// How many tokens to read between load-factor checks.
const BATCH_SIZE: u64 = 10_000;

const MAX_LOAD_FACTOR: f32 = 0.7;

/// The first prune of a pass drops tokens seen only once.
const INITIAL_PRUNE_THRESHOLD: u64 = 2;

#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Where to put spill files. Defaults to the system temporary directory.
    pub spill_dir: Option<PathBuf>,
}

/// Count the tokens of `corpus`, keeping those seen at least `min_frequency`
/// times, in a vocabulary of at most `max_tokens` entries sorted by
/// descending count.
pub fn collect(corpus: &Path, min_frequency: u64, max_tokens: u32) -> Result<Vocabulary> {
    collect_with(corpus, min_frequency, max_tokens, &CollectOptions::default())
}

pub fn collect_with(
    corpus: &Path,
    min_frequency: u64,
    max_tokens: u32,
    options: &CollectOptions,
) -> Result<Vocabulary> {
    let mut vocab = Vocabulary::new(max_tokens)?;
    collect_tokens(corpus, min_frequency, &mut vocab, options)?;
    Ok(vocab)
}

/// Like [`collect`], but adds to the counts already in `vocab`.
pub fn collect_into(corpus: &Path, min_frequency: u64, vocab: &mut Vocabulary) -> Result<()> {
    collect_tokens(corpus, min_frequency, vocab, &CollectOptions::default())
}

fn collect_tokens(
    corpus: &Path,
    min_frequency: u64,
    vocab: &mut Vocabulary,
    options: &CollectOptions,
) -> Result<()> {
    let max_tokens = vocab.max_tokens() as usize;
    let mut reader = TokenReader::open(corpus)?;
    let mut threshold = INITIAL_PRUNE_THRESHOLD;
    let mut words: u64 = 0;

    while let Some(token) = reader.read()? {
        if vocab.len() >= max_tokens && !vocab.contains(token) {
            while vocab.len() >= max_tokens {
                // Make sure each round removes something.
                threshold = threshold.max(smallest_count(vocab) + 1);
                prune(vocab, threshold, options)?;
                threshold += 1;
            }
        }
        vocab.add(token)?;
        words += 1;

        if words % BATCH_SIZE == 0 && vocab.load_factor() > MAX_LOAD_FACTOR {
            prune(vocab, threshold, options)?;
            threshold += 1;
        }
    }

    if min_frequency > 1 {
        prune(vocab, min_frequency, options)?;
    }
    vocab.sort();
    info!(
        "collected {} distinct tokens from {} words of {:?}",
        vocab.len(),
        words,
        corpus
    );
    Ok(())
}

/// Smallest count of any token that can be pruned.
fn smallest_count(vocab: &Vocabulary) -> u64 {
    vocab
        .iter()
        .skip(SENTENCE_END_ID as usize + 1)
        .map(|(_, count)| count)
        .min()
        .unwrap_or(0)
}

/// Drop every token (but the end-of-sentence token) seen fewer than
/// `min_count` times. The survivors are reloaded into the same hash table
/// after the old tokens are released.
fn prune(vocab: &mut Vocabulary, min_count: u64, options: &CollectOptions) -> Result<()> {
    let dir = options.spill_dir.clone().unwrap_or_else(std::env::temp_dir);
    let spill = NamedTempFile::new_in(&dir).map_err(io_error("creating spill file in", &dir))?;
    let path = spill.path().to_path_buf();

    let mut writer = BufWriter::new(spill.as_file());
    io::write_binary(&mut writer, vocab, min_count, &path)?;
    writer.flush().map_err(io_error("writing", &path))?;
    drop(writer);

    let file = spill.reopen().map_err(io_error("reopening", &path))?;
    let before = vocab.len();
    io::reload_binary(BufReader::new(file), &path, vocab)?;
    debug!(
        "pruned tokens seen fewer than {} times: {} -> {} tokens",
        min_count,
        before,
        vocab.len()
    );
    Ok(())
}
