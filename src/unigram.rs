//! Drawing negative samples from the smoothed unigram distribution,
//! `P(id) ∝ count(id)^0.75`.
//!
//! Two samplers: the classic flat table, which is approximate but has a single
//! memory access per draw, and Vose's alias method, which is exact.

use aligned_box::AlignedBox;

use crate::error::{Error, Result};
use crate::matrix::ALIGNMENT;
use crate::rng::Rng;
use crate::vocabulary::{Vocabulary, SENTENCE_END_ID};

const POWER: f64 = 0.75;

pub const DEFAULT_TABLE_SIZE: usize = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerKind {
    #[default]
    Table,
    Alias,
}

fn weight(count: u64) -> f64 {
    (count as f64).powf(POWER)
}

fn check_vocab(vocab: &Vocabulary) -> Result<()> {
    if vocab.is_empty() {
        Err(Error::EmptyVocabulary)
    } else {
        Ok(())
    }
}

/// The sampler the trainer uses, picked by [`SamplerKind`].
pub enum UnigramDistribution {
    Table(UnigramTable),
    Alias(AliasTable),
}

impl UnigramDistribution {
    pub fn new(vocab: &Vocabulary, kind: SamplerKind, table_size: usize) -> Result<Self> {
        Ok(match kind {
            SamplerKind::Table => {
                UnigramDistribution::Table(UnigramTable::with_size(vocab, table_size)?)
            }
            SamplerKind::Alias => UnigramDistribution::Alias(AliasTable::new(vocab)?),
        })
    }

    /// Draw a token id. Never returns the end-of-sentence token.
    #[inline]
    pub fn sample(&self, rng: &mut Rng) -> u32 {
        match self {
            UnigramDistribution::Table(t) => t.sample(rng),
            UnigramDistribution::Alias(a) => a.sample(rng),
        }
    }
}

/// Each id owns a run of table slots proportional to its weight.
pub struct UnigramTable {
    table: AlignedBox<[u32]>,
    vocab_size: u32,
}

impl UnigramTable {
    pub fn new(vocab: &Vocabulary) -> Result<Self> {
        UnigramTable::with_size(vocab, DEFAULT_TABLE_SIZE)
    }

    pub fn with_size(vocab: &Vocabulary, size: usize) -> Result<Self> {
        check_vocab(vocab)?;
        if size == 0 {
            return Err(Error::InvalidParams("unigram table size must be positive".into()));
        }
        let mut table = AlignedBox::<[u32]>::slice_from_default(ALIGNMENT, size).map_err(|err| {
            Error::Allocation {
                bytes: size * std::mem::size_of::<u32>(),
                message: format!("{err:?}"),
            }
        })?;

        let counts: Vec<u64> = vocab.iter().map(|(_, count)| count).collect();
        let total: f64 = counts.iter().map(|&c| weight(c)).sum();
        let last = counts.len() as u32 - 1;
        let mut id = 0u32;
        let mut cumulative = weight(counts[0]) / total;
        for (index, slot) in table.iter_mut().enumerate() {
            *slot = id;
            if index as f64 / size as f64 > cumulative {
                id = (id + 1).min(last);
                cumulative += weight(counts[id as usize]) / total;
            }
        }

        Ok(UnigramTable {
            table,
            vocab_size: counts.len() as u32,
        })
    }

    #[inline]
    pub fn sample(&self, rng: &mut Rng) -> u32 {
        let r = rng.rand_u64();
        match self.table[((r >> 16) % self.table.len() as u64) as usize] {
            // Slots owned by the end-of-sentence token fall back to a uniform draw.
            SENTENCE_END_ID => (r % (self.vocab_size as u64 - 1)) as u32 + 1,
            id => id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AliasEntry {
    prob: f32,
    alias: u32,
}

/// Vose's alias method over ids `1 .. n`.
pub struct AliasTable {
    entries: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn new(vocab: &Vocabulary) -> Result<Self> {
        check_vocab(vocab)?;
        let weights: Vec<f64> = vocab.iter().skip(1).map(|(_, count)| weight(count)).collect();
        let m = weights.len();
        let total: f64 = weights.iter().sum();

        // Scaled so that the average is 1.
        let mut scaled: Vec<f64> = if total > 0.0 {
            weights.iter().map(|w| w * m as f64 / total).collect()
        } else {
            vec![1.0; m]
        };

        let mut entries = vec![AliasEntry::default(); m];
        let (mut small, mut large): (Vec<usize>, Vec<usize>) =
            (0..m).partition(|&i| scaled[i] < 1.0);
        while let (Some(&s), Some(&l)) = (small.last(), large.last()) {
            small.pop();
            entries[s] = AliasEntry {
                prob: scaled[s] as f32,
                alias: l as u32 + 1,
            };
            scaled[l] -= 1.0 - scaled[s];
            if scaled[l] < 1.0 {
                large.pop();
                small.push(l);
            }
        }
        // Whatever is left is 1 up to rounding error.
        for i in small.into_iter().chain(large) {
            entries[i] = AliasEntry {
                prob: 1.0,
                alias: i as u32 + 1,
            };
        }

        Ok(AliasTable { entries })
    }

    #[inline]
    pub fn sample(&self, rng: &mut Rng) -> u32 {
        let u = rng.rand_unit_exclusive() * self.entries.len() as f64;
        let i = (u as usize).min(self.entries.len() - 1);
        let entry = self.entries[i];
        if ((u - i as f64) as f32) < entry.prob {
            i as u32 + 1
        } else {
            entry.alias
        }
    }
}
