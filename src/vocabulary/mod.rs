//! The vocabulary: every distinct token of the corpus with its count.
//!
//! Token bytes live in an [`Arena`]; lookup goes through an open-addressing
//! hash table of token ids with linear probing. Id 0 is always the
//! end-of-sentence token.

mod collect;
mod io;

use std::cmp::Reverse;
use std::fmt;

pub use collect::{collect, collect_into, collect_with, CollectOptions};
pub use io::{load, load_filtered, read_binary, store, store_filtered, write_binary, write_tsv};

use crate::arena::{Arena, Handle};
use crate::error::{Error, Result};
use crate::token_reader::SENTENCE_END;

/// Id of the end-of-sentence token.
pub const SENTENCE_END_ID: u32 = 0;

const EMPTY_SLOT: u32 = u32::MAX;

const ARENA_BLOCK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct TokenInfo {
    bytes: Handle<u8>,
    count: u64,
}

pub struct Vocabulary {
    max_tokens: u32,
    arena: Arena,
    /// Token ids, or `EMPTY_SLOT`.
    hash: Vec<u32>,
    tokens: Vec<TokenInfo>,
}

/// Polynomial rolling hash, base 101.
fn hash_bytes(token: &[u8]) -> u32 {
    token
        .iter()
        .fold(0u32, |h, &b| h.wrapping_mul(101).wrapping_add(b as u32))
}

impl Vocabulary {
    /// An empty vocabulary (apart from the end-of-sentence token) that can
    /// hold up to `max_tokens` tokens.
    pub fn new(max_tokens: u32) -> Result<Self> {
        if max_tokens < 2 {
            return Err(Error::InvalidParams(format!(
                "a vocabulary needs room for at least 2 tokens, not {max_tokens}"
            )));
        }
        let hash_table_size = (max_tokens as usize * 10 / 7).max(max_tokens as usize + 1);
        let mut vocab = Vocabulary {
            max_tokens,
            arena: Arena::new(ARENA_BLOCK_SIZE),
            hash: vec![EMPTY_SLOT; hash_table_size],
            tokens: Vec::with_capacity((max_tokens as usize).min(1 << 20)),
        };
        vocab.insert_with_count(SENTENCE_END, 0)?;
        Ok(vocab)
    }

    /// Build a vocabulary from `(token, count)` pairs, then sort it.
    pub fn from_counts<'a>(
        max_tokens: u32,
        counts: impl IntoIterator<Item = (&'a [u8], u64)>,
    ) -> Result<Self> {
        let mut vocab = Vocabulary::new(max_tokens)?;
        for (token, count) in counts {
            vocab.insert_with_count(token, count)?;
        }
        vocab.sort();
        Ok(vocab)
    }

    /// Forget every token but the end-of-sentence token, whose count is reset.
    /// The hash table is kept; the arena is released.
    pub fn clear(&mut self) -> Result<()> {
        self.hash.fill(EMPTY_SLOT);
        self.tokens.clear();
        self.arena = Arena::new(ARENA_BLOCK_SIZE);
        self.insert_with_count(SENTENCE_END, 0)?;
        Ok(())
    }

    /// Find `token`'s slot: either the slot holding its id, or the empty slot
    /// where it would go.
    fn probe(&self, token: &[u8]) -> usize {
        let size = self.hash.len();
        let mut slot = hash_bytes(token) as usize % size;
        loop {
            let id = self.hash[slot];
            if id == EMPTY_SLOT || self.token(id) == token {
                return slot;
            }
            slot += 1;
            if slot == size {
                slot = 0;
            }
        }
    }

    /// Count one more occurrence of `token`, adding it if it is new. Returns its id.
    ///
    /// Adding a new token to a vocabulary that already holds `max_tokens`
    /// tokens fails with [`Error::VocabularyFull`].
    pub fn add(&mut self, token: &[u8]) -> Result<u32> {
        let slot = self.probe(token);
        let id = self.hash[slot];
        if id != EMPTY_SLOT {
            self.tokens[id as usize].count += 1;
            return Ok(id);
        }
        self.push(slot, token, 1)
    }

    /// Add `token` with the given count, or overwrite its count if present.
    pub fn insert_with_count(&mut self, token: &[u8], count: u64) -> Result<u32> {
        let slot = self.probe(token);
        let id = self.hash[slot];
        if id != EMPTY_SLOT {
            self.tokens[id as usize].count = count;
            return Ok(id);
        }
        self.push(slot, token, count)
    }

    fn push(&mut self, slot: usize, token: &[u8], count: u64) -> Result<u32> {
        // The hash table has more slots than `max_tokens`, so it always keeps
        // an empty slot and probing terminates.
        if self.tokens.len() >= self.max_tokens as usize {
            return Err(Error::VocabularyFull {
                max_tokens: self.max_tokens,
            });
        }
        let id = self.tokens.len() as u32;
        let bytes = self.arena.alloc_copy(token)?;
        self.tokens.push(TokenInfo { bytes, count });
        self.hash[slot] = id;
        Ok(id)
    }

    pub fn id(&self, token: &[u8]) -> Option<u32> {
        match self.hash[self.probe(token)] {
            EMPTY_SLOT => None,
            id => Some(id),
        }
    }

    pub fn contains(&self, token: &[u8]) -> bool {
        self.id(token).is_some()
    }

    /// The bytes of token `id`. Panics if `id` is out of range.
    pub fn token(&self, id: u32) -> &[u8] {
        self.arena.get(self.tokens[id as usize].bytes)
    }

    /// Number of occurrences of token `id`. Panics if `id` is out of range.
    pub fn count(&self, id: u32) -> u64 {
        self.tokens[id as usize].count
    }

    /// Number of distinct tokens, the end-of-sentence token included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if there is nothing but the end-of-sentence token.
    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= 1
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub(crate) fn hash_table_size(&self) -> usize {
        self.hash.len()
    }

    #[cfg(test)]
    pub(crate) fn hash_table_ptr(&self) -> *const u32 {
        self.hash.as_ptr()
    }

    pub fn load_factor(&self) -> f32 {
        (self.tokens.len() as f64 / self.hash.len() as f64) as f32
    }

    /// Total number of token occurrences the vocabulary accounts for.
    pub fn text_word_count(&self) -> u64 {
        self.tokens.iter().map(|t| t.count).sum()
    }

    /// Sort by descending count, ties by ascending bytes, keeping the
    /// end-of-sentence token at id 0. Ids change, so the hash index is rebuilt.
    pub fn sort(&mut self) {
        let arena = &self.arena;
        self.tokens[1..].sort_by(|a, b| {
            Reverse(a.count)
                .cmp(&Reverse(b.count))
                .then_with(|| arena.get(a.bytes).cmp(arena.get(b.bytes)))
        });

        self.hash.fill(EMPTY_SLOT);
        let size = self.hash.len();
        for (id, info) in self.tokens.iter().enumerate() {
            let mut slot = hash_bytes(self.arena.get(info.bytes)) as usize % size;
            while self.hash[slot] != EMPTY_SLOT {
                slot = (slot + 1) % size;
            }
            self.hash[slot] = id as u32;
        }
    }

    /// `(token, count)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> + '_ {
        self.tokens
            .iter()
            .map(move |info| (self.arena.get(info.bytes), info.count))
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vocabulary")
            .field("max_tokens", &self.max_tokens)
            .field("len", &self.tokens.len())
            .field("hash_table_size", &self.hash.len())
            .finish()
    }
}
