//! Huffman coding of the vocabulary, for hierarchical softmax.
//!
//! Each token is a leaf. The `n - 1` internal nodes are numbered `0 .. n - 1`
//! and each owns one row of the output matrix; the root is `n - 2`. A token's
//! code is the sequence of left/right turns from the root to its leaf, and its
//! path is the sequence of internal nodes passed on the way. Both are stored
//! root first and have the same length.

use std::fmt;

use log::debug;

use crate::arena::{Arena, Handle};
use crate::error::{Error, Result};
use crate::vocabulary::Vocabulary;

/// Longest code we accept. Counts that fit in a `u64` can't produce a tree
/// deeper than about 92 levels, so this only trips on corrupt input.
pub const MAX_CODE_LENGTH: usize = 100;

const ARENA_BLOCK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Clone, Copy)]
struct Leaf {
    code: Handle<u8>,
    path: Handle<u32>,
}

pub struct HuffmanTree {
    arena: Arena,
    /// Indexed by token id.
    leaves: Vec<Leaf>,
}

impl HuffmanTree {
    pub fn new(vocab: &Vocabulary) -> Result<Self> {
        let counts: Vec<u64> = vocab.iter().map(|(_, count)| count).collect();
        let tree = HuffmanTree::build(&counts, MAX_CODE_LENGTH)?;
        debug!(
            "built Huffman tree over {} tokens, longest code {} bits",
            tree.len(),
            (0..tree.len() as u32).map(|id| tree.code(id).len()).max().unwrap_or(0)
        );
        Ok(tree)
    }

    fn build(counts: &[u64], max_code_length: usize) -> Result<Self> {
        let n = counts.len();
        let mut arena = Arena::new(ARENA_BLOCK_SIZE);
        let mut leaves = vec![
            Leaf {
                code: Handle::EMPTY,
                path: Handle::EMPTY,
            };
            n
        ];
        if n <= 1 {
            return Ok(HuffmanTree { arena, leaves });
        }

        // Leaves by descending count. The vocabulary is normally sorted
        // already, apart from the end-of-sentence token at id 0.
        let mut order: Vec<u32> = (0..n as u32).collect();
        order.sort_by_key(|&id| std::cmp::Reverse(counts[id as usize]));

        // Nodes 0..n are leaves in `order`, nodes n..2n-1 are internal nodes
        // in creation order. Both halves have non-decreasing weight moving
        // outward from the middle, so the two lightest nodes are always found
        // at one of the two cursors.
        let mut weight = vec![0u64; 2 * n - 1];
        for (i, &id) in order.iter().enumerate() {
            weight[i] = counts[id as usize];
        }
        let mut parent = vec![0usize; 2 * n - 1];
        let mut bit = vec![0u8; 2 * n - 1];

        let mut leaf_cursor = n;
        let mut node_cursor = n;
        // `created` is one past the last internal node built so far.
        let mut pick = |weight: &[u64], created: usize| {
            if leaf_cursor > 0
                && (node_cursor == created || weight[leaf_cursor - 1] < weight[node_cursor])
            {
                leaf_cursor -= 1;
                leaf_cursor
            } else {
                node_cursor += 1;
                node_cursor - 1
            }
        };
        for node in n..2 * n - 1 {
            let first = pick(&weight, node);
            let second = pick(&weight, node);
            weight[node] = weight[first]
                .checked_add(weight[second])
                .ok_or(Error::CountOverflow)?;
            parent[first] = node;
            parent[second] = node;
            bit[second] = 1;
        }

        let root = 2 * n - 2;
        let mut code = Vec::with_capacity(max_code_length);
        let mut path = Vec::with_capacity(max_code_length);
        for (i, &id) in order.iter().enumerate() {
            code.clear();
            path.clear();
            let mut node = i;
            while node != root {
                if code.len() == max_code_length {
                    return Err(Error::CodeTooLong {
                        id,
                        max: max_code_length,
                    });
                }
                code.push(bit[node]);
                node = parent[node];
                path.push((node - n) as u32);
            }
            code.reverse();
            path.reverse();
            leaves[id as usize] = Leaf {
                code: arena.alloc_copy(&code)?,
                path: arena.alloc_copy(&path)?,
            };
        }

        Ok(HuffmanTree { arena, leaves })
    }

    /// Number of leaves, the same as the vocabulary size.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Number of internal nodes, i.e. rows the output matrix needs.
    pub fn internal_nodes(&self) -> usize {
        self.leaves.len().saturating_sub(1)
    }

    /// The turns (0 or 1) from the root to token `id`.
    pub fn code(&self, id: u32) -> &[u8] {
        self.arena.get(self.leaves[id as usize].code)
    }

    /// The internal nodes from the root to token `id`'s parent.
    pub fn path(&self, id: u32) -> &[u32] {
        self.arena.get(self.leaves[id as usize].path)
    }
}

impl fmt::Debug for HuffmanTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuffmanTree")
            .field("leaves", &self.leaves.len())
            .finish_non_exhaustive()
    }
}
