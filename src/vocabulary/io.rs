//! Saving and loading vocabularies.
//!
//! Binary layout, all integers little-endian:
//!
//! ```text
//! magic            16 bytes
//! version          u32, check(version)
//! max_tokens       u32, check(max_tokens)
//! hash_table_size  u32, check(hash_table_size)
//! token_count      u32, check(token_count)
//! token_count times:
//!     count u64, length u16, bytes
//! ```
//!
//! where `check(v) = v * 2654435761` (wrapping). The end-of-sentence token is
//! always written first and always kept, whatever the minimum count.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{Vocabulary, SENTENCE_END_ID};
use crate::error::{io_error, Error, Result};
use crate::token_reader::MAX_TOKEN_LENGTH;

const MAGIC: &[u8; 16] = b"cbowvec vocab\0\0\0";
const VERSION: u32 = 1;

fn check(value: u32) -> u32 {
    value.wrapping_mul(2654435761)
}

fn keep(id: u32, count: u64, min_count: u64) -> bool {
    id == SENTENCE_END_ID || count >= min_count
}

/// Write `vocab` in binary form, leaving out tokens seen fewer than
/// `min_count` times. `path` is only used in error messages.
pub fn write_binary<W: Write>(
    mut writer: W,
    vocab: &Vocabulary,
    min_count: u64,
    path: &Path,
) -> Result<()> {
    let kept = (0..vocab.len() as u32)
        .filter(|&id| keep(id, vocab.count(id), min_count))
        .count() as u32;

    let mut write = |bytes: &[u8]| writer.write_all(bytes).map_err(io_error("writing", path));
    write(MAGIC)?;
    for field in [VERSION, vocab.max_tokens(), vocab.hash_table_size() as u32, kept] {
        write(&field.to_le_bytes())?;
        write(&check(field).to_le_bytes())?;
    }
    for (id, (token, count)) in vocab.iter().enumerate() {
        if !keep(id as u32, count, min_count) {
            continue;
        }
        write(&count.to_le_bytes())?;
        write(&(token.len() as u16).to_le_bytes())?;
        write(token)?;
    }
    Ok(())
}

struct FieldReader<'p, R> {
    inner: R,
    path: &'p Path,
}

impl<R: Read> FieldReader<'_, R> {
    fn format_error(&self, reason: impl Into<String>) -> Error {
        Error::Format {
            path: self.path.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                self.format_error("file is truncated")
            } else {
                io_error("reading", self.path)(err)
            }
        })
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_checked_u32(&mut self, name: &str) -> Result<u32> {
        let value = u32::from_le_bytes(self.read_array()?);
        let stored = u32::from_le_bytes(self.read_array()?);
        if stored != check(value) {
            return Err(self.format_error(format!("check value of {name} does not match")));
        }
        Ok(value)
    }
}

struct Header {
    max_tokens: u32,
    hash_table_size: u32,
    token_count: u32,
}

fn read_header<R: Read>(r: &mut FieldReader<'_, R>) -> Result<Header> {
    let magic: [u8; 16] = r.read_array()?;
    if &magic != MAGIC {
        return Err(r.format_error("not a vocabulary file (bad magic)"));
    }
    let version = r.read_checked_u32("version")?;
    if version != VERSION {
        return Err(r.format_error(format!("unsupported version {version}")));
    }
    let max_tokens = r.read_checked_u32("max_tokens")?;
    let hash_table_size = r.read_checked_u32("hash_table_size")?;
    let token_count = r.read_checked_u32("token_count")?;
    if max_tokens < 2 {
        return Err(r.format_error(format!("max_tokens {max_tokens} is too small")));
    }
    if token_count > max_tokens {
        return Err(r.format_error(format!(
            "{token_count} tokens do not fit in a vocabulary of {max_tokens}"
        )));
    }

    Ok(Header {
        max_tokens,
        hash_table_size,
        token_count,
    })
}

fn read_tokens<R: Read>(
    r: &mut FieldReader<'_, R>,
    header: &Header,
    min_count: u64,
    vocab: &mut Vocabulary,
) -> Result<()> {
    if vocab.hash_table_size() != header.hash_table_size as usize {
        return Err(r.format_error(format!(
            "hash table size {} does not match max_tokens {}",
            header.hash_table_size, header.max_tokens
        )));
    }
    let mut token = Vec::with_capacity(MAX_TOKEN_LENGTH);
    for i in 0..header.token_count {
        let count = u64::from_le_bytes(r.read_array()?);
        let len = u16::from_le_bytes(r.read_array()?) as usize;
        if len > MAX_TOKEN_LENGTH {
            return Err(r.format_error(format!("token {i} is {len} bytes long")));
        }
        token.resize(len, 0);
        r.read_exact(&mut token)?;
        if i == 0 || count >= min_count {
            vocab.insert_with_count(&token, count)?;
        }
    }
    Ok(())
}

/// Read a vocabulary written by [`write_binary`], dropping tokens seen fewer
/// than `min_count` times. The result is in file order; callers that filtered
/// or edited it should [`sort`](Vocabulary::sort) it again.
pub fn read_binary<R: Read>(reader: R, path: &Path, min_count: u64) -> Result<Vocabulary> {
    let mut r = FieldReader {
        inner: reader,
        path,
    };
    let header = read_header(&mut r)?;
    let mut vocab = Vocabulary::new(header.max_tokens)?;
    read_tokens(&mut r, &header, min_count, &mut vocab)?;
    Ok(vocab)
}

/// Replace the contents of `vocab` with a vocabulary written by
/// [`write_binary`] with the same capacity. The old tokens are released
/// before the new ones are read.
pub(crate) fn reload_binary<R: Read>(reader: R, path: &Path, vocab: &mut Vocabulary) -> Result<()> {
    let mut r = FieldReader {
        inner: reader,
        path,
    };
    let header = read_header(&mut r)?;
    if header.max_tokens != vocab.max_tokens() {
        return Err(r.format_error(format!(
            "max_tokens {} does not match the vocabulary being reloaded ({})",
            header.max_tokens,
            vocab.max_tokens()
        )));
    }
    vocab.clear()?;
    read_tokens(&mut r, &header, 0, vocab)
}

/// Save `vocab` to `path` in binary form.
pub fn store(path: &Path, vocab: &Vocabulary) -> Result<()> {
    store_filtered(path, vocab, 0)
}

/// Save the tokens of `vocab` seen at least `min_count` times.
pub fn store_filtered(path: &Path, vocab: &Vocabulary, min_count: u64) -> Result<()> {
    let file = File::create(path).map_err(io_error("creating", path))?;
    let mut writer = BufWriter::new(file);
    write_binary(&mut writer, vocab, min_count, path)?;
    writer.flush().map_err(io_error("writing", path))
}

/// Load a vocabulary saved by [`store`].
pub fn load(path: &Path) -> Result<Vocabulary> {
    load_filtered(path, 0)
}

/// Load the tokens of a saved vocabulary seen at least `min_count` times,
/// sorted by descending count.
pub fn load_filtered(path: &Path, min_count: u64) -> Result<Vocabulary> {
    let file = File::open(path).map_err(io_error("opening", path))?;
    let mut vocab = read_binary(BufReader::new(file), path, min_count)?;
    vocab.sort();
    Ok(vocab)
}

/// Write `count<TAB>token` lines in id order, for people to read.
pub fn write_tsv(path: &Path, vocab: &Vocabulary) -> Result<()> {
    let file = File::create(path).map_err(io_error("creating", path))?;
    let mut writer = BufWriter::new(file);
    for (token, count) in vocab.iter() {
        write!(writer, "{count}\t").map_err(io_error("writing", path))?;
        writer.write_all(token).map_err(io_error("writing", path))?;
        writer.write_all(b"\n").map_err(io_error("writing", path))?;
    }
    writer.flush().map_err(io_error("writing", path))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tempfile::tempdir;

    use super::*;
    use crate::token_reader::SENTENCE_END;

    fn sample() -> Vocabulary {
        Vocabulary::from_counts(
            50,
            [
                (&b"the"[..], 40),
                (&b"cat"[..], 7),
                (&b"sat"[..], 3),
                (&b"\xff\xfe"[..], 1),
                (SENTENCE_END, 12),
            ],
        )
        .unwrap()
    }

    fn contents(vocab: &Vocabulary) -> Vec<(Vec<u8>, u64)> {
        let mut all: Vec<_> = vocab.iter().map(|(t, c)| (t.to_vec(), c)).collect();
        all.sort();
        all
    }

    #[test]
    fn store_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vocab.bin");
        let vocab = sample();
        store(&path, &vocab).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(contents(&loaded), contents(&vocab));
        assert_eq!(loaded.max_tokens(), 50);
        assert_eq!(loaded.token(SENTENCE_END_ID), SENTENCE_END);
        assert_eq!(loaded.token(1), b"the");
    }

    #[test]
    fn min_count_filter_keeps_sentence_end() {
        let vocab =
            Vocabulary::from_counts(10, [(&b"often"[..], 5), (&b"once"[..], 1)]).unwrap();
        let path = Path::new("memory");

        let mut buf = vec![];
        write_binary(&mut buf, &vocab, 3, path).unwrap();
        let loaded = read_binary(&buf[..], path, 0).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.id(SENTENCE_END), Some(0));
        assert_eq!(loaded.count(0), 0);
        assert!(loaded.contains(b"often"));

        let mut buf = vec![];
        write_binary(&mut buf, &vocab, 0, path).unwrap();
        let loaded = read_binary(&buf[..], path, 2).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!loaded.contains(b"once"));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = vec![];
        write_binary(&mut buf, &sample(), 0, Path::new("x")).unwrap();
        buf[0] ^= 1;
        let err = read_binary(&buf[..], Path::new("x"), 0).err().unwrap();
        assert!(matches!(err, Error::Format { ref reason, .. } if reason.contains("magic")));
    }

    #[test]
    fn rejects_corrupt_header() {
        let mut buf = vec![];
        write_binary(&mut buf, &sample(), 0, Path::new("x")).unwrap();
        // Low byte of max_tokens.
        buf[24] ^= 0x10;
        let err = read_binary(&buf[..], Path::new("x"), 0).err().unwrap();
        assert!(matches!(err, Error::Format { ref reason, .. } if reason.contains("max_tokens")));
    }

    #[test]
    fn rejects_truncated_file() {
        let mut buf = vec![];
        write_binary(&mut buf, &sample(), 0, Path::new("x")).unwrap();
        buf.truncate(buf.len() - 2);
        let err = read_binary(&buf[..], Path::new("x"), 0).err().unwrap();
        assert!(matches!(err, Error::Format { ref reason, .. } if reason.contains("truncated")));
    }

    #[test]
    fn tsv_lists_counts_and_tokens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vocab.tsv");
        write_tsv(&path, &sample()).unwrap();
        let text = std::fs::read(&path).unwrap();
        let lines: Vec<&[u8]> = text.split(|&b| b == b'\n').collect();
        assert_eq!(lines[0], b"12\t</s>");
        assert_eq!(lines[1], b"40\tthe");
        assert_eq!(lines[2], b"7\tcat");
        assert_eq!(lines.len(), 6);
    }

    proptest! {
        #[test]
        fn round_trip_preserves_counts(
            entries in prop::collection::hash_map(
                prop::collection::vec(b'a'..=b'z', 1..12),
                1u64..1000,
                0..60,
            )
        ) {
            let vocab = Vocabulary::from_counts(
                100,
                entries.iter().map(|(t, &c)| (t.as_slice(), c)),
            )
            .unwrap();
            let mut buf = vec![];
            write_binary(&mut buf, &vocab, 0, Path::new("mem")).unwrap();
            let loaded = read_binary(&buf[..], Path::new("mem"), 0).unwrap();
            prop_assert_eq!(contents(&loaded), contents(&vocab));
        }
    }
}
