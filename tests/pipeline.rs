//! End-to-end runs: corpus to vocabulary to trained vectors on disk.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use tempfile::{tempdir, NamedTempFile};

use cbowvec::model::SavedModel;
use cbowvec::vocabulary;
use cbowvec::*;

fn write_corpus(path: &Path, lines: usize) {
    let mut f = std::fs::File::create(path).unwrap();
    for i in 0..lines {
        writeln!(f, "the quick brown fox jumps over the lazy dog {}", i % 5).unwrap();
        writeln!(f, "a lazy cat sleeps all day {}", i % 3).unwrap();
    }
}

fn params() -> Params {
    Params {
        iterations: 2,
        vector_size: 16,
        window: 3,
        negative: 4,
        hierarchical_softmax: true,
        unigram_table_size: 100_000,
        threads: 2,
        ..Params::default()
    }
}

#[test]
fn library_pipeline() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    write_corpus(&corpus, 300);

    let vocab = vocabulary::collect(&corpus, 2, 1000).unwrap();
    assert_eq!(vocab.token(0), b"</s>");
    assert_eq!(vocab.count(0), 600);
    // "lazy" and "the" tie; ties sort by bytes.
    assert_eq!(vocab.token(1), b"lazy");
    assert_eq!(vocab.token(2), b"the");
    assert_eq!(vocab.count(2), 600);

    // The vocabulary survives a round trip through disk.
    let vocab_path = dir.path().join("vocab.bin");
    vocabulary::store(&vocab_path, &vocab).unwrap();
    let vocab = vocabulary::load(&vocab_path).unwrap();

    let tree = HuffmanTree::new(&vocab).unwrap();
    let model = train_cbow(&corpus, &vocab, &tree, &params()).unwrap();
    assert_eq!(model.len(), vocab.len());
    assert_eq!(model.vector_size(), 16);

    let out = dir.path().join("model.bincode");
    model::save(&out, &vocab, &model, OutputFormat::Bincode).unwrap();
    let saved = SavedModel::load(&out).unwrap();
    assert_eq!(saved.vocab.len(), vocab.len());
    for id in 0..vocab.len() {
        assert_eq!(saved.vector(id), model.vector(id as u32).as_slice());
        assert!(saved.vector(id).iter().all(|x| x.is_finite()));
    }
}

#[test]
fn vocabulary_from_disk_skips_unknown_words() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    write_corpus(&corpus, 50);

    // A vocabulary that knows only some of the corpus.
    let vocab = Vocabulary::from_counts(
        10,
        [(&b"lazy"[..], 100), (&b"dog"[..], 50), (&b"cat"[..], 50)],
    )
    .unwrap();
    let tree = HuffmanTree::new(&vocab).unwrap();
    let model = train_cbow(&corpus, &vocab, &tree, &params()).unwrap();
    assert_eq!(model.len(), 4);
}

#[test]
fn single_shard_runs_are_identical() {
    let mut corpus = NamedTempFile::new().unwrap();
    for i in 0..100 {
        writeln!(corpus, "one two three four five six {}", i % 4).unwrap();
    }
    corpus.flush().unwrap();

    let vocab = vocabulary::collect(corpus.path(), 1, 100).unwrap();
    let tree = HuffmanTree::new(&vocab).unwrap();
    let params = Params {
        threads: 1,
        sampler: SamplerKind::Alias,
        ..params()
    };
    let a = train_cbow(corpus.path(), &vocab, &tree, &params).unwrap();
    let b = train_cbow(corpus.path(), &vocab, &tree, &params).unwrap();
    for id in 0..vocab.len() as u32 {
        assert_eq!(a.vector(id), b.vector(id));
    }
}

#[test]
fn command_line() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.txt");
    write_corpus(&corpus, 100);
    let output = dir.path().join("vectors.txt");
    let tsv = dir.path().join("vocab.tsv");
    let vocab_bin = dir.path().join("vocab.bin");

    let status = Command::new(env!("CARGO_BIN_EXE_cbowvec"))
        .arg("--train")
        .arg(&corpus)
        .arg("--output")
        .arg(&output)
        .args(["--size", "8", "--iter", "1", "--threads", "2", "--min-count", "1"])
        .args(["--unigram-table-size", "10000", "--quiet"])
        .arg("--save-vocab-tsv")
        .arg(&tsv)
        .arg("--save-vocab")
        .arg(&vocab_bin)
        .status()
        .unwrap();
    assert!(status.success());

    let text = std::fs::read_to_string(&output).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    let vocab = vocabulary::load(&vocab_bin).unwrap();
    assert_eq!(header, format!("{} 8", vocab.len()));
    for line in lines {
        assert_eq!(line.split_whitespace().count(), 9);
    }

    let tsv = std::fs::read_to_string(&tsv).unwrap();
    assert_eq!(tsv.lines().next(), Some("200\t</s>"));
}

#[test]
fn command_line_reports_errors() {
    let dir = tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_cbowvec"))
        .arg("--train")
        .arg(dir.path().join("missing.txt"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.txt"), "{stderr}");
}
