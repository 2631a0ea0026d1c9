//! Trained embeddings and the formats they are saved in.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_error, Error, Result};
use crate::matrix::{Matrix, Real};
use crate::real;
use crate::vocabulary::Vocabulary;

/// The input embeddings learned by [`train_cbow`](crate::train_cbow), one row
/// per vocabulary id.
#[derive(Debug)]
pub struct Model {
    embeddings: Matrix,
}

impl Model {
    pub fn new(embeddings: Matrix) -> Self {
        Model { embeddings }
    }

    pub fn embeddings(&self) -> &Matrix {
        &self.embeddings
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.embeddings.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.rows() == 0
    }

    pub fn vector_size(&self) -> usize {
        self.embeddings.columns()
    }

    /// The embedding of token `id`.
    pub fn vector(&self, id: u32) -> Vec<real> {
        self.embeddings.row_values(id as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// `word v1 v2 ...` lines after a `count size` header
    #[default]
    Text,
    /// Like text, but each vector is raw little-endian `f32`s
    Binary,
    /// The whole vocabulary and all embeddings, serialized with bincode
    Bincode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedToken {
    pub token: Vec<u8>,
    pub count: u64,
}

/// What [`OutputFormat::Bincode`] writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub vector_size: usize,
    pub vocab: Vec<SavedToken>,
    /// `embeddings[k * vector_size..][..vector_size]` is the vector for token `k`.
    pub embeddings: Vec<real>,
}

impl SavedModel {
    pub fn new(vocab: &Vocabulary, model: &Model) -> Self {
        let size = model.vector_size();
        SavedModel {
            vector_size: size,
            vocab: vocab
                .iter()
                .map(|(token, count)| SavedToken {
                    token: token.to_vec(),
                    count,
                })
                .collect(),
            embeddings: (0..vocab.len())
                .flat_map(|id| model.embeddings().row(id)[..size].iter().map(Real::get))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = BufReader::new(File::open(path).map_err(io_error("opening", path))?);
        bincode::deserialize_from(f).map_err(|source| Error::Serialize {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn vector(&self, id: usize) -> &[real] {
        &self.embeddings[id * self.vector_size..][..self.vector_size]
    }
}

/// Write the embedding of every token in `vocab` to `path`.
pub fn save(path: &Path, vocab: &Vocabulary, model: &Model, format: OutputFormat) -> Result<()> {
    if vocab.len() != model.len() {
        return Err(Error::ModelMismatch {
            model: model.len(),
            vocab: vocab.len(),
        });
    }
    let file = File::create(path).map_err(io_error("creating", path))?;
    let mut fo = BufWriter::new(file);

    if format == OutputFormat::Bincode {
        bincode::serialize_into(&mut fo, &SavedModel::new(vocab, model)).map_err(|source| {
            Error::Serialize {
                path: path.to_path_buf(),
                source,
            }
        })?;
        return fo.flush().map_err(io_error("writing", path));
    }

    write_vectors(&mut fo, vocab, model, format).map_err(io_error("writing", path))?;
    fo.flush().map_err(io_error("writing", path))
}

fn write_vectors<W: Write>(
    fo: &mut W,
    vocab: &Vocabulary,
    model: &Model,
    format: OutputFormat,
) -> std::io::Result<()> {
    let size = model.vector_size();
    writeln!(fo, "{} {}", vocab.len(), size)?;
    let mut values = vec![0.0; size];
    for (id, (token, _)) in vocab.iter().enumerate() {
        fo.write_all(token)?;
        fo.write_all(b" ")?;
        for (v, cell) in values.iter_mut().zip(model.embeddings().row(id)) {
            *v = cell.get();
        }
        if format == OutputFormat::Binary {
            for v in &values {
                fo.write_all(&v.to_le_bytes())?;
            }
        } else {
            for v in &values {
                write!(fo, "{v} ")?;
            }
        }
        writeln!(fo)?;
    }
    Ok(())
}
