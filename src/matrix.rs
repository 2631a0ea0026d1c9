//! Row-major weight matrices shared by all training threads.
//!
//! Threads update rows concurrently without locks (Hogwild). Each cell is a
//! [`Real`], an `f32` stored in an `AtomicU32` and accessed with relaxed
//! ordering, so racing accesses are merely lossy, never undefined behaviour.
//! A row is copied into a private buffer, worked on with the [`numeric`]
//! kernels, and copied back; an update racing with ours may be overwritten.

use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;

use crate::error::{Error, Result};
use crate::numeric::{self, LANES};
use crate::real;
use crate::rng::Rng;

/// Alignment of every float buffer we allocate: one cache line.
pub const ALIGNMENT: usize = 64;

#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn new(value: real) -> Self {
        Real {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn get(&self) -> real {
        real::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: real) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Allocate a zeroed, [`ALIGNMENT`]-aligned buffer of `len` floats rounded up to whole lanes.
pub fn aligned_floats(len: usize) -> Result<AlignedBox<[f32]>> {
    let len = numeric::padded_len(len);
    AlignedBox::slice_from_default(ALIGNMENT, len).map_err(|err| Error::Allocation {
        bytes: len * std::mem::size_of::<f32>(),
        message: format!("{err:?}"),
    })
}

pub struct Matrix {
    rows: usize,
    columns: usize,
    /// `columns` rounded up to a multiple of `LANES`.
    stride: usize,
    cells: AlignedBox<[Real]>,
}

impl Matrix {
    /// An all-zero matrix.
    pub fn zeros(rows: usize, columns: usize) -> Result<Self> {
        let stride = numeric::padded_len(columns);
        let len = rows * stride;
        let cells = AlignedBox::slice_from_default(ALIGNMENT, len).map_err(|err| {
            Error::Allocation {
                bytes: len * std::mem::size_of::<Real>(),
                message: format!("{err:?}"),
            }
        })?;
        Ok(Matrix {
            rows,
            columns,
            stride,
            cells,
        })
    }

    /// A matrix with entries uniform in `[-0.5 / columns, 0.5 / columns)`, the
    /// usual word2vec initialization for input embeddings.
    pub fn random(rows: usize, columns: usize, rng: &mut Rng) -> Result<Self> {
        let m = Matrix::zeros(rows, columns)?;
        for r in 0..rows {
            for cell in &m.row(r)[..columns] {
                cell.set((rng.rand_real() - 0.5) / columns as real);
            }
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Length of a row including padding.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The cells of row `index`, padding included.
    pub fn row(&self, index: usize) -> &[Real] {
        &self.cells[index * self.stride..][..self.stride]
    }

    /// Copy row `index` into `out`, which must be `stride()` long.
    pub fn read_row(&self, index: usize, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.stride);
        for (o, cell) in out.iter_mut().zip(self.row(index)) {
            *o = cell.get();
        }
    }

    /// Overwrite row `index` with `values`, which must be `stride()` long.
    pub fn write_row(&self, index: usize, values: &[f32]) {
        debug_assert_eq!(values.len(), self.stride);
        for (cell, &v) in self.row(index).iter().zip(values) {
            cell.set(v);
        }
    }

    /// The logical (unpadded) values of row `index`.
    pub fn row_values(&self, index: usize) -> Vec<real> {
        self.row(index)[..self.columns].iter().map(Real::get).collect()
    }
}

impl std::fmt::Debug for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matrix")
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_and_aligned() {
        let m = Matrix::zeros(3, 10).unwrap();
        assert_eq!(m.stride() % LANES, 0);
        assert!(m.stride() >= 10);
        assert_eq!(m.row(0).as_ptr() as usize % ALIGNMENT, 0);
        assert_eq!(
            (m.row(1).as_ptr() as usize - m.row(0).as_ptr() as usize) % (LANES * 4),
            0
        );
    }

    #[test]
    fn random_init_leaves_padding_zero() {
        let mut rng = Rng::new(1);
        let m = Matrix::random(4, 5, &mut rng).unwrap();
        for r in 0..4 {
            let row = m.row(r);
            assert!(row[..5].iter().any(|c| c.get() != 0.0));
            assert!(row[..5].iter().all(|c| c.get().abs() <= 0.5 / 5.0));
            assert!(row[5..].iter().all(|c| c.get() == 0.0));
        }
    }

    #[test]
    fn read_write_round_trip() {
        let m = Matrix::zeros(2, 3).unwrap();
        let mut buf = aligned_floats(3).unwrap();
        assert_eq!(buf.len(), m.stride());
        buf[0] = 1.0;
        buf[2] = -2.5;
        m.write_row(1, &buf);
        assert_eq!(m.row_values(1), vec![1.0, 0.0, -2.5]);
        assert_eq!(m.row_values(0), vec![0.0, 0.0, 0.0]);

        let mut out = aligned_floats(3).unwrap();
        m.read_row(1, &mut out);
        assert_eq!(&out[..3], &[1.0, 0.0, -2.5]);
    }

    #[test]
    fn real_cells_hold_floats() {
        let r = Real::new(0.25);
        assert_eq!(r.get(), 0.25);
        r.set(-1.5);
        assert_eq!(r.get(), -1.5);
        assert_eq!(Real::default().get(), 0.0);
    }
}
