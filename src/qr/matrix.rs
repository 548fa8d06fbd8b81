//! QR bit-matrix source: encode a payload at error-correction level H and
//! expose the result as a plain boolean grid.
//!
//! The `qrcode` crate does the Reed–Solomon and masking work; nothing of its
//! own renderer is used. Level H (~30 % recovery) is fixed because the
//! styled output eats into the error budget: rounded modules, gaps between
//! them and the centre logo all remove dark area a scanner expects.

use crate::error::BadgeError;
use qrcode::{Color, EcLevel, QrCode};

/// Side of a finder pattern, in modules.
pub const FINDER_SIZE: usize = 7;

/// Immutable N×N module grid. `true` is a dark module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    width: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    /// Encode `data` at level H.
    pub fn encode(data: &str) -> Result<Self, BadgeError> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H).map_err(|e| {
            BadgeError::Encoding {
                len: data.len(),
                detail: e.to_string(),
            }
        })?;
        let width = code.width();
        let modules = code.to_colors().into_iter().map(|c| c == Color::Dark).collect();
        Ok(Self { width, modules })
    }

    /// Side length N in modules.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Module at `(row, col)`; out-of-range cells read as light.
    pub fn get(&self, row: usize, col: usize) -> bool {
        row < self.width && col < self.width && self.modules[row * self.width + col]
    }

    /// Top-left corners `(row, col)` of the three finder patterns.
    pub fn finder_origins(&self) -> [(usize, usize); 3] {
        let far = self.width - FINDER_SIZE;
        [(0, 0), (0, far), (far, 0)]
    }

    /// True for cells covered by a finder pattern or its one-cell separator.
    ///
    /// Each zone spans the 7×7 finder grown by one cell on every side,
    /// clipped to the grid.
    pub fn is_finder_zone(&self, row: usize, col: usize) -> bool {
        let within = |v: usize, origin: usize| v + 1 >= origin && v <= origin + FINDER_SIZE;
        self.finder_origins()
            .iter()
            .any(|&(r0, c0)| within(row, r0) && within(col, c0))
    }

    /// Dark cells outside the finder zones, row-major.
    pub fn data_modules(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.width)
            .flat_map(move |r| (0..self.width).map(move |c| (r, c)))
            .filter(move |&(r, c)| self.get(r, c) && !self.is_finder_zone(r, c))
    }
}
