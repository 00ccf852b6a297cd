//! Flat dense vector and diagonal view.

use std::ops::{Index, IndexMut};

use super::{check_len, LinalgError};

/// Dense vector over a flat `f32` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: vec![0.0; n],
        }
    }

    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data }
    }

    pub fn from_slice(s: &[f32]) -> Self {
        Self { data: s.to_vec() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn fill(&mut self, v: f32) {
        self.data.fill(v);
    }

    pub fn copy_from(&mut self, other: &Vector) -> Result<(), LinalgError> {
        check_len("Vector::copy_from", self.len(), other.len())?;
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied()
    }

    /// Largest element; `-inf` for an empty vector.
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl Index<usize> for Vector {
    type Output = f32;

    #[inline]
    fn index(&self, i: usize) -> &f32 {
        &self.data[i]
    }
}

impl IndexMut<usize> for Vector {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.data[i]
    }
}

/// Diagonal view: either owns its buffer or aliases a [`Vector`]'s.
///
/// The borrowing form is a weak relation — it never takes ownership of
/// the underlying container.
#[derive(Debug)]
pub enum Diag<'a> {
    Owned(Vector),
    View(&'a [f32]),
}

impl Diag<'_> {
    pub fn constant(n: usize, v: f32) -> Self {
        Diag::Owned(Vector::from_vec(vec![v; n]))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        match self {
            Diag::Owned(v) => v.as_slice(),
            Diag::View(s) => s,
        }
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        self.as_slice()[i]
    }
}

impl<'a> From<&'a Vector> for Diag<'a> {
    fn from(v: &'a Vector) -> Self {
        Diag::View(v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_from_rejects_length_mismatch() {
        let mut a = Vector::zeros(3);
        let b = Vector::zeros(4);
        assert!(matches!(
            a.copy_from(&b),
            Err(LinalgError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn diag_view_aliases_vector() {
        let v = Vector::from_slice(&[1.0, 2.0, 3.0]);
        let d = Diag::from(&v);
        assert_eq!(d.len(), 3);
        assert_eq!(d.get(1), 2.0);
    }

    #[test]
    fn max_of_empty_is_neg_inf() {
        assert_eq!(Vector::zeros(0).max(), f32::NEG_INFINITY);
    }
}
