//! Dense `f32` matrices and vectors used throughout the engine.
//!
//! Both types are thin wrappers over `ndarray` arrays. Every binary operation checks that its
//! operands are conformant and reports `Error::ShapeMismatch` otherwise, and element access is
//! bounds-checked.

use ndarray::linalg::general_mat_mul;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

use crate::error::{Error, Result};

/// Whether an operand of `Matrix::matmul` is used as is or transposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

// Reserve zeroed storage, reporting a refused allocation instead of aborting.
fn zeroed_storage(rows: usize, cols: usize) -> Result<Vec<f32>> {
    let len = rows
        .checked_mul(cols)
        .ok_or(Error::Allocation { rows, cols })?;
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(len)
        .map_err(|_| Error::Allocation { rows, cols })?;
    storage.resize(len, 0.0);
    Ok(storage)
}

/// A dense, row-major 2D array.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    data: Array2<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        let storage = zeroed_storage(rows, cols)?;
        Self::from_shape_vec(rows, cols, storage)
    }

    /// Build a matrix from row-major `values`.
    pub fn from_shape_vec(rows: usize, cols: usize, values: Vec<f32>) -> Result<Self> {
        let len = values.len();
        Array2::from_shape_vec((rows, cols), values)
            .map(Self::from_array)
            .map_err(|_| Error::shape_mismatch("from_shape_vec", &[rows, cols], &[len]))
    }

    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Deep copy into freshly allocated storage.
    pub fn try_clone(&self) -> Result<Self> {
        let mut copy = Self::zeros(self.rows(), self.cols())?;
        copy.data.assign(&self.data);
        Ok(copy)
    }

    /// Wrap `vector` as a single-column matrix, i.e. a batch of one sample.
    pub fn from_column(vector: &Vector) -> Result<Self> {
        let mut column = Self::zeros(vector.len(), 1)?;
        column.data.column_mut(0).assign(&vector.view());
        Ok(column)
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array2<f32> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Result<f32> {
        self.data
            .get((row, col))
            .copied()
            .ok_or_else(|| Error::IndexOutOfRange {
                index: vec![row, col],
                shape: self.shape().to_vec(),
            })
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) -> Result<()> {
        let shape = self.shape().to_vec();
        let elem = self
            .data
            .get_mut((row, col))
            .ok_or(Error::IndexOutOfRange {
                index: vec![row, col],
                shape,
            })?;
        *elem = value;
        Ok(())
    }

    /// Copy out column `col`.
    pub fn column(&self, col: usize) -> Result<Vector> {
        if col >= self.cols() {
            return Err(Error::IndexOutOfRange {
                index: vec![0, col],
                shape: self.shape().to_vec(),
            });
        }
        Ok(Vector::from_array(self.data.column(col).to_owned()))
    }

    fn check_same_shape(&self, other: &Matrix, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::shape_mismatch(op, self.shape(), other.shape()));
        }
        Ok(())
    }

    /// Element-wise `self + other` into a new matrix.
    pub fn checked_add(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_map(other, "add", |a, b| a + b)
    }

    /// Element-wise `self - other` into a new matrix.
    pub fn checked_sub(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_map(other, "sub", |a, b| a - b)
    }

    pub fn add_in_place(&mut self, other: &Matrix) -> Result<()> {
        self.check_same_shape(other, "add")?;
        self.data += &other.data;
        Ok(())
    }

    pub fn sub_in_place(&mut self, other: &Matrix) -> Result<()> {
        self.check_same_shape(other, "sub")?;
        self.data -= &other.data;
        Ok(())
    }

    /// Multiply every element by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.data *= factor;
    }

    pub fn map_in_place<F>(&mut self, f: F)
    where
        F: Fn(f32) -> f32,
    {
        self.data.mapv_inplace(f);
    }

    /// Combine two same-shaped matrices element by element.
    pub fn zip_map<F>(&self, other: &Matrix, op: &'static str, f: F) -> Result<Matrix>
    where
        F: Fn(f32, f32) -> f32,
    {
        self.check_same_shape(other, op)?;
        let mut out = Matrix::zeros(self.rows(), self.cols())?;
        Zip::from(&mut out.data)
            .and(&self.data)
            .and(&other.data)
            .for_each(|out, &a, &b| *out = f(a, b));
        Ok(out)
    }

    /// Matrix product `op(self) · op(other)` where `op` optionally transposes its operand.
    pub fn matmul(
        &self,
        transpose_self: Transpose,
        other: &Matrix,
        transpose_other: Transpose,
    ) -> Result<Matrix> {
        let lhs = match transpose_self {
            Transpose::No => self.data.view(),
            Transpose::Yes => self.data.t(),
        };
        let rhs = match transpose_other {
            Transpose::No => other.data.view(),
            Transpose::Yes => other.data.t(),
        };
        if lhs.ncols() != rhs.nrows() {
            return Err(Error::shape_mismatch("matmul", lhs.shape(), rhs.shape()));
        }

        let mut product = Matrix::zeros(lhs.nrows(), rhs.ncols())?;
        general_mat_mul(1.0, &lhs, &rhs, 0.0, &mut product.data);
        Ok(product)
    }

    /// Add `vector` to every column.
    pub fn add_to_columns(&mut self, vector: &Vector) -> Result<()> {
        if vector.len() != self.rows() {
            return Err(Error::shape_mismatch(
                "column broadcast",
                self.shape(),
                &[vector.len()],
            ));
        }
        for mut column in self.data.columns_mut() {
            column += &vector.view();
        }
        Ok(())
    }

    /// Sum each row across the columns, accumulating left to right.
    pub fn row_sums(&self) -> Result<Vector> {
        let mut sums = Vector::zeros(self.rows())?;
        Zip::from(&mut sums.data)
            .and(self.data.lanes(Axis(1)))
            .for_each(|sum, row| *sum = row.iter().fold(0.0, |acc, &v| acc + v));
        Ok(sums)
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.data.iter()
    }
}

/// A dense 1D array, used for biases and single samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Vector {
    data: Array1<f32>,
}

impl Vector {
    pub fn zeros(len: usize) -> Result<Self> {
        let storage = zeroed_storage(len, 1)?;
        Ok(Self::from_vec(storage))
    }

    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            data: Array1::from_vec(values),
        }
    }

    pub fn from_array(data: Array1<f32>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.data.view()
    }

    pub fn get(&self, index: usize) -> Result<f32> {
        self.data
            .get(index)
            .copied()
            .ok_or_else(|| Error::IndexOutOfRange {
                index: vec![index],
                shape: vec![self.len()],
            })
    }

    pub fn set(&mut self, index: usize, value: f32) -> Result<()> {
        let len = self.len();
        let elem = self.data.get_mut(index).ok_or(Error::IndexOutOfRange {
            index: vec![index],
            shape: vec![len],
        })?;
        *elem = value;
        Ok(())
    }

    fn check_same_len(&self, other: &Vector, op: &'static str) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::shape_mismatch(op, &[self.len()], &[other.len()]));
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Vector) -> Result<Vector> {
        self.check_same_len(other, "add")?;
        Ok(Self::from_array(&self.data + &other.data))
    }

    pub fn checked_sub(&self, other: &Vector) -> Result<Vector> {
        self.check_same_len(other, "sub")?;
        Ok(Self::from_array(&self.data - &other.data))
    }

    pub fn add_in_place(&mut self, other: &Vector) -> Result<()> {
        self.check_same_len(other, "add")?;
        self.data += &other.data;
        Ok(())
    }

    pub fn sub_in_place(&mut self, other: &Vector) -> Result<()> {
        self.check_same_len(other, "sub")?;
        self.data -= &other.data;
        Ok(())
    }

    pub fn scale(&mut self, factor: f32) {
        self.data *= factor;
    }

    /// Index of the largest element. Ties go to the earliest index, and an empty vector
    /// yields 0.
    pub fn argmax(&self) -> usize {
        self.data
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(max_index, max_elem), (index, &elem)| {
                if index == 0 || elem > max_elem {
                    (index, elem)
                } else {
                    (max_index, max_elem)
                }
            })
            .0
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.data.iter()
    }
}
