//! Shaping labelled samples into the column-per-sample batches the network trains on.

use crate::error::{Error, Result};
use crate::tensor::{Matrix, Vector};

/// Encode class indices to one-hot columns and decode score columns back to classes.
#[derive(Copy, Clone, Debug)]
pub struct OneHotEncoder {
    classes: usize,
}

impl OneHotEncoder {
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Encode labels as a `[classes x labels.len()]` matrix with a single 1.0 per column.
    pub fn encode(&self, labels: &[usize]) -> Result<Matrix> {
        let mut one_hot = Matrix::zeros(self.classes, labels.len())?;
        for (column, &label) in labels.iter().enumerate() {
            if label >= self.classes {
                return Err(Error::InvalidParameter(format!(
                    "label {} outside {} classes",
                    label, self.classes
                )));
            }
            one_hot.set(label, column, 1.0)?;
        }
        Ok(one_hot)
    }

    /// Decode each column to the index of its largest score.
    pub fn decode(&self, scores: &Matrix) -> Result<Vec<usize>> {
        if scores.rows() != self.classes {
            return Err(Error::shape_mismatch(
                "decode",
                scores.shape(),
                &[self.classes, scores.cols()],
            ));
        }
        (0..scores.cols())
            .map(|column| Ok(scores.column(column)?.argmax()))
            .collect()
    }
}

/// Batches yields one `(inputs, targets)` pair per `Iterator::next()` call.
///
/// Samples are taken in order and packed as columns. The last batch may be short unless
/// `drop_last` is set.
pub struct Batches<'a> {
    samples: &'a [Vector],
    labels: &'a [usize],
    encoder: OneHotEncoder,
    batch_size: usize,
    drop_last: bool,
    position: usize,
}

impl<'a> Batches<'a> {
    pub fn new(
        samples: &'a [Vector],
        labels: &'a [usize],
        encoder: OneHotEncoder,
        batch_size: usize,
    ) -> Result<Self> {
        if samples.len() != labels.len() {
            return Err(Error::InvalidParameter(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }
        if batch_size == 0 {
            return Err(Error::InvalidParameter(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(Self {
            samples,
            labels,
            encoder,
            batch_size,
            drop_last: false,
            position: 0,
        })
    }

    /// If `drop_last` is true, discard the last batch when it is smaller than the batch size.
    pub fn drop_last(self, drop_last: bool) -> Self {
        Self { drop_last, ..self }
    }

    fn assemble(&self, start: usize, end: usize) -> Result<(Matrix, Matrix)> {
        let samples = &self.samples[start..end];
        let features = samples[0].len();
        let mut input = Matrix::zeros(features, samples.len())?;
        for (column, sample) in samples.iter().enumerate() {
            if sample.len() != features {
                return Err(Error::shape_mismatch(
                    "batch assembly",
                    &[features],
                    &[sample.len()],
                ));
            }
            for (row, &value) in sample.iter().enumerate() {
                input.set(row, column, value)?;
            }
        }
        let target = self.encoder.encode(&self.labels[start..end])?;
        Ok((input, target))
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<(Matrix, Matrix)>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.position;
        let end = (start + self.batch_size).min(self.samples.len());
        if start >= end || (self.drop_last && end - start != self.batch_size) {
            return None;
        }
        self.position = end;
        Some(self.assemble(start, end))
    }
}

/// Pack labelled samples into the parallel input and target batches taken by
/// `Network::train`.
pub fn assemble_batches(
    samples: &[Vector],
    labels: &[usize],
    classes: usize,
    batch_size: usize,
    drop_last: bool,
) -> Result<(Vec<Matrix>, Vec<Matrix>)> {
    let batches = Batches::new(samples, labels, OneHotEncoder::new(classes), batch_size)?
        .drop_last(drop_last)
        .collect::<Result<Vec<_>>>()?;
    Ok(batches.into_iter().unzip())
}
