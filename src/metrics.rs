use crate::error::{Error, Result};

fn check_lengths(y_true: &[usize], y_pred: &[usize]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(Error::InvalidParameter(format!(
            "{} labels but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    Ok(())
}

/// Compute accuracy of the predicted classes `y_pred` to the correct classes `y_true`.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> Result<f32> {
    check_lengths(y_true, y_pred)?;
    if y_true.is_empty() {
        return Err(Error::InvalidParameter(
            "accuracy of an empty set is undefined".to_string(),
        ));
    }
    let n_corrects = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    Ok(n_corrects as f32 / y_true.len() as f32)
}

/// Construct a confusion matrix over `classes` classes.
/// An item in i-th row and j-th column is the number of samples of class i predicted as j.
pub fn confusion_matrix(
    y_true: &[usize],
    y_pred: &[usize],
    classes: usize,
) -> Result<Vec<Vec<usize>>> {
    check_lengths(y_true, y_pred)?;
    let mut matrix = vec![vec![0; classes]; classes];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        if t >= classes || p >= classes {
            return Err(Error::InvalidParameter(format!(
                "class pair ({}, {}) outside {} classes",
                t, p, classes
            )));
        }
        matrix[t][p] += 1;
    }
    Ok(matrix)
}
