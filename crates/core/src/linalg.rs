use crate::error::{AdvisorError, Result};
use crate::features::EncodedVector;
use ndarray::{Array2, ArrayView1};

pub(crate) fn squared_euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let diff = &a - &b;
    diff.dot(&diff)
}

pub(crate) fn euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    squared_euclidean(a, b).sqrt()
}

/// Cosine similarity; zero when either side has zero norm.
pub(crate) fn cosine(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let na = a.dot(&a).sqrt();
    let nb = b.dot(&b).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (na * nb)
}

/// Encoded vectors as the rows of an `n × dim` matrix.
pub(crate) fn stack_rows(vectors: &[EncodedVector]) -> Result<Array2<f64>> {
    let dim = vectors.first().map_or(0, EncodedVector::len);
    let mut flat = Vec::with_capacity(vectors.len() * dim);
    for v in vectors {
        if v.len() != dim {
            return Err(AdvisorError::validation("encoded vectors differ in length"));
        }
        flat.extend_from_slice(v.as_slice());
    }
    Array2::from_shape_vec((vectors.len(), dim), flat)
        .map_err(|e| AdvisorError::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine(array![0.0, 0.0].view(), array![1.0, 2.0].view()), 0.0);
        assert!((cosine(array![1.0, 0.0].view(), array![2.0, 0.0].view()) - 1.0).abs() < 1e-12);
        assert!(cosine(array![1.0, 0.0].view(), array![0.0, 3.0].view()).abs() < 1e-12);
    }

    #[test]
    fn euclidean_is_pythagorean() {
        assert!((euclidean(array![0.0, 0.0].view(), array![3.0, 4.0].view()) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn stack_rows_rejects_ragged_input() {
        let ok = stack_rows(&[
            EncodedVector::new(vec![1.0, 2.0]),
            EncodedVector::new(vec![3.0, 4.0]),
        ])
        .unwrap();
        assert_eq!(ok, array![[1.0, 2.0], [3.0, 4.0]]);

        let err = stack_rows(&[EncodedVector::new(vec![1.0]), EncodedVector::new(vec![1.0, 2.0])])
            .unwrap_err();
        assert!(err.is_validation());
    }
}
