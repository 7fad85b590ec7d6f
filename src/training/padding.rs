//! Batch padding for variable-length inputs and targets

use anyhow::{ensure, Context, Result};
use ndarray::{s, stack, Array1, Array2, Array3, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2};

/// Value used to pad mel/linear targets past their end
pub const TARGET_PAD: f32 = -0.1;

/// Smallest multiple of `multiple` that is `>= x`
pub fn round_up(x: usize, multiple: usize) -> usize {
    let remainder = x % multiple;
    if remainder == 0 {
        x
    } else {
        x + multiple - remainder
    }
}

/// Right-pad a 1-D sequence to `length` with `pad`
pub fn pad_input<S, T>(x: &ArrayBase<S, Ix1>, length: usize, pad: T) -> Result<Array1<T>>
where
    S: Data<Elem = T>,
    T: Clone,
{
    ensure!(
        x.len() <= length,
        "Cannot pad a sequence of {} to {}",
        x.len(),
        length
    );
    let mut padded = Array1::from_elem(length, pad);
    padded.slice_mut(s![..x.len()]).assign(x);
    Ok(padded)
}

/// Stack sequences into `[batch, max_len]`, padding with `T::default()`
pub fn prepare_inputs<T: Clone + Default>(inputs: &[Array1<T>]) -> Result<Array2<T>> {
    let max_len = inputs
        .iter()
        .map(|x| x.len())
        .max()
        .context("Cannot prepare an empty batch")?;
    let padded = inputs
        .iter()
        .map(|x| pad_input(x, max_len, T::default()))
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<_> = padded.iter().map(|x| x.view()).collect();
    Ok(stack(Axis(0), &views)?)
}

/// Pad a `[frames, channels]` array with `pad` rows up to `length` frames
pub fn pad_array<S>(array: &ArrayBase<S, Ix2>, length: usize, pad: f32) -> Result<Array2<f32>>
where
    S: Data<Elem = f32>,
{
    ensure!(
        array.nrows() <= length,
        "Cannot pad {} frames to {}",
        array.nrows(),
        length
    );
    let mut padded = Array2::from_elem((length, array.ncols()), pad);
    padded.slice_mut(s![..array.nrows(), ..]).assign(array);
    Ok(padded)
}

/// Stack `[frames, channels]` targets into `[batch, T, channels]`.
///
/// `T` is the longest target rounded up to a multiple of `alignment`
/// (the decoder's outputs per step); padding uses [`TARGET_PAD`].
pub fn prepare_targets(targets: &[Array2<f32>], alignment: usize) -> Result<Array3<f32>> {
    ensure!(alignment > 0, "alignment must be positive");
    let max_len = targets
        .iter()
        .map(|t| t.nrows())
        .max()
        .context("Cannot prepare an empty batch")?;
    let channels = targets[0].ncols();
    ensure!(
        targets.iter().all(|t| t.ncols() == channels),
        "All targets must have {} channels",
        channels
    );

    let length = round_up(max_len, alignment);
    let padded = targets
        .iter()
        .map(|t| pad_array(t, length, TARGET_PAD))
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<_> = padded.iter().map(|t| t.view()).collect();
    Ok(stack(Axis(0), &views)?)
}

/// Split `x` into consecutive column blocks of the given widths
pub fn split_columns<'a, S, A>(
    x: &'a ArrayBase<S, Ix2>,
    split_pos: &[usize],
) -> Result<Vec<ArrayView2<'a, A>>>
where
    S: Data<Elem = A>,
{
    let total: usize = split_pos.iter().sum();
    ensure!(
        total <= x.ncols(),
        "Split widths sum to {} but the input has {} columns",
        total,
        x.ncols()
    );

    let mut start = 0;
    Ok(split_pos
        .iter()
        .map(|&width| {
            let block = x.slice(s![.., start..start + width]);
            start += width;
            block
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(10, 5), 10);
        assert_eq!(round_up(11, 5), 15);
        assert_eq!(round_up(0, 3), 0);
        assert_eq!(round_up(7, 1), 7);
    }

    #[test]
    fn test_pad_input() {
        let padded = pad_input(&array![1i64, 2, 3], 5, 0).unwrap();
        assert_eq!(padded, array![1, 2, 3, 0, 0]);
        assert!(pad_input(&array![1i64, 2, 3], 2, 0).is_err());
    }

    #[test]
    fn test_prepare_inputs() {
        let batch = prepare_inputs(&[array![4i64, 5], array![1, 2, 3], array![7]]).unwrap();
        assert_eq!(batch, array![[4, 5, 0], [1, 2, 3], [7, 0, 0]]);
        assert!(prepare_inputs::<i64>(&[]).is_err());
    }

    #[test]
    fn test_pad_array() {
        let padded = pad_array(&array![[1.0f32, 2.0]], 3, TARGET_PAD).unwrap();
        assert_eq!(padded.shape(), &[3, 2]);
        assert_eq!(padded[[0, 1]], 2.0);
        assert_eq!(padded[[2, 0]], -0.1);
    }

    #[test]
    fn test_prepare_targets_aligns_length() {
        let a = Array2::<f32>::ones((5, 80));
        let b = Array2::<f32>::ones((3, 80));
        let batch = prepare_targets(&[a, b], 2).unwrap();
        assert_eq!(batch.shape(), &[2, 6, 80]);
        assert_eq!(batch[[0, 4, 0]], 1.0);
        assert_eq!(batch[[0, 5, 0]], TARGET_PAD);
        assert_eq!(batch[[1, 3, 79]], TARGET_PAD);
    }

    #[test]
    fn test_prepare_targets_rejects_mixed_channels() {
        let a = Array2::<f32>::ones((5, 80));
        let b = Array2::<f32>::ones((3, 40));
        assert!(prepare_targets(&[a, b], 1).is_err());
    }

    #[test]
    fn test_split_columns() {
        let x = array![[1, 2, 3, 4, 5], [6, 7, 8, 9, 10]];
        let parts = split_columns(&x, &[2, 3]).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], array![[1, 2], [6, 7]]);
        assert_eq!(parts[1], array![[3, 4, 5], [8, 9, 10]]);

        assert!(split_columns(&x, &[4, 2]).is_err());
        assert!(split_columns(&x, &[]).unwrap().is_empty());
    }
}
