use ndarray::{Array, Axis, IxDyn};
use crate::error::DetectError;

/// Model tensor, wrapper over [`Array<f32, IxDyn>`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct X(pub Array<f32, IxDyn>);

impl From<Array<f32, IxDyn>> for X {
    fn from(x: Array<f32, IxDyn>) -> Self {
        Self(x)
    }
}

impl From<Vec<f32>> for X {
    fn from(x: Vec<f32>) -> Self {
        Self(Array::from_vec(x).into_dyn())
    }
}

impl std::ops::Deref for X {
    type Target = Array<f32, IxDyn>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl X {
    pub fn from_shape_vec(shape: &[usize], xs: Vec<f32>) -> Result<Self, DetectError> {
        let array = Array::from_shape_vec(shape, xs)
            .map_err(|e| DetectError::Format(format!("tensor shape {:?}: {}", shape, e)))?;
        Ok(Self::from(array))
    }

    /// Stacks same-shaped tensors along a new leading batch axis.
    pub fn stack(xs: &[&Array<f32, IxDyn>]) -> Result<Self, DetectError> {
        let views: Vec<_> = xs.iter().map(|x| x.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views)
            .map_err(|e| DetectError::Format(format!("cannot stack feature tensors: {}", e)))?;
        Ok(Self(stacked))
    }

    /// Splits along the leading axis, one tensor per item.
    pub fn unstack(&self) -> Vec<X> {
        self.0
            .axis_iter(Axis(0))
            .map(|x| X(x.to_owned()))
            .collect()
    }

    pub fn ndim(&self) -> usize {
        self.0.ndim()
    }

    pub fn into_inner(self) -> Array<f32, IxDyn> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_and_unstack() {
        let a = Array::from_elem(IxDyn(&[3, 2, 2]), 0.25f32);
        let b = Array::from_elem(IxDyn(&[3, 2, 2]), 0.75f32);

        let batch = X::stack(&[&a, &b]).unwrap();
        assert_eq!(batch.shape(), &[2, 3, 2, 2]);

        let items = batch.unstack();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].0, b);
    }

    #[test]
    fn test_stack_rejects_mismatched_shapes() {
        let a = Array::zeros(IxDyn(&[3, 2, 2]));
        let b = Array::zeros(IxDyn(&[3, 4, 4]));
        assert!(matches!(X::stack(&[&a, &b]), Err(DetectError::Format(_))));
    }
}
