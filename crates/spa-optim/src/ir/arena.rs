use super::{ParamId, ProblemIR};

/// Flat scalar storage for every parameter block of a [`ProblemIR`].
///
/// Residual blocks refer to their parameters by [`ParamId`]; the arena maps
/// an id to a contiguous slice, so solvers update values through an index
/// rather than through aliased references.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamArena {
    values: Vec<f64>,
    offsets: Vec<usize>,
    dims: Vec<usize>,
}

impl ParamArena {
    /// Zero-initialized storage laid out for `ir`.
    pub fn for_problem(ir: &ProblemIR) -> Self {
        let mut offsets = Vec::with_capacity(ir.params.len());
        let mut dims = Vec::with_capacity(ir.params.len());
        let mut total = 0;
        for block in &ir.params {
            offsets.push(total);
            dims.push(block.dim);
            total += block.dim;
        }
        Self {
            values: vec![0.0; total],
            offsets,
            dims,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.offsets.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Offset of the first scalar of `id`.
    pub fn offset(&self, id: ParamId) -> Option<usize> {
        self.offsets.get(id.0).copied()
    }

    pub fn block(&self, id: ParamId) -> Option<&[f64]> {
        let start = *self.offsets.get(id.0)?;
        let dim = self.dims[id.0];
        self.values.get(start..start + dim)
    }

    pub fn block_mut(&mut self, id: ParamId) -> Option<&mut [f64]> {
        let start = *self.offsets.get(id.0)?;
        let dim = self.dims[id.0];
        self.values.get_mut(start..start + dim)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }
}
