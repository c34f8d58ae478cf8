//! Backward pass hook stored on graph nodes

/// A recorded operation that can push its output gradient to its inputs
pub trait BackwardOp {
    /// Propagate the gradient held in the output's cell to the inputs,
    /// then recurse into their own backward ops.
    fn backward(&self);
}
