//! Small value types shared by the analyzer and its callers.

/// The result of analyzing one operation against a [`crate::cost_model::TypeWeightTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalysisOutcome {
    pub complexity: u64,
    pub max_depth: u32,
}

/// A fragment's analyzed cost, cached so repeated spreads of the same
/// fragment are analyzed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct FragmentCost {
    pub complexity: u64,
    /// `computed-max-depth - 1`, so spreading the fragment doesn't double
    /// count the nesting level the spread site already contributes.
    pub depth_contribution: u32,
}
