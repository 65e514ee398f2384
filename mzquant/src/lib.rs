#![doc = include_str!("../README.md")]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, missing_docs)]
#![allow(
    clippy::must_use_candidate,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::too_long_first_doc_paragraph
)]

/// Accumulation of calibration curve points per replicate.
pub mod calibration;
/// Case/control fold change estimation.
pub mod group_comparison;
/// Normalization methods and per-sample denominator areas.
pub mod normalization;
/// Benjamini-Hochberg p-value adjustment.
pub mod pvalues;
/// Curve fitting strategies and weighted least squares.
pub mod regression;
/// Replicate and isotope-label lookup for one run.
pub mod replicate;
/// Per-molecule aggregation of chromatogram observations.
pub mod result_data;
/// The in-memory model of one run.
pub mod run_data;
/// Run-level orchestration and settings.
pub mod quantifier;

/// A subset of the types that are envisioned to be used the most, importing
/// this is a good starting point for working with the crate.
pub mod prelude {
    pub use crate::group_comparison::{FoldChangeResult, GroupComparisonDataSet, GroupRole};
    pub use crate::normalization::{NormalizationMethod, NormalizationMethodAreas};
    pub use crate::pvalues::adjust_p_values;
    pub use crate::regression::{
        CalibrationCurve, RegressionFit, RegressionWeighting, WeightedPoint,
    };
    pub use crate::replicate::ReplicateDataSet;
    pub use crate::result_data::{FeatureAreas, GeneralMoleculeResultDataSet};
    pub use crate::run_data::{
        IsotopeLabel, Molecule, MoleculeConcentration, PeptideGroup, Replicate, RunData,
        SampleType, StandardType,
    };
    pub use crate::quantifier::{
        CalibrationCurveRecord, GroupComparisonSettings, QuantificationSettings, RunQuantifier,
    };
}
