//! Case/control fold change estimation through a linear model on log2
//! abundances.

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::result_data::FeatureAreas;
use crate::run_data::Id;

/// Which side of the comparison a replicate sits on.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum GroupRole {
    /// The baseline condition.
    Control,
    /// The condition compared against the baseline.
    Case,
}

/// One replicate's measurements within a comparison.
#[derive(Clone, PartialEq, Debug)]
pub struct ComparisonReplicate {
    /// The replicate.
    pub replicate_id: Id,
    /// Control or case.
    pub role: GroupRole,
    /// The biological-replicate identity used for pairing, when the
    /// comparison configures one.
    pub identity: Option<String>,
    /// The accumulated normalized feature areas.
    pub features: FeatureAreas,
}

/// The effect estimated by [`GroupComparisonDataSet::fold_change`].
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FoldChangeEstimate {
    /// The case/control effect on log2 scale.
    pub log2_fold_change: f64,
    /// Standard error of the effect. 0 when the model is saturated and no
    /// residual variance can be pooled.
    pub standard_error: f64,
    /// Residual degrees of freedom of the model.
    pub degrees_of_freedom: usize,
    /// Two-sided p-value of the effect, 1 when no inference is possible.
    pub p_value: f64,
}

/// A fold change produced for one (case value, MS level, isotope label)
/// combination, ready for downstream persistence.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FoldChangeResult {
    /// The run the comparison was computed over.
    pub run_id: Id,
    /// The peptide group of the quantified molecule(s).
    pub peptide_group_id: Id,
    /// The quantified molecule, absent in per-protein mode.
    pub molecule_id: Option<Id>,
    /// The case annotation value of this comparison.
    pub case_value: String,
    /// The isotope label the abundances were taken from.
    pub isotope_label_id: Id,
    /// 1 for precursor-level areas, 2 for fragment-level ones.
    pub ms_level: u8,
    /// The estimated effect on log2 scale.
    pub log2_fold_change: f64,
    /// Standard error of the effect.
    pub standard_error: f64,
    /// Residual degrees of freedom.
    pub degrees_of_freedom: usize,
    /// The unadjusted two-sided p-value.
    pub p_value: f64,
    /// The Benjamini-Hochberg adjusted p-value, set once the whole run has
    /// been collected.
    pub adjusted_p_value: Option<f64>,
}

/// Accumulates the case and control measurements of one comparison and
/// fits the linear model that estimates the effect size.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct GroupComparisonDataSet {
    replicates: Vec<ComparisonReplicate>,
}

impl GroupComparisonDataSet {
    /// An empty data set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a replicate and hand out its entry for feature
    /// accumulation.
    pub fn add_replicate(
        &mut self,
        replicate_id: Id,
        role: GroupRole,
        identity: Option<String>,
    ) -> &mut ComparisonReplicate {
        let index = self.replicates.len();
        self.replicates.push(ComparisonReplicate {
            replicate_id,
            role,
            identity,
            features: FeatureAreas::new(),
        });
        &mut self.replicates[index]
    }

    /// Estimate the case/control effect on log2 scale.
    ///
    /// Each replicate with any accumulated area under the given label
    /// contributes one observation: the log2 of its summed areas. The model
    /// regresses the observations on an intercept, the case indicator, and
    /// one dummy per additional identity value (pairing replicates that
    /// share a biological identity). Returns `None` when either group has
    /// no observation or the design is singular; a saturated model yields
    /// an estimate with zero standard error and p-value 1.
    pub fn fold_change(&self, isotope_label: Option<&str>) -> Option<FoldChangeEstimate> {
        let observations: Vec<(&ComparisonReplicate, f64)> = self
            .replicates
            .iter()
            .filter_map(|replicate| {
                replicate
                    .features
                    .total_for_label(isotope_label)
                    .map(|total| (replicate, total.log2()))
            })
            .collect();
        if !observations
            .iter()
            .any(|(replicate, _)| replicate.role == GroupRole::Case)
            || !observations
                .iter()
                .any(|(replicate, _)| replicate.role == GroupRole::Control)
        {
            return None;
        }

        // Identity dummies beyond the first value pair replicates sharing a
        // biological identity.
        let identities: Vec<&str> = observations
            .iter()
            .filter_map(|(replicate, _)| replicate.identity.as_deref())
            .unique()
            .sorted_unstable()
            .skip(1)
            .collect();
        let rows = observations.len();
        let columns = 2 + identities.len();
        if rows < columns {
            return None;
        }
        let design = DMatrix::from_fn(rows, columns, |row, column| {
            let (replicate, _) = &observations[row];
            let set = match column {
                0 => true,
                1 => replicate.role == GroupRole::Case,
                _ => replicate.identity.as_deref() == Some(identities[column - 2]),
            };
            if set { 1.0 } else { 0.0 }
        });
        let response = DVector::from_iterator(rows, observations.iter().map(|(_, value)| *value));

        let transposed = design.transpose();
        let normal = &transposed * &design;
        let coefficients = normal.clone().lu().solve(&(&transposed * &response))?;
        let covariance_base = normal.try_inverse()?;
        let log2_fold_change = coefficients[1];

        let degrees_of_freedom = rows - columns;
        if degrees_of_freedom == 0 {
            // Saturated model: the estimate stands but carries no variance
            // information.
            return Some(FoldChangeEstimate {
                log2_fold_change,
                standard_error: 0.0,
                degrees_of_freedom,
                p_value: 1.0,
            });
        }
        let residuals = &response - &design * &coefficients;
        let variance = residuals.norm_squared() / degrees_of_freedom as f64;
        let standard_error = (variance * covariance_base[(1, 1)]).sqrt();
        let t_statistic = log2_fold_change / standard_error;
        let p_value = if t_statistic.is_finite() {
            StudentsT::new(0.0, 1.0, degrees_of_freedom as f64).map_or(1.0, |distribution| {
                2.0 * (1.0 - distribution.cdf(t_statistic.abs()))
            })
        } else if log2_fold_change == 0.0 {
            1.0
        } else {
            // Zero residual variance with a non-zero effect.
            0.0
        };
        Some(FoldChangeEstimate {
            log2_fold_change,
            standard_error,
            degrees_of_freedom,
            p_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicate_with_area(
        data_set: &mut GroupComparisonDataSet,
        id: Id,
        role: GroupRole,
        identity: Option<&str>,
        area: f64,
    ) {
        let entry = data_set.add_replicate(id, role, identity.map(str::to_string));
        entry.features.insert("light", "feature", area);
    }

    #[test]
    fn doubling_the_case_yields_one_log2_unit() {
        let mut data_set = GroupComparisonDataSet::new();
        replicate_with_area(&mut data_set, 1, GroupRole::Control, None, 100.0);
        replicate_with_area(&mut data_set, 2, GroupRole::Case, None, 200.0);
        let estimate = data_set.fold_change(Some("light")).unwrap();
        assert!((estimate.log2_fold_change - 1.0).abs() < 1e-12);
        assert_eq!(estimate.degrees_of_freedom, 0);
        assert_eq!(estimate.p_value, 1.0);
    }

    #[test]
    fn pooled_variance_with_replication() {
        let mut data_set = GroupComparisonDataSet::new();
        for (id, area) in [(1, 100.0), (2, 110.0)] {
            replicate_with_area(&mut data_set, id, GroupRole::Control, None, area);
        }
        for (id, area) in [(3, 200.0), (4, 220.0)] {
            replicate_with_area(&mut data_set, id, GroupRole::Case, None, area);
        }
        let estimate = data_set.fold_change(Some("light")).unwrap();
        assert!((estimate.log2_fold_change - 1.0).abs() < 1e-9);
        assert_eq!(estimate.degrees_of_freedom, 2);
        assert!(estimate.standard_error > 0.0);
        assert!(estimate.p_value > 0.0 && estimate.p_value < 0.05);
    }

    #[test]
    fn missing_group_produces_no_estimate() {
        let mut data_set = GroupComparisonDataSet::new();
        replicate_with_area(&mut data_set, 1, GroupRole::Control, None, 100.0);
        replicate_with_area(&mut data_set, 2, GroupRole::Control, None, 120.0);
        assert!(data_set.fold_change(Some("light")).is_none());
        // A replicate without features does not count as an observation.
        data_set.add_replicate(3, GroupRole::Case, None);
        assert!(data_set.fold_change(Some("light")).is_none());
    }

    #[test]
    fn identity_pairing_absorbs_subject_effects() {
        // Two subjects, each measured in both conditions with a consistent
        // doubling but very different baselines.
        let mut data_set = GroupComparisonDataSet::new();
        replicate_with_area(&mut data_set, 1, GroupRole::Control, Some("a"), 100.0);
        replicate_with_area(&mut data_set, 2, GroupRole::Case, Some("a"), 200.0);
        replicate_with_area(&mut data_set, 3, GroupRole::Control, Some("b"), 1000.0);
        replicate_with_area(&mut data_set, 4, GroupRole::Case, Some("b"), 2000.0);
        let estimate = data_set.fold_change(Some("light")).unwrap();
        assert!((estimate.log2_fold_change - 1.0).abs() < 1e-9);
        assert_eq!(estimate.degrees_of_freedom, 1);
    }
}
