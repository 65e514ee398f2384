//! Accumulation of one molecule's calibration curve points.

use indexmap::IndexMap;

use crate::regression::{RegressionWeighting, WeightedPoint};
use crate::result_data::FeatureAreas;
use crate::run_data::{Id, SampleType};

/// One replicate's entry in a calibration data set: its roster data plus
/// the feature areas accumulated for it. Excluded replicates stay in the
/// roster, they just contribute no curve point.
#[derive(Clone, PartialEq, Debug)]
pub struct CalibrationReplicate {
    /// The replicate.
    pub replicate_id: Id,
    /// The sample file of the replicate.
    pub sample_file_id: Id,
    /// The role of the replicate's sample.
    pub sample_type: SampleType,
    /// The specified concentration, already scaled by the molecule's
    /// concentration multiplier.
    pub concentration: Option<f64>,
    /// Whether this replicate was flagged to be left out of the fit.
    pub excluded: bool,
    /// The accumulated normalized feature areas.
    pub features: FeatureAreas,
}

/// The points of one calibration curve: per-replicate concentration versus
/// normalized area, with the weighting the fit should apply.
#[derive(Clone, PartialEq, Debug)]
pub struct CalibrationCurveDataSet {
    replicates: IndexMap<Id, CalibrationReplicate>,
    weighting: RegressionWeighting,
}

impl CalibrationCurveDataSet {
    /// An empty data set using the given point weighting.
    pub fn new(weighting: RegressionWeighting) -> Self {
        Self {
            replicates: IndexMap::new(),
            weighting,
        }
    }

    /// Register a replicate and hand out its entry for feature
    /// accumulation.
    pub fn add_replicate(
        &mut self,
        replicate_id: Id,
        sample_file_id: Id,
        sample_type: SampleType,
        concentration: Option<f64>,
        excluded: bool,
    ) -> &mut CalibrationReplicate {
        self.replicates
            .entry(replicate_id)
            .or_insert(CalibrationReplicate {
                replicate_id,
                sample_file_id,
                sample_type,
                concentration,
                excluded,
                features: FeatureAreas::new(),
            })
    }

    /// The full replicate roster, excluded entries included.
    pub fn replicates(&self) -> impl Iterator<Item = &CalibrationReplicate> {
        self.replicates.values()
    }

    /// The curve points: one per non-excluded standard replicate with a
    /// known concentration and at least one accumulated feature under the
    /// given label.
    pub fn points(&self, isotope_label: Option<&str>) -> Vec<WeightedPoint> {
        self.replicates()
            .filter(|replicate| {
                !replicate.excluded && replicate.sample_type == SampleType::Standard
            })
            .filter_map(|replicate| {
                let x = replicate.concentration?;
                let y = replicate.features.total_for_label(isotope_label)?;
                Some(WeightedPoint {
                    x,
                    y,
                    weight: self.weighting.weight(x),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_set_with_standards() -> CalibrationCurveDataSet {
        let mut data_set = CalibrationCurveDataSet::new(RegressionWeighting::None);
        for (id, concentration, area, excluded) in [
            (1, Some(1.0), 100.0, false),
            (2, Some(2.0), 200.0, true),
            (3, Some(4.0), 400.0, false),
            (4, None, 250.0, false),
        ] {
            let entry =
                data_set.add_replicate(id, id * 10, SampleType::Standard, concentration, excluded);
            entry.features.insert("light", "feature", area);
        }
        data_set.add_replicate(5, 50, SampleType::Unknown, None, false);
        data_set
    }

    #[test]
    fn excluded_and_concentrationless_replicates_yield_no_points() {
        let data_set = data_set_with_standards();
        let points = data_set.points(Some("light"));
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x, 1.0);
        assert_eq!(points[1].x, 4.0);
    }

    #[test]
    fn excluded_replicates_stay_in_the_roster() {
        let data_set = data_set_with_standards();
        let excluded: Vec<Id> = data_set
            .replicates()
            .filter(|replicate| replicate.excluded)
            .map(|replicate| replicate.replicate_id)
            .collect();
        assert_eq!(excluded, vec![2]);
        assert_eq!(data_set.replicates().count(), 5);
    }

    #[test]
    fn weighting_is_applied_per_point() {
        let mut data_set = CalibrationCurveDataSet::new(RegressionWeighting::OneOverX);
        let entry = data_set.add_replicate(1, 10, SampleType::Standard, Some(4.0), false);
        entry.features.insert("light", "feature", 400.0);
        let points = data_set.points(Some("light"));
        assert_eq!(points[0].weight, 0.25);
    }
}
