//! Per-molecule aggregation of chromatogram peak observations.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::warn;

use crate::normalization::NormalizationFactors;
use crate::replicate::ReplicateDataSet;
use crate::run_data::{Id, Molecule};

/// One materialized transition observation: which feature of which molecule
/// was seen in which replicate, under which label, and what was measured.
/// Never persisted, only used to accumulate areas during one request.
#[derive(Clone, PartialEq, Debug)]
struct ChromInfoRecord {
    /// Stable per-(molecule, precursor, transition) identifier.
    feature: String,
    sample_file_id: Id,
    isotope_label: String,
    ms_level: u8,
    area: Option<f64>,
    truncated: bool,
}

/// Accumulator for normalized feature areas of one replicate, keyed by
/// (isotope label, feature name). Repeated writes to the same key overwrite
/// the previous value, they do not sum.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct FeatureAreas {
    areas: IndexMap<(String, String), f64>,
}

impl FeatureAreas {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the area of a feature under a label. The last write for a key
    /// wins.
    pub fn insert(&mut self, isotope_label: &str, feature: &str, area: f64) {
        self.areas
            .insert((isotope_label.to_string(), feature.to_string()), area);
    }

    /// Whether nothing was accumulated.
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Number of accumulated (label, feature) entries.
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// The recorded area for one (label, feature) key.
    pub fn area(&self, isotope_label: &str, feature: &str) -> Option<f64> {
        self.areas
            .get(&(isotope_label.to_string(), feature.to_string()))
            .copied()
    }

    /// Sum of all accumulated areas under the given label, or under every
    /// label when `None`. Returns `None` when no entry matches, so callers
    /// can tell a missing replicate from a measured zero.
    pub fn total_for_label(&self, isotope_label: Option<&str>) -> Option<f64> {
        let mut total = None;
        for ((label, _), area) in &self.areas {
            if isotope_label.is_none_or(|wanted| wanted == label) {
                *total.get_or_insert(0.0) += area;
            }
        }
        total
    }

    /// Iterate over all (label, feature) keys with their areas.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.areas
            .iter()
            .map(|((label, feature), area)| (label.as_str(), feature.as_str(), *area))
    }
}

/// All transition observations of one molecule across the run, grouped by
/// replicate and isotope label. The shared input of calibration curve and
/// fold change computation.
#[derive(Debug)]
pub struct GeneralMoleculeResultDataSet {
    records_by_replicate: IndexMap<Id, Vec<ChromInfoRecord>>,
    replicate_by_sample_file: HashMap<Id, Id>,
}

impl GeneralMoleculeResultDataSet {
    /// Walk all precursors, transitions, and recorded peaks of the molecule
    /// and materialize one record per peak whose sample file belongs to a
    /// known replicate. Peaks from unknown sample files are dropped here.
    pub fn new(replicates: &ReplicateDataSet<'_>, molecule: &Molecule) -> Self {
        let mut records_by_replicate: IndexMap<Id, Vec<ChromInfoRecord>> = IndexMap::new();
        let mut replicate_by_sample_file = HashMap::new();
        for precursor in &molecule.precursors {
            for transition in &precursor.transitions {
                let feature = format!("{}/{}/{}", molecule.id, precursor.key, transition.key);
                for chrom_info in &transition.chrom_infos {
                    let Some(replicate) =
                        replicates.replicate_for_sample_file(chrom_info.sample_file_id)
                    else {
                        continue;
                    };
                    replicate_by_sample_file.insert(replicate.sample_file_id, replicate.id);
                    records_by_replicate
                        .entry(replicate.id)
                        .or_default()
                        .push(ChromInfoRecord {
                            feature: feature.clone(),
                            sample_file_id: chrom_info.sample_file_id,
                            isotope_label: precursor.isotope_label.clone(),
                            ms_level: transition.ms_level,
                            area: chrom_info.area,
                            truncated: chrom_info.truncated,
                        });
                }
            }
        }
        Self {
            records_by_replicate,
            replicate_by_sample_file,
        }
    }

    /// Sum of the raw (non-normalized) areas over all transitions of the
    /// given sample, restricted to one isotope label when given. A sample
    /// file without a replicate mapping sums to exactly 0.
    pub fn total_area(&self, sample_file_id: Id, isotope_label: Option<&str>) -> f64 {
        let Some(replicate_id) = self.replicate_by_sample_file.get(&sample_file_id) else {
            return 0.0;
        };
        self.records_by_replicate
            .get(replicate_id)
            .into_iter()
            .flatten()
            .filter(|record| {
                isotope_label.is_none_or(|wanted| wanted == record.isotope_label)
            })
            .filter_map(|record| record.area)
            .sum()
    }

    /// Feed every observation of one replicate into the accumulator.
    ///
    /// Observations without an area are skipped, as are observations on the
    /// wrong MS level and truncated peaks when truncation is disallowed.
    /// The accumulated value is `max(1.0, raw) * factor`: the floor keeps
    /// zero and negative peak areas from corrupting log-scale fits further
    /// down. Observations whose normalization factor is undefined are
    /// skipped as well.
    pub fn add_feature_data(
        &self,
        replicate_id: Id,
        out: &mut FeatureAreas,
        ms_level: Option<u8>,
        factors: &NormalizationFactors,
        allow_truncated: bool,
    ) {
        for record in self
            .records_by_replicate
            .get(&replicate_id)
            .into_iter()
            .flatten()
        {
            let Some(area) = record.area else {
                continue;
            };
            if ms_level.is_some_and(|wanted| wanted != record.ms_level) {
                continue;
            }
            if record.truncated && !allow_truncated {
                continue;
            }
            let Some(factor) = factors.factor(record.sample_file_id) else {
                warn!(
                    "undefined normalization factor for sample file {}, skipping {}",
                    record.sample_file_id, record.feature
                );
                continue;
            };
            out.insert(
                &record.isotope_label,
                &record.feature,
                area.max(1.0) * factor,
            );
        }
    }
}
