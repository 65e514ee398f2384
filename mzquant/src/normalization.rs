//! Normalization methods and the per-sample denominator areas they need.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::replicate::ReplicateDataSet;
use crate::result_data::GeneralMoleculeResultDataSet;
use crate::run_data::{Id, Molecule, RunData, StandardType};

/// How raw peak areas are scaled into abundances comparable across samples.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
pub enum NormalizationMethod {
    /// No normalization, every factor is 1.
    #[default]
    None,
    /// Divide by the summed area of all molecules tagged as normalization
    /// standards in the same sample.
    GlobalStandards,
    /// Divide by the summed area of the named surrogate standard molecule
    /// in the same sample, optionally restricted to one isotope label.
    RatioToSurrogate {
        /// Display name of the surrogate standard molecule.
        name: String,
        /// Restrict the surrogate area to this label when set.
        isotope_label: Option<String>,
    },
    /// Quantify relative to another labeling channel. Carries no area-based
    /// factor here: the caller applies it by selecting which isotope label
    /// to quantify.
    RatioToLabel {
        /// Name of the reference label, typically "heavy".
        label: String,
    },
}

impl NormalizationMethod {
    /// Parse the historical name of a normalization method. Unrecognized or
    /// absent names fall back to [`Self::None`].
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("global_standards") => Self::GlobalStandards,
            Some(name) if name.starts_with("surrogate_") => {
                let rest = &name["surrogate_".len()..];
                match rest.split_once(':') {
                    Some((surrogate, label)) => Self::RatioToSurrogate {
                        name: surrogate.to_string(),
                        isotope_label: Some(label.to_string()),
                    },
                    None => Self::RatioToSurrogate {
                        name: rest.to_string(),
                        isotope_label: None,
                    },
                }
            }
            Some(name) if name.strip_prefix("ratio_to_").is_some_and(|l| !l.is_empty()) => {
                Self::RatioToLabel {
                    label: name["ratio_to_".len()..].to_string(),
                }
            }
            _ => Self::None,
        }
    }

    /// Whether this method divides by a per-sample standard area. The other
    /// methods normalize with factor 1 at this layer.
    pub fn needs_area(&self) -> bool {
        matches!(self, Self::GlobalStandards | Self::RatioToSurrogate { .. })
    }

    /// The reference label when this is a ratio-to-label method.
    pub fn ratio_label(&self) -> Option<&str> {
        match self {
            Self::RatioToLabel { label } => Some(label),
            _ => None,
        }
    }
}

impl std::fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::GlobalStandards => write!(f, "global_standards"),
            Self::RatioToSurrogate {
                name,
                isotope_label: Some(label),
            } => write!(f, "surrogate_{name}:{label}"),
            Self::RatioToSurrogate {
                name,
                isotope_label: None,
            } => write!(f, "surrogate_{name}"),
            Self::RatioToLabel { label } => write!(f, "ratio_to_{label}"),
        }
    }
}

/// Multiplicative per-sample normalization factors for one method.
///
/// The factor is the reciprocal of the standard area of that sample. A
/// sample whose standard area is zero (for example a surrogate restricted
/// to a label that does not occur in the run) has no defined factor, and
/// observations of that sample are skipped rather than divided by zero.
#[derive(Clone, PartialEq, Debug)]
pub enum NormalizationFactors {
    /// The method needs no denominator, every factor is exactly 1.
    Unit,
    /// Denominator areas per sample file.
    Areas(HashMap<Id, f64>),
}

impl NormalizationFactors {
    /// Factors for a method without normalization.
    pub const fn unit() -> Self {
        Self::Unit
    }

    /// The factor for one sample file, `None` when undefined.
    pub fn factor(&self, sample_file_id: Id) -> Option<f64> {
        match self {
            Self::Unit => Some(1.0),
            Self::Areas(areas) => {
                let area = areas.get(&sample_file_id).copied().unwrap_or(0.0);
                (area > 0.0 && area.is_finite()).then(|| 1.0 / area)
            }
        }
    }
}

/// One molecule of the run tagged as a normalization or surrogate standard.
#[derive(Debug)]
struct StandardEntry<'a> {
    standard_type: StandardType,
    display_name: &'a str,
    molecule: &'a Molecule,
}

/// Computes and memoizes, per normalization method, the denominator areas
/// of every sample in a run. Owned by one quantification request; the
/// caches die with it.
#[derive(Debug)]
pub struct NormalizationMethodAreas<'a> {
    run: &'a RunData,
    replicates: &'a ReplicateDataSet<'a>,
    standard_entries: Option<Vec<StandardEntry<'a>>>,
    datasets_by_method: IndexMap<String, Vec<GeneralMoleculeResultDataSet>>,
}

impl<'a> NormalizationMethodAreas<'a> {
    /// Set up the (initially empty) caches for one run.
    pub fn new(run: &'a RunData, replicates: &'a ReplicateDataSet<'a>) -> Self {
        Self {
            run,
            replicates,
            standard_entries: None,
            datasets_by_method: IndexMap::new(),
        }
    }

    /// All molecules of the run tagged as standards, loaded on first use.
    fn standard_entries(&mut self) -> &[StandardEntry<'a>] {
        if self.standard_entries.is_none() {
            self.standard_entries = Some(
                self.run
                    .molecules()
                    .filter(|(_, molecule)| molecule.standard_type != StandardType::None)
                    .map(|(_, molecule)| StandardEntry {
                        standard_type: molecule.standard_type,
                        display_name: &molecule.name,
                        molecule,
                    })
                    .collect(),
            );
        }
        self.standard_entries.as_deref().unwrap_or_default()
    }

    /// The result data sets of all standard molecules matching the method,
    /// built and memoized on first use per method.
    fn datasets(&mut self, method: &NormalizationMethod) -> &[GeneralMoleculeResultDataSet] {
        let key = method.to_string();
        if !self.datasets_by_method.contains_key(&key) {
            let replicates = self.replicates;
            let molecules: Vec<&Molecule> = self
                .standard_entries()
                .iter()
                .filter(|entry| match method {
                    NormalizationMethod::GlobalStandards => {
                        entry.standard_type == StandardType::Normalization
                    }
                    NormalizationMethod::RatioToSurrogate { name, .. } => {
                        entry.standard_type == StandardType::Surrogate
                            && entry.display_name == name
                    }
                    _ => false,
                })
                .map(|entry| entry.molecule)
                .collect();
            debug!("{} standard molecules for method {key}", molecules.len());
            let datasets = molecules
                .into_iter()
                .map(|molecule| GeneralMoleculeResultDataSet::new(replicates, molecule))
                .collect();
            self.datasets_by_method.insert(key.clone(), datasets);
        }
        &self.datasets_by_method[&key]
    }

    /// The denominator area for one sample under one method. Methods
    /// without normalization always yield 1. A surrogate restricted to an
    /// isotope label that never occurs in the run sums to 0, leaving the
    /// factor undefined downstream.
    pub fn area_for_normalization(
        &mut self,
        method: &NormalizationMethod,
        sample_file_id: Id,
    ) -> f64 {
        if !method.needs_area() {
            return 1.0;
        }
        let label = match method {
            NormalizationMethod::RatioToSurrogate { isotope_label, .. } => isotope_label.clone(),
            _ => None,
        };
        self.datasets(method)
            .iter()
            .map(|dataset| dataset.total_area(sample_file_id, label.as_deref()))
            .sum()
    }

    /// The factor provider for one method, covering every sample file of
    /// the run.
    pub fn normalization_factors(&mut self, method: &NormalizationMethod) -> NormalizationFactors {
        if !method.needs_area() {
            return NormalizationFactors::Unit;
        }
        let sample_file_ids: Vec<Id> = self
            .replicates
            .replicates()
            .map(|replicate| replicate.sample_file_id)
            .collect();
        NormalizationFactors::Areas(
            sample_file_ids
                .into_iter()
                .map(|id| (id, self.area_for_normalization(method, id)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_names_fall_back_to_none() {
        assert_eq!(NormalizationMethod::from_name(None), NormalizationMethod::None);
        assert_eq!(
            NormalizationMethod::from_name(Some("equalize_medians")),
            NormalizationMethod::None
        );
        assert_eq!(
            NormalizationMethod::from_name(Some("ratio_to_")),
            NormalizationMethod::None
        );
    }

    #[test]
    fn names_round_trip() {
        for name in [
            "none",
            "global_standards",
            "surrogate_Histidine",
            "surrogate_Histidine:heavy",
            "ratio_to_heavy",
        ] {
            let method = NormalizationMethod::from_name(Some(name));
            assert_eq!(method.to_string(), name);
        }
    }

    #[test]
    fn area_for_none_is_always_one() {
        let run = RunData {
            id: 1,
            isotope_labels: Vec::new(),
            replicates: Vec::new(),
            peptide_groups: Vec::new(),
        };
        let replicates = ReplicateDataSet::new(&run);
        let mut areas = NormalizationMethodAreas::new(&run, &replicates);
        for sample_file_id in [0, 1, 42, 9999] {
            assert_eq!(
                areas.area_for_normalization(&NormalizationMethod::None, sample_file_id),
                1.0
            );
        }
    }

    #[test]
    fn zero_area_leaves_factor_undefined() {
        let factors = NormalizationFactors::Areas(HashMap::from([(1, 0.0), (2, 50.0)]));
        assert_eq!(factors.factor(1), None);
        assert_eq!(factors.factor(2), Some(0.02));
        assert_eq!(factors.factor(3), None);
    }
}
