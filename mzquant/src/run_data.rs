//! The in-memory model of one experimental run.
//!
//! The quantification engine never talks to storage itself: the caller
//! enumerates replicates, isotope labels, and peptide groups up front and
//! hands them over in a [`RunData`]. Every structure in here is plain owned
//! data, built once per quantification request and dropped afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::normalization::NormalizationMethod;

/// Database-style integer identifier for replicates, sample files,
/// molecules, and the other entities of a run.
pub type Id = i64;

/// The role of a sample within an experiment.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
)]
pub enum SampleType {
    /// A sample of unknown concentration, the thing being measured.
    #[default]
    Unknown,
    /// An external standard with a known analyte concentration.
    Standard,
    /// A quality control sample with a known concentration, not used for
    /// curve fitting.
    QualityControl,
    /// A solvent-only injection.
    Solvent,
    /// A blank sample (matrix without analyte).
    Blank,
    /// A double blank (no analyte and no internal standard).
    DoubleBlank,
}

impl SampleType {
    /// Parse the historical name of a sample type. Unrecognized names map to
    /// [`Self::Unknown`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "standard" => Self::Standard,
            "qc" => Self::QualityControl,
            "solvent" => Self::Solvent,
            "blank" => Self::Blank,
            "double_blank" => Self::DoubleBlank,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Unknown => "unknown",
                Self::Standard => "standard",
                Self::QualityControl => "qc",
                Self::Solvent => "solvent",
                Self::Blank => "blank",
                Self::DoubleBlank => "double_blank",
            }
        )
    }
}

/// Marks a molecule as serving as a standard for normalization purposes.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
)]
pub enum StandardType {
    /// An ordinary analyte.
    #[default]
    None,
    /// A global normalization standard, summed into the denominator of
    /// global-standards normalization.
    Normalization,
    /// A surrogate standard, used as the denominator for analytes that
    /// normalize against it by name.
    Surrogate,
}

/// A labeling channel (for example "light" or "heavy") distinguishing
/// otherwise identical analyte forms within one run.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct IsotopeLabel {
    /// Identifier of this label within the run.
    pub id: Id,
    /// The display name, also used to match precursors to this label.
    pub name: String,
    /// Whether this channel contains an internal standard rather than the
    /// analyte itself.
    pub standard: bool,
}

/// One injection of one sample, mapped to exactly one sample file.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Replicate {
    /// Identifier of this replicate within the run.
    pub id: Id,
    /// The sample file this replicate was read from.
    pub sample_file_id: Id,
    /// The role of the injected sample.
    pub sample_type: SampleType,
    /// The known analyte concentration, present for standards and quality
    /// control samples.
    pub analyte_concentration: Option<f64>,
    /// Free-form named annotations, for example the grouping annotation a
    /// group comparison partitions on.
    pub annotations: IndexMap<String, String>,
}

impl Replicate {
    /// A replicate with no annotations and no known concentration.
    pub fn new(id: Id, sample_file_id: Id, sample_type: SampleType) -> Self {
        Self {
            id,
            sample_file_id,
            sample_type,
            analyte_concentration: None,
            annotations: IndexMap::new(),
        }
    }
}

/// One observed chromatogram peak of one transition in one sample file.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct TransitionChromInfo {
    /// The sample file the peak was integrated from.
    pub sample_file_id: Id,
    /// The integrated peak area, absent when no peak was found.
    pub area: Option<f64>,
    /// Whether the peak ran off the edge of the chromatogram window.
    pub truncated: bool,
}

/// One monitored fragment or precursor ion.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Transition {
    /// Stable key of this transition within its precursor (for example the
    /// fragment ion name).
    pub key: String,
    /// 1 for precursor-level chromatograms, 2 for fragment-level ones.
    pub ms_level: u8,
    /// The observed peaks, at most one per sample file.
    pub chrom_infos: Vec<TransitionChromInfo>,
}

/// A selected intact ion of a molecule, carrying its isotope label and the
/// transitions monitored from it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Precursor {
    /// Stable key of this precursor within its molecule (for example the
    /// charge state).
    pub key: String,
    /// Name of the isotope label of this precursor.
    pub isotope_label: String,
    /// All monitored transitions.
    pub transitions: Vec<Transition>,
}

/// Per-replicate state of a molecule, the row back-calculated
/// concentrations are recorded against.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct MoleculeChromInfo {
    /// The sample file of the replicate this row belongs to.
    pub sample_file_id: Id,
    /// Whether this replicate is left out of calibration curve fitting.
    pub exclude_from_calibration: bool,
}

/// A peptide or small molecule with all of its measured data.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Molecule {
    /// Identifier of this molecule within the run.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// Standard role of this molecule, [`StandardType::None`] for ordinary
    /// analytes.
    pub standard_type: StandardType,
    /// Per-molecule override of the run-wide normalization method.
    pub normalization_method: Option<NormalizationMethod>,
    /// Multiplier applied to the specified concentration of every standard
    /// replicate when fitting this molecule's curve.
    pub concentration_multiplier: Option<f64>,
    /// The spiked-in internal standard concentration, scaling
    /// back-calculated concentrations under ratio-to-label normalization.
    pub internal_standard_concentration: Option<f64>,
    /// Whether truncated transition peaks still count towards this
    /// molecule's quantification.
    pub allow_truncated: bool,
    /// All precursors with their transitions and peaks.
    pub precursors: Vec<Precursor>,
    /// Per-replicate rows, keyed by sample file.
    pub chrom_infos: Vec<MoleculeChromInfo>,
}

impl Molecule {
    /// A molecule with no measured data yet.
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            standard_type: StandardType::None,
            normalization_method: None,
            concentration_multiplier: None,
            internal_standard_concentration: None,
            allow_truncated: false,
            precursors: Vec::new(),
            chrom_infos: Vec::new(),
        }
    }

    /// The molecule-level row for the given sample file, if any.
    pub fn chrom_info(&self, sample_file_id: Id) -> Option<&MoleculeChromInfo> {
        self.chrom_infos
            .iter()
            .find(|info| info.sample_file_id == sample_file_id)
    }
}

/// A protein or molecule list grouping related molecules.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PeptideGroup {
    /// Identifier of this group within the run.
    pub id: Id,
    /// Display name.
    pub name: String,
    /// The molecules of this group.
    pub molecules: Vec<Molecule>,
}

/// Everything the engine needs to know about one experimental run.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RunData {
    /// Identifier of the run.
    pub id: Id,
    /// All labeling channels defined for the run.
    pub isotope_labels: Vec<IsotopeLabel>,
    /// All replicates, each mapping to one sample file.
    pub replicates: Vec<Replicate>,
    /// All peptide groups with their molecules.
    pub peptide_groups: Vec<PeptideGroup>,
}

impl RunData {
    /// Iterate over every molecule of the run, paired with its group.
    pub fn molecules(&self) -> impl Iterator<Item = (&PeptideGroup, &Molecule)> {
        self.peptide_groups
            .iter()
            .flat_map(|group| group.molecules.iter().map(move |molecule| (group, molecule)))
    }
}

/// A back-calculated concentration for one molecule in one replicate,
/// produced alongside calibration curves when the caller asks for it.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct MoleculeConcentration {
    /// The quantified molecule.
    pub molecule_id: Id,
    /// The sample file of the replicate.
    pub sample_file_id: Id,
    /// The concentration read off the fitted curve.
    pub concentration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_type_names_round_trip() {
        for sample_type in [
            SampleType::Unknown,
            SampleType::Standard,
            SampleType::QualityControl,
            SampleType::Solvent,
            SampleType::Blank,
            SampleType::DoubleBlank,
        ] {
            assert_eq!(SampleType::from_name(&sample_type.to_string()), sample_type);
        }
        assert_eq!(SampleType::from_name("mystery"), SampleType::Unknown);
    }

    #[test]
    fn chrom_info_lookup_by_sample_file() {
        let mut molecule = Molecule::new(1, "PEPTIDE");
        molecule.chrom_infos = vec![MoleculeChromInfo {
            sample_file_id: 7,
            exclude_from_calibration: true,
        }];
        assert!(molecule.chrom_info(7).unwrap().exclude_from_calibration);
        assert!(molecule.chrom_info(8).is_none());
    }
}
