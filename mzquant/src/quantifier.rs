//! Run-level orchestration of calibration curve and fold change
//! computation.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationCurveDataSet;
use crate::group_comparison::{
    FoldChangeResult, GroupComparisonDataSet, GroupRole,
};
use crate::normalization::{NormalizationFactors, NormalizationMethod, NormalizationMethodAreas};
use crate::pvalues::adjust_p_values;
use crate::regression::{CalibrationCurve, RegressionFit, RegressionWeighting};
use crate::replicate::ReplicateDataSet;
use crate::result_data::GeneralMoleculeResultDataSet;
use crate::run_data::{
    Id, IsotopeLabel, Molecule, MoleculeConcentration, PeptideGroup, RunData, StandardType,
};

/// Run-wide quantification configuration. Molecules can override the
/// normalization method individually.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct QuantificationSettings {
    /// The default normalization method for molecules without an override.
    pub normalization_method: NormalizationMethod,
    /// The calibration curve fit to apply.
    pub regression_fit: RegressionFit,
    /// The weighting of calibration points.
    pub regression_weighting: RegressionWeighting,
    /// Restrict quantification to one MS level (1 precursor, 2 fragment),
    /// or use every transition when absent.
    pub ms_level: Option<u8>,
    /// Display units of the specified concentrations, carried through to
    /// reporting unchanged.
    pub units: Option<String>,
}

/// Configuration of one group comparison.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GroupComparisonSettings {
    /// Display name of the comparison.
    pub name: String,
    /// The replicate annotation that partitions the groups.
    pub control_annotation: String,
    /// The annotation value marking the control group.
    pub control_value: String,
    /// The single case value to compare, or every other distinct value of
    /// the annotation when absent.
    pub case_value: Option<String>,
    /// Annotation naming the biological replicate, pairing case and
    /// control measurements that share a value.
    pub identity_annotation: Option<String>,
    /// Combine all non-standard molecules of a peptide group into one
    /// shared model instead of one model per molecule.
    pub per_protein: bool,
}

/// One fitted calibration curve, ready for downstream persistence.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct CalibrationCurveRecord {
    /// The run the curve belongs to.
    pub run_id: Id,
    /// The quantified molecule.
    pub molecule_id: Id,
    /// The fitted curve, possibly carrying an error message instead of
    /// coefficients.
    pub curve: CalibrationCurve,
}

/// Drives calibration curve and fold change computation across all peptide
/// groups and molecules of one run. Owns nothing beyond the borrowed run
/// and settings; all intermediate state lives per call.
#[derive(Copy, Clone, Debug)]
pub struct RunQuantifier<'a> {
    run: &'a RunData,
    settings: &'a QuantificationSettings,
}

impl<'a> RunQuantifier<'a> {
    /// A quantifier over one run.
    pub const fn new(run: &'a RunData, settings: &'a QuantificationSettings) -> Self {
        Self { run, settings }
    }

    /// The normalization method of one molecule: its own override when set,
    /// the run-wide default otherwise.
    fn resolve_normalization(&self, molecule: &'a Molecule) -> &'a NormalizationMethod {
        molecule
            .normalization_method
            .as_ref()
            .unwrap_or(&self.settings.normalization_method)
    }

    /// The isotope label to quantify under the given method: the first
    /// label that is neither an internal standard channel nor the reference
    /// label of a ratio-to-label method. `None` disables calibration for
    /// the molecule.
    fn quantification_label(&self, method: &NormalizationMethod) -> Option<&'a IsotopeLabel> {
        self.run.isotope_labels.iter().find(|label| {
            !label.standard && method.ratio_label() != Some(label.name.as_str())
        })
    }

    /// Fit one calibration curve per molecule of the run.
    ///
    /// When `concentrations` is given, every replicate whose normalized
    /// area can be read back through a usable curve contributes one
    /// back-calculated concentration; replicates without a fitted
    /// concentration are simply absent from the output.
    pub fn calibration_curves(
        &self,
        mut concentrations: Option<&mut Vec<MoleculeConcentration>>,
    ) -> Vec<CalibrationCurveRecord> {
        let replicates = ReplicateDataSet::new(self.run);
        let mut areas = NormalizationMethodAreas::new(self.run, &replicates);
        let mut records = Vec::new();
        for (_, molecule) in self.run.molecules() {
            let method = self.resolve_normalization(molecule);
            let Some(label) = self.quantification_label(method) else {
                debug!("no quantifiable isotope label for {}, skipping", molecule.name);
                continue;
            };
            let data = GeneralMoleculeResultDataSet::new(&replicates, molecule);
            let factors = areas.normalization_factors(method);
            let mut data_set = CalibrationCurveDataSet::new(self.settings.regression_weighting);
            for replicate in replicates.replicates() {
                let excluded = molecule
                    .chrom_info(replicate.sample_file_id)
                    .is_some_and(|info| info.exclude_from_calibration);
                let concentration = replicate.analyte_concentration.map(|concentration| {
                    concentration * molecule.concentration_multiplier.unwrap_or(1.0)
                });
                let entry = data_set.add_replicate(
                    replicate.id,
                    replicate.sample_file_id,
                    replicate.sample_type,
                    concentration,
                    excluded,
                );
                data.add_feature_data(
                    replicate.id,
                    &mut entry.features,
                    self.settings.ms_level,
                    &factors,
                    molecule.allow_truncated,
                );
            }
            let curve = self
                .settings
                .regression_fit
                .fit(&data_set.points(Some(label.name.as_str())));
            if let Some(out) = concentrations.as_deref_mut() {
                back_calculate(out, molecule, &data_set, &curve, &label.name, method);
            }
            records.push(CalibrationCurveRecord {
                run_id: self.run.id,
                molecule_id: molecule.id,
                curve,
            });
        }
        records
    }

    /// Compute every fold change of one comparison across the run and
    /// adjust the p-values over the whole batch.
    pub fn fold_changes(&self, comparison: &GroupComparisonSettings) -> Vec<FoldChangeResult> {
        let replicates = ReplicateDataSet::new(self.run);
        let mut areas = NormalizationMethodAreas::new(self.run, &replicates);
        let case_values: Vec<String> = match &comparison.case_value {
            Some(value) => vec![value.clone()],
            // Multi-case comparison: every other value the annotation takes.
            // Replicates without the annotation belong to no group.
            None => replicates
                .annotation_values(&comparison.control_annotation)
                .into_iter()
                .flatten()
                .filter(|value| *value != comparison.control_value)
                .map(str::to_string)
                .collect(),
        };

        let mut results = Vec::new();
        for group in &self.run.peptide_groups {
            if comparison.per_protein {
                let molecules: Vec<&Molecule> = group
                    .molecules
                    .iter()
                    .filter(|molecule| molecule.standard_type == StandardType::None)
                    .collect();
                self.compare_molecules(
                    &mut results,
                    group,
                    None,
                    &molecules,
                    &case_values,
                    comparison,
                    &replicates,
                    &mut areas,
                );
            } else {
                for molecule in &group.molecules {
                    self.compare_molecules(
                        &mut results,
                        group,
                        Some(molecule.id),
                        &[molecule],
                        &case_values,
                        comparison,
                        &replicates,
                        &mut areas,
                    );
                }
            }
        }

        // Raw p-values leave in encounter order and the adjusted values are
        // written back at the same indices.
        let raw: Vec<f64> = results.iter().map(|result| result.p_value).collect();
        for (result, adjusted) in results.iter_mut().zip(adjust_p_values(&raw)) {
            result.adjusted_p_value = Some(adjusted);
        }
        results
    }

    /// Run one comparison over a set of molecules sharing a model (a single
    /// molecule, or all quantifiable molecules of a group in per-protein
    /// mode).
    #[expect(clippy::too_many_arguments)]
    fn compare_molecules(
        &self,
        results: &mut Vec<FoldChangeResult>,
        group: &PeptideGroup,
        molecule_id: Option<Id>,
        molecules: &[&'a Molecule],
        case_values: &[String],
        comparison: &GroupComparisonSettings,
        replicates: &ReplicateDataSet<'a>,
        areas: &mut NormalizationMethodAreas<'a>,
    ) {
        if molecules.is_empty() {
            return;
        }
        let prepared: Vec<(&NormalizationMethod, GeneralMoleculeResultDataSet, NormalizationFactors)> =
            molecules
                .iter()
                .copied()
                .map(|molecule| {
                    let method = self.resolve_normalization(molecule);
                    (
                        method,
                        GeneralMoleculeResultDataSet::new(replicates, molecule),
                        areas.normalization_factors(method),
                    )
                })
                .collect();

        for case_value in case_values {
            for ms_level in [1, 2] {
                for label in &self.run.isotope_labels {
                    let mut data_set = GroupComparisonDataSet::new();
                    for replicate in replicates.replicates() {
                        let annotation =
                            replicates.annotation_value(replicate, &comparison.control_annotation);
                        let role = if annotation == Some(comparison.control_value.as_str()) {
                            GroupRole::Control
                        } else if annotation == Some(case_value.as_str()) {
                            GroupRole::Case
                        } else {
                            continue;
                        };
                        let identity = comparison
                            .identity_annotation
                            .as_deref()
                            .and_then(|name| replicates.annotation_value(replicate, name))
                            .map(str::to_string);
                        let entry = data_set.add_replicate(replicate.id, role, identity);
                        for ((method, data, factors), molecule) in
                            prepared.iter().zip(molecules)
                        {
                            // Quantifying a label relative to itself is
                            // undefined.
                            if method.ratio_label() == Some(label.name.as_str()) {
                                continue;
                            }
                            data.add_feature_data(
                                replicate.id,
                                &mut entry.features,
                                Some(ms_level),
                                factors,
                                molecule.allow_truncated,
                            );
                        }
                    }
                    let Some(estimate) = data_set.fold_change(Some(label.name.as_str())) else {
                        debug!(
                            "no estimate for {} case {case_value} ms{ms_level} label {}",
                            group.name, label.name
                        );
                        continue;
                    };
                    results.push(FoldChangeResult {
                        run_id: self.run.id,
                        peptide_group_id: group.id,
                        molecule_id,
                        case_value: case_value.clone(),
                        isotope_label_id: label.id,
                        ms_level,
                        log2_fold_change: estimate.log2_fold_change,
                        standard_error: estimate.standard_error,
                        degrees_of_freedom: estimate.degrees_of_freedom,
                        p_value: estimate.p_value,
                        adjusted_p_value: None,
                    });
                }
            }
        }
    }
}

/// Read the concentration of every replicate with a usable area back off
/// the fitted curve. Under ratio-to-label normalization the result scales
/// with the spiked-in internal standard concentration when the molecule
/// declares one.
fn back_calculate(
    out: &mut Vec<MoleculeConcentration>,
    molecule: &Molecule,
    data_set: &CalibrationCurveDataSet,
    curve: &CalibrationCurve,
    label: &str,
    method: &NormalizationMethod,
) {
    if !curve.is_usable() {
        return;
    }
    let scale = match method {
        NormalizationMethod::RatioToLabel { .. } => {
            molecule.internal_standard_concentration.unwrap_or(1.0)
        }
        _ => 1.0,
    };
    for replicate in data_set.replicates() {
        let Some(area) = replicate.features.total_for_label(Some(label)) else {
            continue;
        };
        if let Some(concentration) = curve.x(area) {
            out.push(MoleculeConcentration {
                molecule_id: molecule.id,
                sample_file_id: replicate.sample_file_id,
                concentration: concentration * scale,
            });
        }
    }
}
