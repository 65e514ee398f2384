//! Lookup structure over the replicates of one run.

use std::collections::{BTreeSet, HashMap};

use crate::run_data::{Id, IsotopeLabel, Replicate, RunData};

/// Indexes the replicates, the sample-file mapping, and the isotope labels
/// of one run. Built once per quantification request and never mutated
/// afterwards.
#[derive(Debug)]
pub struct ReplicateDataSet<'a> {
    run: &'a RunData,
    by_sample_file: HashMap<Id, &'a Replicate>,
    labels_by_id: HashMap<Id, &'a IsotopeLabel>,
}

impl<'a> ReplicateDataSet<'a> {
    /// Index the given run.
    pub fn new(run: &'a RunData) -> Self {
        Self {
            run,
            by_sample_file: run
                .replicates
                .iter()
                .map(|replicate| (replicate.sample_file_id, replicate))
                .collect(),
            labels_by_id: run
                .isotope_labels
                .iter()
                .map(|label| (label.id, label))
                .collect(),
        }
    }

    /// All replicates of the run, in run order.
    pub fn replicates(&self) -> impl Iterator<Item = &'a Replicate> {
        self.run.replicates.iter()
    }

    /// The replicate a sample file belongs to, if the file is part of this
    /// run.
    pub fn replicate_for_sample_file(&self, sample_file_id: Id) -> Option<&'a Replicate> {
        self.by_sample_file.get(&sample_file_id).copied()
    }

    /// The name of an isotope label. Unknown ids fall back to `"light"`,
    /// the name of the implicit unlabeled channel.
    pub fn isotope_label_name(&self, id: Id) -> &'a str {
        self.labels_by_id
            .get(&id)
            .copied()
            .map_or("light", |label| label.name.as_str())
    }

    /// The value of the named annotation on the given replicate, if set.
    pub fn annotation_value(&self, replicate: &'a Replicate, name: &str) -> Option<&'a str> {
        replicate.annotations.get(name).map(String::as_str)
    }

    /// All distinct values the named annotation takes across the run's
    /// replicates. A replicate that lacks the annotation contributes a
    /// `None` member, so callers must tolerate one in the set.
    pub fn annotation_values(&self, name: &str) -> BTreeSet<Option<&'a str>> {
        self.replicates()
            .map(|replicate| self.annotation_value(replicate, name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_data::SampleType;

    fn run_with_annotations() -> RunData {
        let mut annotated = Replicate::new(1, 10, SampleType::Unknown);
        annotated
            .annotations
            .insert("Condition".to_string(), "Disease".to_string());
        RunData {
            id: 1,
            isotope_labels: vec![IsotopeLabel {
                id: 7,
                name: "heavy".to_string(),
                standard: true,
            }],
            replicates: vec![annotated, Replicate::new(2, 20, SampleType::Unknown)],
            peptide_groups: Vec::new(),
        }
    }

    #[test]
    fn unknown_label_falls_back_to_light() {
        let run = run_with_annotations();
        let replicates = ReplicateDataSet::new(&run);
        assert_eq!(replicates.isotope_label_name(7), "heavy");
        assert_eq!(replicates.isotope_label_name(99), "light");
    }

    #[test]
    fn missing_annotation_contributes_none_member() {
        let run = run_with_annotations();
        let replicates = ReplicateDataSet::new(&run);
        let values = replicates.annotation_values("Condition");
        assert_eq!(values.len(), 2);
        assert!(values.contains(&Some("Disease")));
        assert!(values.contains(&None));
    }

    #[test]
    fn sample_file_lookup() {
        let run = run_with_annotations();
        let replicates = ReplicateDataSet::new(&run);
        assert_eq!(replicates.replicate_for_sample_file(20).map(|r| r.id), Some(2));
        assert!(replicates.replicate_for_sample_file(30).is_none());
    }
}
