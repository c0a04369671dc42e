//! Target attributes and their label-space mappers
//!
//! Each demographic target collapses the raw ground-truth vocabulary into a
//! simplified label space: age buckets are merged above 40, relationship
//! status is binarized, education level comes in a binary and a ternary
//! variant, and occupation is remapped onto a fixed vocabulary with unknown
//! values degrading to the missing sentinel.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::{is_missing, Attribute, Table, MISSING};

/// The demographic label being predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetAttribute {
    AgeGroup,
    Gender,
    Relationship,
    EducationLevelBinary,
    EducationLevelTernary,
    Occupation,
}

impl TargetAttribute {
    pub const ALL: [TargetAttribute; 6] = [
        TargetAttribute::AgeGroup,
        TargetAttribute::Gender,
        TargetAttribute::Relationship,
        TargetAttribute::EducationLevelBinary,
        TargetAttribute::EducationLevelTernary,
        TargetAttribute::Occupation,
    ];

    /// File-name suffix for datasets, caches, models and reports.
    pub fn suffix(&self) -> &'static str {
        match self {
            TargetAttribute::AgeGroup => "AgeGroup",
            TargetAttribute::Gender => "Gender",
            TargetAttribute::Relationship => "Relationship",
            TargetAttribute::EducationLevelBinary => "EducationLevelBinary",
            TargetAttribute::EducationLevelTernary => "EducationLevelTernary",
            TargetAttribute::Occupation => "Occupation",
        }
    }

    /// Name of the raw ground-truth column this target is derived from.
    pub fn column_name(&self) -> &'static str {
        match self {
            TargetAttribute::AgeGroup => "ageGroup",
            TargetAttribute::Gender => "gender",
            TargetAttribute::Relationship => "relationship",
            TargetAttribute::EducationLevelBinary => "education_level",
            TargetAttribute::EducationLevelTernary => "education_level",
            TargetAttribute::Occupation => "occupation",
        }
    }
}

const OCCUPATIONS: [&str; 14] = [
    "archetecture and engineering",
    "protective service",
    "food preparation and service related",
    "management",
    "arts, design, entertainment, sports, and media",
    "office and administrative support",
    "personal care and service",
    "sales and related",
    "legal",
    "transportation and material moving",
    "production",
    "construction and extraction",
    "education, training, and library",
    "business and financial operations",
];

/// Maps raw ground-truth category indices into a target's label space.
///
/// Built once against the ground-truth table so the raw vocabulary is
/// available to the containment rules. Mapping a missing value is undefined;
/// callers pass missing through without consulting the mapper.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    target: TargetAttribute,
    raw_column: usize,
    raw_values: Vec<String>,
}

impl AttributeMapper {
    pub fn new(target: TargetAttribute, ground_truth: &Table) -> Result<Self> {
        let raw_column = ground_truth
            .column_index(target.column_name())
            .ok_or_else(|| Error::MissingColumn(target.column_name().to_string()))?;
        let raw_values = ground_truth
            .attribute(raw_column)
            .values()
            .ok_or_else(|| {
                Error::InvalidTable(format!(
                    "ground-truth column '{}' is not nominal",
                    target.column_name()
                ))
            })?
            .to_vec();
        Ok(AttributeMapper {
            target,
            raw_column,
            raw_values,
        })
    }

    pub fn target(&self) -> TargetAttribute {
        self.target
    }

    pub fn name(&self) -> &'static str {
        self.target.suffix()
    }

    /// Index of the raw column in the ground-truth table.
    pub fn raw_column(&self) -> usize {
        self.raw_column
    }

    /// The output column this mapper produces.
    pub fn output_attribute(&self) -> Attribute {
        match self.target {
            TargetAttribute::AgeGroup => Attribute::nominal(
                "ageGroup",
                vec![
                    "AGE10_20".into(),
                    "AGE20_30".into(),
                    "AGE30_40".into(),
                    "AGE40_INF".into(),
                ],
            ),
            // the raw gender vocabulary is kept as-is
            TargetAttribute::Gender => Attribute::nominal("gender", self.raw_values.clone()),
            TargetAttribute::Relationship => Attribute::nominal(
                "relationship",
                vec!["single".into(), "in a relationship".into()],
            ),
            TargetAttribute::EducationLevelBinary => Attribute::nominal(
                "education_level_binary",
                vec!["school".into(), "university".into()],
            ),
            TargetAttribute::EducationLevelTernary => Attribute::nominal(
                "education_level_ternary",
                vec!["school".into(), "undergraduate".into(), "graduate".into()],
            ),
            TargetAttribute::Occupation => Attribute::nominal(
                "occupation",
                OCCUPATIONS.iter().map(|s| s.to_string()).collect(),
            ),
        }
    }

    /// Maps a raw category index to an index in the output vocabulary, or the
    /// missing sentinel where no target category exists.
    pub fn map(&self, raw: f64) -> f64 {
        debug_assert!(!is_missing(raw), "mapping a missing value is undefined");
        let name = &self.raw_values[raw as usize];
        match self.target {
            TargetAttribute::AgeGroup => {
                if name.contains("50") {
                    3.0
                } else {
                    raw
                }
            }
            TargetAttribute::Gender => raw,
            TargetAttribute::Relationship => {
                if name == "single" {
                    0.0
                } else {
                    1.0
                }
            }
            TargetAttribute::EducationLevelBinary => {
                if name.contains("school") {
                    0.0
                } else {
                    1.0
                }
            }
            TargetAttribute::EducationLevelTernary => {
                if name.contains("school") {
                    0.0
                } else if name.contains("student") {
                    1.0
                } else {
                    2.0
                }
            }
            TargetAttribute::Occupation => OCCUPATIONS
                .iter()
                .position(|o| o == name)
                .map(|i| i as f64)
                .unwrap_or(MISSING),
        }
    }
}
