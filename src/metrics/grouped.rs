//! Skill reports per group of sites (country, continent, climate class).

use serde::Serialize;

use super::{skill_report, SkillReport};
use crate::dataset::{Column, Dataset};
use crate::error::{ErosivityError, Result};

/// Skill of one group. A degenerate group carries its error as a string so
/// the remaining groups still report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSkill {
    pub group: String,
    pub rows: usize,
    #[serde(flatten)]
    pub report: Option<SkillReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GroupSkill {
    pub fn new(group: String, rows: usize, result: Result<SkillReport>) -> Self {
        match result {
            Ok(report) => Self {
                group,
                rows,
                report: Some(report),
                error: None,
            },
            Err(e) => Self {
                group,
                rows,
                report: None,
                error: Some(e.to_string()),
            },
        }
    }
}

fn group_labels(dataset: &Dataset, group_column: &str) -> Result<Vec<String>> {
    match dataset.column(group_column) {
        Some(Column::Text(labels)) => Ok(labels.clone()),
        Some(Column::Numeric(values)) => Ok(values.iter().map(|v| v.to_string()).collect()),
        None => Err(ErosivityError::MissingColumn {
            name: group_column.to_string(),
        }),
    }
}

/// One [`GroupSkill`] per distinct value of `group_column`, in first-seen order
pub fn skill_by_group(
    dataset: &Dataset,
    group_column: &str,
    observed: &str,
    predicted: &str,
) -> Result<Vec<GroupSkill>> {
    let labels = group_labels(dataset, group_column)?;
    let obs = dataset.numeric(observed)?;
    let pred = dataset.numeric(predicted)?;

    let mut order: Vec<String> = Vec::new();
    for label in &labels {
        if !order.contains(label) {
            order.push(label.clone());
        }
    }

    Ok(order
        .into_iter()
        .map(|group| {
            let rows: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == group).collect();
            let o: Vec<f64> = rows.iter().map(|&i| obs[i]).collect();
            let p: Vec<f64> = rows.iter().map(|&i| pred[i]).collect();
            GroupSkill::new(group, rows.len(), skill_report(&o, &p))
        })
        .collect())
}
