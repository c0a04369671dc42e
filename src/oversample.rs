//! Minority-class oversampling
//!
//! Brings every class up to the majority count by synthesizing rows between a
//! minority row and one of its nearest same-class neighbours. Numeric cells
//! are interpolated at a random point along the segment, nominal cells take
//! the most common value among the neighbours, and a missing cell in the base
//! row stays missing. Classes are processed in label-vocabulary order with one
//! seeded generator, so the output is deterministic.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Result;
use crate::table::{is_missing, AttributeKind, Table};

const NEIGHBOURS: usize = 5;

/// Returns a copy of the table extended with synthetic minority rows.
pub fn oversample(table: &Table, seed: u64) -> Result<Table> {
    let counts = table.class_counts()?;
    let majority = counts.iter().copied().max().unwrap_or(0);
    let label = table.label_index();

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut output = table.clone();
    for (class, &count) in counts.iter().enumerate() {
        if count == 0 || count >= majority {
            continue;
        }
        let members: Vec<usize> = (0..table.n_rows())
            .filter(|&row| table.value(row, label) == class as f64)
            .collect();
        debug!(class, count, majority, "oversampling minority class");

        for _ in 0..majority - count {
            let base = members[rng.gen_range(0..members.len())];
            let neighbours = nearest_neighbours(table, base, &members);
            let row = synthesize(table, base, &neighbours, &mut rng);
            output.push_row(row)?;
        }
    }
    Ok(output)
}

/// Indices of the closest same-class rows to `base`, excluding `base` itself.
/// Falls back to the base row alone when the class has no other member.
fn nearest_neighbours(table: &Table, base: usize, members: &[usize]) -> Vec<usize> {
    let mut scored: Vec<(f64, usize)> = members
        .iter()
        .filter(|&&row| row != base)
        .map(|&row| (distance(table, base, row), row))
        .collect();
    if scored.is_empty() {
        return vec![base];
    }
    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(NEIGHBOURS)
        .map(|(_, row)| row)
        .collect()
}

/// Squared distance over the feature columns, skipping any cell missing on
/// either side. Nominal columns contribute one unit per mismatch.
fn distance(table: &Table, a: usize, b: usize) -> f64 {
    let mut total = 0.0;
    for column in 0..table.label_index() {
        let x = table.value(a, column);
        let y = table.value(b, column);
        if is_missing(x) || is_missing(y) {
            continue;
        }
        match table.attribute(column).kind() {
            AttributeKind::Numeric => total += (x - y) * (x - y),
            AttributeKind::Nominal(_) => {
                if x != y {
                    total += 1.0;
                }
            }
        }
    }
    total
}

fn synthesize(table: &Table, base: usize, neighbours: &[usize], rng: &mut SmallRng) -> Vec<f64> {
    let partner = neighbours[rng.gen_range(0..neighbours.len())];
    let gap: f64 = rng.gen();

    let mut row = Vec::with_capacity(table.n_attributes());
    for column in 0..table.n_attributes() {
        let x = table.value(base, column);
        if column == table.label_index() || is_missing(x) {
            row.push(x);
            continue;
        }
        let value = match table.attribute(column).kind() {
            AttributeKind::Numeric => {
                let y = table.value(partner, column);
                if is_missing(y) {
                    x
                } else {
                    x + gap * (y - x)
                }
            }
            AttributeKind::Nominal(values) => {
                nominal_majority(table, column, neighbours, values.len()).unwrap_or(x)
            }
        };
        row.push(value);
    }
    row
}

/// Most common non-missing value of the column among the neighbours; `None`
/// when every neighbour is missing there, or on a tie with no clear winner.
fn nominal_majority(
    table: &Table,
    column: usize,
    neighbours: &[usize],
    cardinality: usize,
) -> Option<f64> {
    let mut counts = vec![0usize; cardinality];
    for &row in neighbours {
        let value = table.value(row, column);
        if !is_missing(value) {
            counts[value as usize] += 1;
        }
    }
    let best = counts.iter().copied().max()?;
    if best == 0 || counts.iter().filter(|&&c| c == best).count() > 1 {
        return None;
    }
    counts.iter().position(|&c| c == best).map(|i| i as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Attribute, MISSING};

    fn imbalanced_table() -> Table {
        let mut table = Table::new(
            "imbalanced",
            vec![
                Attribute::numeric("f1"),
                Attribute::nominal("f2", vec!["x".into(), "y".into()]),
                Attribute::nominal("class", vec!["minor".into(), "major".into()]),
            ],
        );
        for i in 0..10 {
            table.push_row(vec![i as f64, (i % 2) as f64, 1.0]).unwrap();
        }
        table.push_row(vec![100.0, 0.0, 0.0]).unwrap();
        table.push_row(vec![101.0, 0.0, 0.0]).unwrap();
        table.push_row(vec![102.0, 1.0, 0.0]).unwrap();
        table
    }

    #[test]
    fn classes_are_balanced_to_the_majority() {
        let table = imbalanced_table();
        let balanced = oversample(&table, 42).unwrap();
        assert_eq!(balanced.class_counts().unwrap(), vec![10, 10]);
        // the original rows are untouched at the front
        for row in 0..table.n_rows() {
            assert_eq!(table.row(row), balanced.row(row));
        }
    }

    #[test]
    fn synthetic_numerics_interpolate_between_class_members() {
        let table = imbalanced_table();
        let balanced = oversample(&table, 42).unwrap();
        for row in table.n_rows()..balanced.n_rows() {
            let f1 = balanced.value(row, 0);
            assert!((100.0..=102.0).contains(&f1), "f1 was {}", f1);
            assert_eq!(balanced.value(row, 2), 0.0);
        }
    }

    #[test]
    fn oversampling_is_deterministic_for_a_seed() {
        let table = imbalanced_table();
        let a = oversample(&table, 7).unwrap();
        let b = oversample(&table, 7).unwrap();
        for row in 0..a.n_rows() {
            assert_eq!(a.row(row), b.row(row));
        }
    }

    #[test]
    fn missing_base_cells_stay_missing() {
        let mut table = imbalanced_table();
        table.retain_rows(|row| row[2] == 1.0);
        table.push_row(vec![MISSING, 0.0, 0.0]).unwrap();
        let balanced = oversample(&table, 3).unwrap();
        // the lone minority row is the base of every synthetic row
        for row in table.n_rows()..balanced.n_rows() {
            assert!(is_missing(balanced.value(row, 0)));
        }
    }

    #[test]
    fn balanced_input_is_returned_unchanged() {
        let mut table = imbalanced_table();
        table.retain_rows(|row| row[2] == 1.0);
        let out = oversample(&table, 9).unwrap();
        assert_eq!(out.n_rows(), table.n_rows());
    }
}
