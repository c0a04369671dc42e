//! Minimal ARFF reader/writer for the table format used across the pipeline.
//!
//! Covers what the pipeline emits and re-reads: numeric, nominal and string
//! attributes, `?` missing cells, `%` comments and quoted names/values. String
//! attributes are materialized as nominal columns with the vocabulary built in
//! order of appearance.

use crate::error::{Error, Result};

use super::{Attribute, Table, MISSING};

enum ColumnSpec {
    Numeric,
    Nominal(Vec<String>),
    Str(Vec<String>),
}

pub(crate) fn read(content: &str) -> Result<Table> {
    let mut relation = String::new();
    let mut specs: Vec<(String, ColumnSpec)> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut in_data = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        if in_data {
            rows.push(parse_data_line(line, &mut specs)?);
            continue;
        }
        let lower = line.to_ascii_lowercase();
        if lower.starts_with("@relation") {
            relation = unquote(line["@relation".len()..].trim());
        } else if lower.starts_with("@attribute") {
            specs.push(parse_attribute(line["@attribute".len()..].trim())?);
        } else if lower.starts_with("@data") {
            in_data = true;
        } else {
            return Err(Error::InvalidTable(format!("unexpected ARFF line: {}", line)));
        }
    }

    if specs.is_empty() {
        return Err(Error::InvalidTable("ARFF header declares no attributes".into()));
    }

    let attributes = specs
        .into_iter()
        .map(|(name, spec)| match spec {
            ColumnSpec::Numeric => Attribute::numeric(name),
            ColumnSpec::Nominal(values) | ColumnSpec::Str(values) => {
                Attribute::nominal(name, values)
            }
        })
        .collect();

    let mut table = Table::new(relation, attributes);
    for row in rows {
        table.push_row(row)?;
    }
    Ok(table)
}

fn parse_attribute(rest: &str) -> Result<(String, ColumnSpec)> {
    let (name, spec) = if rest.starts_with('\'') || rest.starts_with('"') {
        let quote = rest.chars().next().unwrap();
        let end = rest[1..]
            .find(quote)
            .ok_or_else(|| Error::InvalidTable(format!("unterminated quote in: {}", rest)))?;
        (rest[1..=end].to_string(), rest[end + 2..].trim())
    } else {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_string();
        (name, parts.next().unwrap_or_default().trim())
    };

    if name.is_empty() || spec.is_empty() {
        return Err(Error::InvalidTable(format!("malformed attribute: {}", rest)));
    }

    let spec = if spec.starts_with('{') {
        let inner = spec
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| Error::InvalidTable(format!("malformed vocabulary: {}", spec)))?;
        ColumnSpec::Nominal(split_quoted(inner)?.into_iter().map(unquote_owned).collect())
    } else {
        match spec.to_ascii_lowercase().as_str() {
            "numeric" | "real" | "integer" => ColumnSpec::Numeric,
            "string" => ColumnSpec::Str(Vec::new()),
            other => {
                return Err(Error::InvalidTable(format!(
                    "unsupported attribute type: {}",
                    other
                )))
            }
        }
    };
    Ok((name, spec))
}

fn parse_data_line(line: &str, specs: &mut [(String, ColumnSpec)]) -> Result<Vec<f64>> {
    let cells = split_quoted(line)?;
    if cells.len() != specs.len() {
        return Err(Error::InvalidTable(format!(
            "data row has {} cells, header declares {} attributes",
            cells.len(),
            specs.len()
        )));
    }
    cells
        .into_iter()
        .zip(specs.iter_mut())
        .map(|(cell, (name, spec))| {
            if cell == "?" {
                return Ok(MISSING);
            }
            let cell = unquote_owned(cell);
            match spec {
                ColumnSpec::Numeric => cell
                    .parse::<f64>()
                    .map_err(|_| Error::InvalidTable(format!("bad number '{}' in {}", cell, name))),
                ColumnSpec::Nominal(values) => values
                    .iter()
                    .position(|v| *v == cell)
                    .map(|i| i as f64)
                    .ok_or_else(|| {
                        Error::InvalidTable(format!("value '{}' not in vocabulary of {}", cell, name))
                    }),
                ColumnSpec::Str(values) => {
                    let index = match values.iter().position(|v| *v == cell) {
                        Some(index) => index,
                        None => {
                            values.push(cell);
                            values.len() - 1
                        }
                    };
                    Ok(index as f64)
                }
            }
        })
        .collect()
}

/// Splits a comma-separated line, honoring single and double quotes.
fn split_quoted(line: &str) -> Result<Vec<String>> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in line.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    current.push(c);
                    quote = Some(c);
                }
                ',' => {
                    cells.push(current.trim().to_string());
                    current = String::new();
                }
                _ => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err(Error::InvalidTable(format!("unterminated quote in: {}", line)));
    }
    cells.push(current.trim().to_string());
    Ok(cells)
}

fn unquote(s: &str) -> String {
    unquote_owned(s.to_string())
}

fn unquote_owned(s: String) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2
        && ((trimmed.starts_with('\'') && trimmed.ends_with('\''))
            || (trimmed.starts_with('"') && trimmed.ends_with('"')))
    {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn quote(s: &str) -> String {
    if s.is_empty() || s.contains(|c: char| c.is_whitespace() || ",{}%'".contains(c)) {
        format!("'{}'", s)
    } else {
        s.to_string()
    }
}

pub(crate) fn write(table: &Table) -> String {
    let mut out = String::new();
    out.push_str(&format!("@relation {}\n\n", quote(table.relation())));
    for attribute in table.attributes() {
        match attribute.values() {
            Some(values) => {
                let joined = values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(",");
                out.push_str(&format!(
                    "@attribute {} {{{}}}\n",
                    quote(attribute.name()),
                    joined
                ));
            }
            None => out.push_str(&format!("@attribute {} numeric\n", quote(attribute.name()))),
        }
    }
    out.push_str("\n@data\n");
    for row in table.rows() {
        let line = row
            .iter()
            .enumerate()
            .map(|(c, &value)| {
                if super::is_missing(value) {
                    "?".to_string()
                } else {
                    match table.attribute(c).values() {
                        Some(values) => quote(&values[value as usize]),
                        None => format!("{}", value),
                    }
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}
