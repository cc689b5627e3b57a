//! Column aggregates across the repeats of one result file.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::AnalysisError;
use crate::literal::{format_float, Key, Literal};

/// Aggregate of a scalar or dict valued column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Scalar(f64),
    Dict(Vec<(Key, f64)>),
}

impl Aggregate {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Aggregate::Scalar(x) => Some(*x),
            Aggregate::Dict(_) => None,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Scalar(x) => f.write_str(&format_float(*x)),
            Aggregate::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, format_float(*v))?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Mean of a column. Dict columns are averaged key by key.
pub fn average(heading: &str, values: &[Literal]) -> Result<Aggregate, AnalysisError> {
    match values.first() {
        None => Err(AnalysisError::NoValues(heading.to_string())),
        Some(Literal::Dict(_)) => dict_mean(heading, values).map(Aggregate::Dict),
        Some(_) => {
            let xs = scalars(heading, values)?;
            Ok(Aggregate::Scalar(with_inf_rule(heading, &xs, mean)?))
        }
    }
}

/// Sample variance of a scalar column
pub fn variance(heading: &str, values: &[Literal]) -> Result<Aggregate, AnalysisError> {
    match values.first() {
        None => Err(AnalysisError::NoValues(heading.to_string())),
        Some(Literal::Dict(_)) => Err(AnalysisError::DictVariance(heading.to_string())),
        Some(_) => {
            let xs = scalars(heading, values)?;
            Ok(Aggregate::Scalar(with_inf_rule(heading, &xs, sample_variance)?))
        }
    }
}

pub fn median(heading: &str, values: &[Literal]) -> Result<f64, AnalysisError> {
    if values.iter().any(Literal::is_dict) {
        return Err(AnalysisError::DictMedian(heading.to_string()));
    }

    let mut xs: Vec<f64> = scalars(heading, values)?
        .into_iter()
        .filter(|x| !x.is_nan())
        .collect();
    if xs.is_empty() {
        return Err(AnalysisError::NoValues(heading.to_string()));
    }
    xs.sort_by(f64::total_cmp);

    let mid = xs.len() / 2;
    if xs.len() % 2 == 0 {
        Ok((xs[mid - 1] + xs[mid]) / 2.0)
    } else {
        Ok(xs[mid])
    }
}

fn scalars(heading: &str, values: &[Literal]) -> Result<Vec<f64>, AnalysisError> {
    values
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| AnalysisError::NotNumeric(heading.to_string())))
        .collect()
}

/// Missing (nan) entries are ignored. `+inf` entries are excluded unless
/// every entry is `+inf`, in which case the aggregate is `+inf`.
fn with_inf_rule(
    heading: &str,
    xs: &[f64],
    aggregate: fn(&[f64]) -> f64,
) -> Result<f64, AnalysisError> {
    let present: Vec<f64> = xs.iter().copied().filter(|x| !x.is_nan()).collect();
    if present.is_empty() {
        return Err(AnalysisError::NoValues(heading.to_string()));
    }

    let finite: Vec<f64> = present.iter().copied().filter(|&x| x != f64::INFINITY).collect();
    if finite.is_empty() {
        Ok(f64::INFINITY)
    } else {
        Ok(aggregate(&finite))
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Running key-wise mean. Keys missing from a later dict keep their value;
/// keys first seen later start from zero.
fn dict_mean(heading: &str, values: &[Literal]) -> Result<Vec<(Key, f64)>, AnalysisError> {
    let mut result: Vec<(Key, f64)> = Vec::new();

    for (i, value) in values.iter().enumerate() {
        let entries = value
            .as_dict()
            .ok_or_else(|| AnalysisError::NotNumeric(heading.to_string()))?;
        let n = (i + 1) as f64;

        for (key, v) in entries {
            let v = v.as_f64().ok_or_else(|| AnalysisError::NotNumeric(heading.to_string()))?;
            match result.iter_mut().find(|(k, _)| k == key) {
                Some((_, current)) => *current += (v - *current) / n,
                None if i == 0 => result.push((key.clone(), v)),
                None => result.push((key.clone(), v / n)),
            }
        }
    }

    result.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(xs: &[f64]) -> Vec<Literal> {
        xs.iter().map(|&x| Literal::Float(x)).collect()
    }

    #[test]
    fn test_average_excludes_inf() {
        let values = floats(&[2.0, f64::INFINITY, 4.0]);
        assert_eq!(average("NormalLatency", &values).unwrap(), Aggregate::Scalar(3.0));
        assert_eq!(variance("NormalLatency", &values).unwrap(), Aggregate::Scalar(2.0));
    }

    #[test]
    fn test_all_inf_is_inf() {
        let values = floats(&[f64::INFINITY, f64::INFINITY]);
        assert_eq!(average("NormalLatency", &values).unwrap(), Aggregate::Scalar(f64::INFINITY));
        assert_eq!(variance("NormalLatency", &values).unwrap(), Aggregate::Scalar(f64::INFINITY));
    }

    #[test]
    fn test_bools_and_ints() {
        let values = vec![Literal::Bool(true), Literal::Bool(false), Literal::Bool(true), Literal::Bool(true)];
        assert_eq!(average("Captured", &values).unwrap(), Aggregate::Scalar(0.75));

        let values = vec![Literal::Int(3), Literal::Int(1), Literal::Int(2)];
        assert_eq!(median("Sent", &values).unwrap(), 2.0);
    }

    #[test]
    fn test_dict_mean() {
        let values = vec![
            Literal::int_dict([(1u32, 2u64), (2, 4)]),
            Literal::int_dict([(1u32, 4u64), (2, 2)]),
            Literal::int_dict([(1u32, 6u64), (3, 3)]),
        ];
        let mean = average("SentHeatMap", &values).unwrap();
        assert_eq!(
            mean,
            Aggregate::Dict(vec![(Key::Int(1), 4.0), (Key::Int(2), 3.0), (Key::Int(3), 1.0)])
        );
        assert_eq!(mean.to_string(), "{1: 4.0, 2: 3.0, 3: 1.0}");
    }

    #[test]
    fn test_dict_variance_and_median_unsupported() {
        let values = vec![Literal::int_dict([(1u32, 2u64)])];
        assert!(matches!(variance("SentHeatMap", &values), Err(AnalysisError::DictVariance(_))));
        assert!(matches!(median("SentHeatMap", &values), Err(AnalysisError::DictMedian(_))));
    }

    #[test]
    fn test_non_numeric() {
        let values = vec![Literal::None, Literal::None];
        assert!(matches!(average("Collisions", &values), Err(AnalysisError::NotNumeric(_))));
        assert!(matches!(average("Sent", &[]), Err(AnalysisError::NoValues(_))));
    }
}
