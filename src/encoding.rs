//! Encodings of a nominal attribute into regression predictors.
//!
//! The ordinal encoding assigns equidistant integer codes and therefore
//! imposes an ordering the attribute does not have; it exists as the
//! contrast case. The indicator encoding estimates one effect per category
//! relative to a reference.

use ndarray::Array1;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("category '{0}' is not part of the configured category order")]
    UnknownCategory(String),

    #[error("category '{0}' appears more than once in the configured order")]
    DuplicateCategory(String),

    #[error("reference category '{0}' is not a known category")]
    UnknownReference(String),

    #[error("reference category '{0}' is never observed; its effect would be absorbed by the intercept")]
    ReferenceNotObserved(String),

    #[error("cannot encode an attribute with no observations")]
    Empty,

    #[error("categories '{first}' and '{second}' both map to column '{name}'")]
    ColumnCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("indicator for category '{category}' would be named '{name}', which is already taken")]
    ReservedColumn { name: String, category: String },
}

/// Integer codes `1..=k` assigned to categories in a fixed order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrdinalEncoding {
    /// `(category, code)` in code order.
    pub mapping: Vec<(String, usize)>,
    /// One code per observation.
    pub codes: Array1<f64>,
}

impl OrdinalEncoding {
    pub fn code_of(&self, category: &str) -> Option<usize> {
        self.mapping
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, code)| *code)
    }

    pub fn category_of(&self, code: usize) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| name.as_str())
    }
}

fn sorted_distinct(values: &[String]) -> Vec<String> {
    values
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Ordinal (label) encoding. Without an explicit order, categories are coded
/// in sorted label order starting at 1.
pub fn ordinal_encode(
    values: &[String],
    order: Option<&[String]>,
) -> Result<OrdinalEncoding, EncodingError> {
    let categories = match order {
        Some(order) => {
            let mut seen = BTreeSet::new();
            for c in order {
                if !seen.insert(c.as_str()) {
                    return Err(EncodingError::DuplicateCategory(c.clone()));
                }
            }
            if let Some(unknown) = values.iter().find(|v| !seen.contains(v.as_str())) {
                return Err(EncodingError::UnknownCategory(unknown.clone()));
            }
            order.to_vec()
        }
        None => sorted_distinct(values),
    };

    let mapping: Vec<(String, usize)> = categories
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c, i + 1))
        .collect();

    let codes = values
        .iter()
        .map(|v| {
            mapping
                .iter()
                .find(|(c, _)| c == v)
                .map(|(_, code)| *code as f64)
                .ok_or_else(|| EncodingError::UnknownCategory(v.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!("[Encoding] ordinal mapping: {:?}", mapping);

    Ok(OrdinalEncoding {
        mapping,
        codes: Array1::from_vec(codes),
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndicatorColumn {
    pub category: String,
    pub name: String,
    pub values: Array1<f64>,
}

/// Treatment (reference-coded) indicator encoding.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndicatorEncoding {
    pub reference: String,
    pub columns: Vec<IndicatorColumn>,
    /// Known categories that never occur in the data. They get no column and
    /// no coefficient.
    pub omitted: Vec<String>,
}

impl IndicatorEncoding {
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Fails when an indicator would take the name `reserved`.
    pub fn check_reserved(&self, reserved: &str) -> Result<(), EncodingError> {
        match self.columns.iter().find(|c| c.name == reserved) {
            Some(c) => Err(EncodingError::ReservedColumn {
                name: c.name.clone(),
                category: c.category.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Number of indicators set on row `i`.
    pub fn active_count(&self, i: usize) -> usize {
        self.columns.iter().filter(|c| c.values[i] != 0.0).count()
    }
}

pub fn indicator_name(prefix: &str, category: &str) -> String {
    let clean = category.trim().replace(char::is_whitespace, "_");
    if prefix.is_empty() {
        clean
    } else {
        format!("{prefix}_{clean}")
    }
}

/// Encodes `values` into one indicator per non-reference category.
///
/// `known` lists the full category set; when empty the observed categories
/// are used. The default reference is the first observed category in sorted
/// order.
pub fn indicator_encode(
    values: &[String],
    known: &[String],
    reference: Option<&str>,
    prefix: &str,
) -> Result<IndicatorEncoding, EncodingError> {
    if values.is_empty() {
        return Err(EncodingError::Empty);
    }

    let observed = sorted_distinct(values);
    let universe = if known.is_empty() {
        observed.clone()
    } else {
        if let Some(unknown) = observed.iter().find(|o| !known.contains(o)) {
            return Err(EncodingError::UnknownCategory(unknown.clone()));
        }
        sorted_distinct(known)
    };

    let reference = match reference {
        Some(r) => {
            if !universe.iter().any(|c| c == r) {
                return Err(EncodingError::UnknownReference(r.to_string()));
            }
            if !observed.iter().any(|c| c == r) {
                return Err(EncodingError::ReferenceNotObserved(r.to_string()));
            }
            r.to_string()
        }
        None => observed[0].clone(),
    };

    let mut columns = Vec::new();
    let mut omitted = Vec::new();
    let mut taken: BTreeMap<String, &String> = BTreeMap::new();
    for category in universe.iter().filter(|c| **c != reference) {
        if !observed.contains(category) {
            log::warn!(
                "[Encoding] category '{}' is never observed; its indicator is omitted and its effect is undefined",
                category
            );
            omitted.push(category.clone());
            continue;
        }
        let name = indicator_name(prefix, category);
        if let Some(first) = taken.insert(name.clone(), category) {
            return Err(EncodingError::ColumnCollision {
                name,
                first: first.clone(),
                second: category.clone(),
            });
        }
        let values = values
            .iter()
            .map(|v| if v == category { 1.0 } else { 0.0 })
            .collect::<Array1<f64>>();
        columns.push(IndicatorColumn {
            category: category.clone(),
            name,
            values,
        });
    }

    log::debug!(
        "[Encoding] indicator encoding: reference='{}', columns={:?}",
        reference,
        columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
    );

    Ok(IndicatorEncoding {
        reference,
        columns,
        omitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ordinal_codes_are_sorted_permutation_of_one_to_k() {
        let values = labels(&["Europa", "Asia", "Oceania", "Asia", "America_do_sul"]);
        let enc = ordinal_encode(&values, None).expect("encodes");
        assert_eq!(enc.codes.to_vec(), vec![3.0, 2.0, 4.0, 2.0, 1.0]);
        let mut codes: Vec<usize> = enc.mapping.iter().map(|(_, c)| *c).collect();
        codes.sort_unstable();
        assert_eq!(codes, vec![1, 2, 3, 4]);
        assert_eq!(enc.code_of("Asia"), Some(2));
        assert_eq!(enc.category_of(4), Some("Oceania"));
    }

    #[test]
    fn ordinal_encoding_is_deterministic_for_repeated_values() {
        let values = labels(&["b", "a", "b", "c", "b"]);
        let enc = ordinal_encode(&values, None).expect("encodes");
        let b_codes: Vec<f64> = values
            .iter()
            .zip(enc.codes.iter())
            .filter(|(v, _)| v.as_str() == "b")
            .map(|(_, c)| *c)
            .collect();
        assert!(b_codes.iter().all(|c| *c == b_codes[0]));
    }

    #[test]
    fn explicit_order_is_honored_and_validated() {
        let values = labels(&["x", "y", "z"]);
        let order = labels(&["z", "x", "y"]);
        let enc = ordinal_encode(&values, Some(&order)).expect("encodes");
        assert_eq!(enc.codes.to_vec(), vec![2.0, 3.0, 1.0]);

        let short = labels(&["x", "y"]);
        assert_eq!(
            ordinal_encode(&values, Some(&short)),
            Err(EncodingError::UnknownCategory("z".to_string()))
        );
        let dup = labels(&["x", "x", "y", "z"]);
        assert_eq!(
            ordinal_encode(&values, Some(&dup)),
            Err(EncodingError::DuplicateCategory("x".to_string()))
        );
    }

    #[test]
    fn indicators_are_one_hot_minus_reference() {
        let values = labels(&["Asia", "Europa", "America_do_sul", "Oceania", "Asia"]);
        let enc = indicator_encode(&values, &[], None, "regiao").expect("encodes");
        assert_eq!(enc.reference, "America_do_sul");
        assert_eq!(
            enc.names(),
            vec!["regiao_Asia", "regiao_Europa", "regiao_Oceania"]
        );
        for (i, v) in values.iter().enumerate() {
            let active = enc.active_count(i);
            if v == "America_do_sul" {
                assert_eq!(active, 0);
            } else {
                assert_eq!(active, 1);
            }
        }
    }

    #[test]
    fn unobserved_known_category_is_omitted_not_defaulted() {
        let values = labels(&["a", "b", "a"]);
        let known = labels(&["a", "b", "c"]);
        let enc = indicator_encode(&values, &known, None, "g").expect("encodes");
        assert_eq!(enc.names(), vec!["g_b"]);
        assert_eq!(enc.omitted, vec!["c".to_string()]);
    }

    #[test]
    fn reference_must_be_known_and_observed() {
        let values = labels(&["a", "b"]);
        let known = labels(&["a", "b", "c"]);
        assert_eq!(
            indicator_encode(&values, &known, Some("zz"), "g"),
            Err(EncodingError::UnknownReference("zz".to_string()))
        );
        assert_eq!(
            indicator_encode(&values, &known, Some("c"), "g"),
            Err(EncodingError::ReferenceNotObserved("c".to_string()))
        );
        let enc = indicator_encode(&values, &known, Some("b"), "g").expect("encodes");
        assert_eq!(enc.names(), vec!["g_a"]);
        assert_eq!(indicator_encode(&[], &[], None, "g"), Err(EncodingError::Empty));
    }

    #[test]
    fn labels_that_share_a_column_name_are_rejected() {
        let values = labels(&["Asia", "EUA e Canada", "EUA_e_Canada", "Asia"]);
        assert_eq!(
            indicator_encode(&values, &[], None, "regiao"),
            Err(EncodingError::ColumnCollision {
                name: "regiao_EUA_e_Canada".to_string(),
                first: "EUA e Canada".to_string(),
                second: "EUA_e_Canada".to_string(),
            })
        );

        let values = labels(&["Asia", "code", "Europa"]);
        let enc = indicator_encode(&values, &[], None, "regiao").expect("encodes");
        assert_eq!(
            enc.check_reserved("regiao_code"),
            Err(EncodingError::ReservedColumn {
                name: "regiao_code".to_string(),
                category: "code".to_string(),
            })
        );
        assert_eq!(enc.check_reserved("fitted"), Ok(()));
    }

    #[test]
    fn indicator_names_replace_whitespace() {
        assert_eq!(indicator_name("regiao", "EUA e Canada"), "regiao_EUA_e_Canada");
        assert_eq!(indicator_name("", "Asia"), "Asia");
    }
}
