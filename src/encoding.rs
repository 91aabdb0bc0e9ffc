// encoding.rs
//
// Diploid genotype calls to a single numeric feature: the rounded sum of the two
// alleles' base weights.

use crate::error::{ImpRefError, Result};
use crate::markers::MarkerKey;

/// Numeric weight per allele letter.
#[derive(Debug, Clone, PartialEq)]
pub struct AlleleWeights {
    table: Vec<(char, f64)>,
    missing_letter: char,
}

impl Default for AlleleWeights {
    fn default() -> Self {
        Self {
            table: vec![('A', 0.0), ('T', 0.1), ('C', 0.3), ('G', 0.7), ('N', 0.9)],
            missing_letter: 'N',
        }
    }
}

impl AlleleWeights {
    /// `missing_letter` must be one of the table's letters.
    pub fn new(table: Vec<(char, f64)>, missing_letter: char) -> Result<Self> {
        if !table.iter().any(|(letter, _)| *letter == missing_letter) {
            return Err(ImpRefError::InvalidConfig(format!(
                "missing-call letter '{}' has no weight in the allele table",
                missing_letter
            )));
        }
        Ok(Self {
            table,
            missing_letter,
        })
    }

    pub fn weight(&self, letter: char) -> Option<f64> {
        self.table
            .iter()
            .find(|(l, _)| *l == letter.to_ascii_uppercase())
            .map(|(_, w)| *w)
    }

    fn missing_weight(&self) -> f64 {
        self.weight(self.missing_letter).unwrap_or_default()
    }

    /// Encoded value of a fully missing call.
    pub fn missing_value(&self) -> f64 {
        round_tenth(2.0 * self.missing_weight())
    }
}

#[inline]
fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Applies [`AlleleWeights`] to raw genotype fields.
#[derive(Debug, Clone, Default)]
pub struct GenotypeEncoder {
    weights: AlleleWeights,
}

impl GenotypeEncoder {
    pub fn new(weights: AlleleWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &AlleleWeights {
        &self.weights
    }

    /// Encodes every sample's call for one marker, in sample order.
    pub fn encode_marker<S: AsRef<str>>(&self, key: &MarkerKey, tokens: &[S]) -> Result<Vec<f64>> {
        let alleles = marker_alleles(key);
        tokens
            .iter()
            .enumerate()
            .map(|(sample, token)| self.encode_call(token.as_ref(), &alleles, key, sample))
            .collect()
    }

    /// Encodes one reference matrix row. Numeric tokens are taken as already
    /// encoded; anything else goes through [`GenotypeEncoder::encode_call`].
    pub fn encode_reference_row<S: AsRef<str>>(
        &self,
        key: &MarkerKey,
        tokens: &[S],
    ) -> Result<Vec<f64>> {
        let alleles = marker_alleles(key);
        tokens
            .iter()
            .enumerate()
            .map(|(sample, token)| {
                let token = token.as_ref();
                match token.parse::<f64>() {
                    Ok(value) if value.is_finite() => Ok(value),
                    Ok(_) => Err(ImpRefError::Encoding {
                        key: key.clone(),
                        sample,
                        token: token.to_string(),
                        reason: "non-finite value".to_string(),
                    }),
                    Err(_) => self.encode_call(token, &alleles, key, sample),
                }
            })
            .collect()
    }

    /// Encodes a single call such as `0/1`, `1|0`, `./.` or `0/1:35:...`.
    ///
    /// Allele order and phase do not affect the result. A call with every
    /// allele missing is the missing sentinel; a single missing allele takes
    /// the missing letter's weight.
    pub fn encode_call(
        &self,
        token: &str,
        alleles: &[&str],
        key: &MarkerKey,
        sample: usize,
    ) -> Result<f64> {
        let fail = |reason: String| ImpRefError::Encoding {
            key: key.clone(),
            sample,
            token: token.to_string(),
            reason,
        };

        let call = token.split(':').next().unwrap_or_default();
        let parts: Vec<&str> = call.split(['/', '|']).collect();
        if parts.iter().all(|p| *p == ".") {
            return Ok(self.weights.missing_value());
        }
        if parts.len() > 2 {
            return Err(fail(format!("expected a diploid call, found {} alleles", parts.len())));
        }

        let mut total = 0.0;
        for part in &parts {
            let weight = if *part == "." {
                self.weights.missing_weight()
            } else {
                let idx = part
                    .parse::<usize>()
                    .map_err(|_| fail(format!("allele index '{}' is not an integer", part)))?;
                let allele = alleles.get(idx).ok_or_else(|| {
                    fail(format!(
                        "allele index {} is out of range for {} allele(s)",
                        idx,
                        alleles.len()
                    ))
                })?;
                allele_weight(&self.weights, allele)
                    .ok_or_else(|| fail(format!("unrecognized allele '{}'", allele)))?
            };
            total += weight;
        }
        if parts.len() == 1 {
            total *= 2.0;
        }
        Ok(round_tenth(total))
    }
}

/// REF followed by each comma-separated ALT allele; index = VCF allele index.
fn marker_alleles(key: &MarkerKey) -> Vec<&str> {
    std::iter::once(key.reference.as_str())
        .chain(key.alternate.split(','))
        .collect()
}

fn allele_weight(weights: &AlleleWeights, allele: &str) -> Option<f64> {
    let mut chars = allele.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => weights.weight(letter),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(token: &str, reference: &str, alternate: &str) -> Result<f64> {
        let key = MarkerKey::new("1", 100, reference, alternate);
        let encoder = GenotypeEncoder::default();
        Ok(encoder.encode_marker(&key, &[token])?[0])
    }

    #[test]
    fn hom_ref_at_c_g_is_point_six() {
        assert_eq!(encode("0/0", "C", "G").unwrap(), 0.6);
    }

    #[test]
    fn missing_call_is_constant() {
        assert_eq!(encode("./.", "C", "G").unwrap(), 1.8);
        assert_eq!(encode("./.", "A", "T").unwrap(), 1.8);
        assert_eq!(encode(".|.", "G", "A").unwrap(), 1.8);
        assert_eq!(encode("./.:0:.", "G", "A").unwrap(), 1.8);
    }

    #[test]
    fn phase_and_order_do_not_matter() {
        let expected = encode("0/1", "A", "T").unwrap();
        assert_eq!(expected, 0.1);
        assert_eq!(encode("1/0", "A", "T").unwrap(), expected);
        assert_eq!(encode("0|1", "A", "T").unwrap(), expected);
        assert_eq!(encode("1|0", "A", "T").unwrap(), expected);
    }

    #[test]
    fn sums_are_rounded_to_one_decimal() {
        // 0.1 + 0.7 is 0.7999... in binary floating point.
        assert_eq!(encode("0/1", "T", "G").unwrap(), 0.8);
        assert_eq!(encode("1/1", "C", "G").unwrap(), 1.4);
    }

    #[test]
    fn format_subfields_are_ignored() {
        assert_eq!(encode("1/1:12,30:42", "A", "G").unwrap(), 1.4);
    }

    #[test]
    fn multi_allelic_alt_resolves_by_index() {
        assert_eq!(encode("1/2", "A", "C,G").unwrap(), 1.0);
    }

    #[test]
    fn half_missing_uses_missing_weight_for_one_allele() {
        assert_eq!(encode("./1", "A", "G").unwrap(), 1.6);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let err = encode("0/2", "A", "T").unwrap_err();
        match err {
            ImpRefError::Encoding { sample, token, .. } => {
                assert_eq!(sample, 0);
                assert_eq!(token, "0/2");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn unknown_letter_and_malformed_tokens_are_errors() {
        assert!(encode("0/1", "A", "AT").is_err());
        assert!(encode("0/1", "A", "X").is_err());
        assert!(encode("a/b", "A", "T").is_err());
        assert!(encode("0/1/1", "A", "T").is_err());
    }

    #[test]
    fn reference_rows_accept_pre_encoded_values() {
        let key = MarkerKey::new("1", 100, "C", "G");
        let encoder = GenotypeEncoder::default();
        let row = encoder.encode_reference_row(&key, &["0.6", "1.4", "0/1", "./."]).unwrap();
        assert_eq!(row, vec![0.6, 1.4, 1.0, 1.8]);
        assert!(encoder.encode_reference_row(&key, &["NaN"]).is_err());
    }

    #[test]
    fn custom_table_requires_missing_letter() {
        assert!(AlleleWeights::new(vec![('A', 0.0)], 'N').is_err());
        let weights = AlleleWeights::new(vec![('A', 0.0), ('N', 0.5)], 'N').unwrap();
        assert_eq!(weights.missing_value(), 1.0);
    }
}
