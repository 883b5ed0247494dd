//! TF-IDF vectorizer
//!
//! Lowercased tokens of two or more word characters, raw term counts,
//! smooth idf `ln((1 + n) / (1 + df)) + 1` and L2-normalized rows.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::AgentError;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w\w+\b").unwrap());

pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fitted vocabulary and idf weights
#[derive(Debug, Clone)]
pub struct TfIdf {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl TfIdf {
    /// Learn vocabulary and idf from `corpus`.
    ///
    /// Fails when no document yields a single token.
    pub fn fit<S: AsRef<str>>(corpus: &[S]) -> Result<Self, AgentError> {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();

        for text in corpus {
            let mut seen = vec![false; document_frequency.len()];
            for token in tokenize(text.as_ref()) {
                let next = vocabulary.len();
                let index = *vocabulary.entry(token).or_insert(next);
                if index == document_frequency.len() {
                    document_frequency.push(0);
                    seen.push(false);
                }
                if !seen[index] {
                    seen[index] = true;
                    document_frequency[index] += 1;
                }
            }
        }

        if vocabulary.is_empty() {
            return Err(AgentError::HistoryInconsistent(
                "empty vocabulary; documents contain only stop words or no words".to_string(),
            ));
        }

        let n = corpus.len() as f32;
        let idf = document_frequency
            .iter()
            .map(|df| ((1.0 + n) / (1.0 + *df as f32)).ln() + 1.0)
            .collect();

        Ok(Self { vocabulary, idf })
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Dense L2-normalized tf-idf row; all zeros when no token is known
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut row = vec![0.0f32; self.idf.len()];
        for token in tokenize(text) {
            if let Some(&index) = self.vocabulary.get(&token) {
                row[index] += 1.0;
            }
        }
        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }

        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|v| *v /= norm);
        }
        row
    }
}

/// Cosine similarity; 0 when either vector is all zeros
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
