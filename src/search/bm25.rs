//! BM25 keyword index over catalog entries.

use super::tokenizer::Normalizer;
use crate::models::{CatalogEntry, ObjectKind};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::HashMap;

/// Term frequency saturation.
pub const K1: f64 = 1.5;
/// Document length normalization.
pub const B: f64 = 0.75;

#[derive(Debug, Clone)]
struct Document {
    entry: CatalogEntry,
    term_freqs: HashMap<String, u32>,
    length: u32,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct SearchHit {
    pub entry: CatalogEntry,
    pub score: f64,
}

/// Immutable index. Rebuilding produces a new value.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    normalizer: Normalizer,
    documents: Vec<Document>,
    doc_freqs: HashMap<String, u32>,
    avg_length: f64,
}

impl SearchIndex {
    /// Index entries by object name and comment.
    pub fn build(entries: Vec<CatalogEntry>, normalizer: Normalizer) -> Self {
        let mut documents = Vec::with_capacity(entries.len());
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        let mut total_length: u64 = 0;

        for entry in entries {
            let mut terms = normalizer.terms(&entry.object_name);
            if let Some(comment) = &entry.comment {
                terms.extend(normalizer.terms(comment));
            }

            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for term in &terms {
                *term_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }

            let length = terms.len() as u32;
            total_length += u64::from(length);
            documents.push(Document {
                entry,
                term_freqs,
                length,
            });
        }

        let avg_length = if documents.is_empty() {
            0.0
        } else {
            total_length as f64 / documents.len() as f64
        };

        Self {
            normalizer,
            documents,
            doc_freqs,
            avg_length,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = f64::from(self.doc_freqs.get(term).copied().unwrap_or(0));
        let total = self.documents.len() as f64;
        (1.0 + (total - n + 0.5) / (n + 0.5)).ln()
    }

    fn score(&self, doc: &Document, query_terms: &[(String, f64)]) -> f64 {
        let length_ratio = if self.avg_length > 0.0 {
            f64::from(doc.length) / self.avg_length
        } else {
            0.0
        };
        query_terms
            .iter()
            .filter_map(|(term, idf)| {
                let tf = f64::from(*doc.term_freqs.get(term)?);
                Some(idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * length_ratio)))
            })
            .sum()
    }

    /// Rank entries against `query`. Entries that match no query term are
    /// left out. Ties order by qualified name, then kind.
    pub fn search(&self, query: &str, kind: Option<ObjectKind>, top_k: usize) -> Vec<SearchHit> {
        let mut terms = self.normalizer.terms(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query_terms: Vec<(String, f64)> = terms
            .into_iter()
            .map(|t| {
                let idf = self.idf(&t);
                (t, idf)
            })
            .collect();

        let mut scored: Vec<(&Document, f64)> = self
            .documents
            .iter()
            .filter(|doc| kind.is_none_or(|k| doc.entry.kind == k))
            .map(|doc| (doc, self.score(doc, &query_terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| a.entry.qualified_name().cmp(&b.entry.qualified_name()))
                .then_with(|| a.entry.kind.cmp(&b.entry.kind))
        });

        scored
            .into_iter()
            .take(top_k)
            .map(|(doc, score)| SearchHit {
                entry: doc.entry.clone(),
                score,
            })
            .collect()
    }
}
