//! Precedent retrieval: TF-IDF + cosine similarity over the runbook corpus.
//!
//! Local retrieval with zero outbound calls. Each precedent becomes one
//! searchable document (logs + alert type + root cause + action +
//! justification + severity + workload); the corpus and the query are
//! vectorized jointly so they share one term space, then ranked by cosine
//! similarity against the query.
//!
//! Any failure here degrades to an empty result - diagnosis then proceeds as
//! a cold start, it never aborts the run.

use std::collections::HashMap;

use tracing::info;
use warden_common::{Precedent, PrecedentMatch};

/// Vocabulary cap: only the most frequent terms participate in scoring.
const MAX_FEATURES: usize = 5000;

/// Stored log excerpt length per match.
const SNIPPET_CHARS: usize = 300;

/// Common English words excluded from the term space.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "had", "has",
    "have", "he", "her", "his", "if", "in", "into", "is", "it", "its", "no", "not", "of", "on",
    "or", "our", "she", "so", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "to", "was", "we", "were", "when", "which", "will", "with", "you", "your",
];

#[derive(Debug, Clone)]
pub struct Retriever {
    pub top_k: usize,
    pub min_similarity: f64,
}

impl Default for Retriever {
    fn default() -> Self {
        Self {
            top_k: 2,
            min_similarity: 0.05,
        }
    }
}

impl Retriever {
    pub fn new(top_k: usize, min_similarity: f64) -> Self {
        Self {
            top_k,
            min_similarity,
        }
    }

    /// Return the top-K precedents most similar to `query`, descending by
    /// score, each clearing the minimum similarity threshold. An empty
    /// corpus always yields an empty list.
    pub fn retrieve(&self, query: &str, corpus: &[Precedent]) -> Vec<PrecedentMatch> {
        if corpus.is_empty() {
            info!("Retrieval: corpus empty, no prior knowledge to draw on");
            return Vec::new();
        }

        let mut documents: Vec<String> = corpus.iter().map(corpus_document).collect();
        documents.push(query.to_lowercase());

        let similarities = match tfidf_cosine_to_last(&documents) {
            Some(s) => s,
            None => return Vec::new(),
        };

        // Rank corpus indices by similarity, descending.
        let mut ranked: Vec<usize> = (0..corpus.len()).collect();
        ranked.sort_by(|&a, &b| {
            similarities[b]
                .partial_cmp(&similarities[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut matches = Vec::new();
        for idx in ranked.into_iter().take(self.top_k) {
            let score = similarities[idx];
            if score < self.min_similarity {
                continue;
            }
            let entry = &corpus[idx];
            matches.push(PrecedentMatch {
                incident_id: entry.incident_id.clone(),
                alert_type: entry.alert_type.clone(),
                root_cause: entry.root_cause.clone(),
                action: entry.action.clone(),
                justification: entry.justification.clone(),
                log_snippet: truncate_chars(&entry.logs, SNIPPET_CHARS),
                similarity: round4(score),
                workload: entry.workload.clone(),
                severity: entry.severity.clone(),
                replicas_used: entry.replicas_used,
            });
        }

        if let Some(best) = matches.first() {
            info!(
                "Retrieval: {} similar incidents (best={:.3})",
                matches.len(),
                best.similarity
            );
        } else {
            info!(
                "Retrieval: no entries above similarity threshold {:.2}",
                self.min_similarity
            );
        }

        matches
    }
}

/// One searchable document per precedent, lowercased so token matching is
/// case-insensitive.
fn corpus_document(entry: &Precedent) -> String {
    [
        entry.logs.as_str(),
        entry.alert_type.as_str(),
        entry.root_cause.as_str(),
        entry.action.as_str(),
        entry.justification.as_str(),
        entry.severity.as_str(),
        entry.workload.as_str(),
    ]
    .iter()
    .filter(|p| !p.is_empty())
    .map(|p| *p)
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Alphanumeric tokens of at least two characters, stopwords removed.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .filter(|t| !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Unigrams plus adjacent bigrams over the token stream.
fn terms(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len() * 2);
    out.extend(tokens.iter().cloned());
    for pair in tokens.windows(2) {
        out.push(format!("{} {}", pair[0], pair[1]));
    }
    out
}

/// Vectorize all documents with sublinear TF-IDF and return the cosine
/// similarity of every document against the LAST one (the query). Returns
/// None when nothing tokenizable exists.
fn tfidf_cosine_to_last(documents: &[String]) -> Option<Vec<f64>> {
    let n_docs = documents.len();
    let doc_terms: Vec<Vec<String>> = documents
        .iter()
        .map(|d| terms(&tokenize(d)))
        .collect();

    // Term -> (total occurrences, document frequency).
    let mut total_counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for terms in &doc_terms {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for t in terms {
            *seen.entry(t.as_str()).or_insert(0) += 1;
        }
        for (t, c) in seen {
            let slot = total_counts.entry(t).or_insert((0, 0));
            slot.0 += c;
            slot.1 += 1;
        }
    }
    if total_counts.is_empty() {
        return None;
    }

    // Cap the vocabulary at the most frequent terms; ties broken
    // lexicographically so scoring is deterministic.
    let mut vocab: Vec<(&str, usize, usize)> = total_counts
        .iter()
        .map(|(t, (total, df))| (*t, *total, *df))
        .collect();
    vocab.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    vocab.truncate(MAX_FEATURES);

    let term_index: HashMap<&str, (usize, usize)> = vocab
        .iter()
        .enumerate()
        .map(|(i, (t, _, df))| (*t, (i, *df)))
        .collect();

    // Sparse L2-normalized TF-IDF vector per document.
    let vectors: Vec<HashMap<usize, f64>> = doc_terms
        .iter()
        .map(|terms| {
            let mut counts: HashMap<usize, (f64, usize)> = HashMap::new();
            for t in terms {
                if let Some(&(idx, df)) = term_index.get(t.as_str()) {
                    let slot = counts.entry(idx).or_insert((0.0, df));
                    slot.0 += 1.0;
                }
            }
            let mut vec: HashMap<usize, f64> = counts
                .into_iter()
                .map(|(idx, (count, df))| {
                    let tf = 1.0 + count.ln();
                    let idf = ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0;
                    (idx, tf * idf)
                })
                .collect();
            let norm = vec.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for w in vec.values_mut() {
                    *w /= norm;
                }
            }
            vec
        })
        .collect();

    let query_vec = vectors.last()?;
    let sims = vectors[..n_docs - 1]
        .iter()
        .map(|v| dot(v, query_vec))
        .collect();
    Some(sims)
}

fn dot(a: &HashMap<usize, f64>, b: &HashMap<usize, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(idx, w)| large.get(idx).map(|w2| w * w2))
        .sum()
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Character-safe prefix truncation.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
