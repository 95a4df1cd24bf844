// src/index/scoring.rs
//! Hybrid scoring primitives shared by every `SearchIndex` implementation:
//! cosine similarity for the dense component and a small BM25-family lexical
//! scorer for the keyword component, combined by `alpha` the way
//! `composite_scorer::CompositeScorer` combines recency/similarity/salience.

/// Cosine similarity between two equal-length vectors, `0.0` if either is
/// zero-norm or the lengths differ (same degenerate-case handling as
/// `CompositeScorer::cosine_similarity`).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// BM25 parameters; the usual defaults from the Okapi BM25 literature.
const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// A minimal BM25 scorer over a fixed in-memory corpus, used by the lexical
/// half of hybrid ranking. Production deployments delegate the lexical
/// component to the vector store's native keyword index (see
/// `QdrantIndex`); this scorer backs `InMemoryIndex` for tests so hybrid
/// ranking behavior can be exercised without a live index.
pub struct Bm25Corpus {
    doc_freq: std::collections::HashMap<String, usize>,
    doc_count: usize,
    avg_doc_len: f32,
}

impl Bm25Corpus {
    pub fn build<'a, I: IntoIterator<Item = &'a str>>(documents: I) -> Self {
        let mut doc_freq = std::collections::HashMap::new();
        let mut total_len = 0usize;
        let mut doc_count = 0usize;

        for doc in documents {
            doc_count += 1;
            let terms = tokenize(doc);
            total_len += terms.len();

            let unique: std::collections::HashSet<_> = terms.into_iter().collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let avg_doc_len = if doc_count > 0 {
            total_len as f32 / doc_count as f32
        } else {
            0.0
        };

        Self {
            doc_freq,
            doc_count,
            avg_doc_len,
        }
    }

    /// Raw (unnormalized) BM25 score of `document` against `query`.
    pub fn score(&self, query: &str, document: &str) -> f32 {
        if self.doc_count == 0 {
            return 0.0;
        }

        let query_terms = tokenize(query);
        let doc_terms = tokenize(document);
        let doc_len = doc_terms.len() as f32;

        let mut term_freq = std::collections::HashMap::new();
        for term in &doc_terms {
            *term_freq.entry(term.clone()).or_insert(0usize) += 1;
        }

        let mut score = 0.0f32;
        for term in &query_terms {
            let Some(&tf) = term_freq.get(term) else {
                continue;
            };
            let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
            let idf = ((self.doc_count as f32 - df + 0.5) / (df + 0.5) + 1.0).ln();
            let tf = tf as f32;
            let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / self.avg_doc_len.max(1.0));
            score += idf * (tf * (BM25_K1 + 1.0)) / denom.max(f32::EPSILON);
        }

        score.max(0.0)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convex combination of a normalized lexical score and a cosine score,
/// weighted by `alpha` (weight on the dense component).
pub fn combine(alpha: f32, lexical: f32, dense: f32) -> f32 {
    alpha.clamp(0.0, 1.0) * dense + (1.0 - alpha.clamp(0.0, 1.0)) * lexical
}

/// Squashes an unbounded BM25 score into `[0,1]` so it can be combined with
/// cosine similarity (already in `[-1,1]`, clamped to `[0,1]` by callers).
pub fn normalize_lexical(raw: f32) -> f32 {
    if raw <= 0.0 {
        0.0
    } else {
        raw / (raw + 1.0)
    }
}
