//! Latent semantic analysis: TF-IDF + truncated SVD over session text,
//! used to project queries into the same embedding space as stored
//! session vectors for the semantic half of hybrid search.

use nalgebra::DMatrix;
use std::collections::HashMap;

use crate::tokenize::tokenize;

pub const DEFAULT_DIMENSION: usize = 128;

/// A trained model: vocabulary + IDF weights + the term-space basis
/// needed to project new queries, plus the resulting document (session)
/// embeddings.
pub struct LsaModel {
    vocab: Vec<String>,
    term_index: HashMap<String, usize>,
    idf: Vec<f64>,
    /// terms x k
    u_k: DMatrix<f64>,
    /// k singular values
    sigma_k: Vec<f64>,
    /// session_id -> embedding (length k)
    pub session_embeddings: Vec<(String, Vec<f64>)>,
    pub dimension: usize,
}

/// Train an LSA model over `docs`: session id paired with its full turn
/// text (all turns concatenated in turn_index order). Returns `None` when
/// fewer than 2 sessions are given — LSA requires at least 2 documents
/// to produce a meaningful basis.
pub fn train(docs: &[(String, String)], requested_dim: usize) -> Option<LsaModel> {
    if docs.len() < 2 {
        return None;
    }

    let tokenized: Vec<Vec<String>> = docs.iter().map(|(_, text)| tokenize(text)).collect();

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized {
        let mut seen = std::collections::HashSet::new();
        for t in tokens {
            if seen.insert(t.as_str()) {
                *doc_freq.entry(t.as_str()).or_insert(0) += 1;
            }
        }
    }

    let mut vocab: Vec<String> = doc_freq
        .iter()
        .filter(|(_, &df)| df >= 2)
        .map(|(t, _)| t.to_string())
        .collect();
    vocab.sort();

    if vocab.is_empty() {
        return None;
    }

    let term_index: HashMap<String, usize> =
        vocab.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();

    let n_docs = docs.len();
    let n_terms = vocab.len();
    let n = n_docs as f64;

    let idf: Vec<f64> = vocab
        .iter()
        .map(|t| {
            let df = doc_freq[t.as_str()] as f64;
            (n / df).ln() + 1.0
        })
        .collect();

    // terms x docs, column-major: column j is document j's TF-IDF vector.
    let mut a = DMatrix::<f64>::zeros(n_terms, n_docs);
    for (doc_idx, tokens) in tokenized.iter().enumerate() {
        let mut raw_tf: HashMap<usize, u32> = HashMap::new();
        for t in tokens {
            if let Some(&idx) = term_index.get(t) {
                *raw_tf.entry(idx).or_insert(0) += 1;
            }
        }
        let max_tf = raw_tf.values().copied().max().unwrap_or(0) as f64;
        if max_tf == 0.0 {
            continue;
        }
        for (&term_idx, &count) in &raw_tf {
            let tf_aug = 0.5 + 0.5 * (count as f64) / max_tf;
            a[(term_idx, doc_idx)] = tf_aug * idf[term_idx];
        }
    }

    let k = requested_dim.min(n_terms).min(n_docs);
    if k == 0 {
        return None;
    }

    let svd = a.clone().svd(true, true);
    let u = svd.u?;
    let singular_values = svd.singular_values;
    let v_t = svd.v_t?;

    let u_k = u.columns(0, k).into_owned();
    let sigma_k: Vec<f64> = singular_values.iter().take(k).copied().collect();
    // v_t is k_full x docs; rows 0..k give document coordinates.
    let v_k_t = v_t.rows(0, k).into_owned();

    let mut session_embeddings = Vec::with_capacity(n_docs);
    for (doc_idx, (session_id, _)) in docs.iter().enumerate() {
        let embedding: Vec<f64> = (0..k).map(|j| v_k_t[(j, doc_idx)] * sigma_k[j]).collect();
        session_embeddings.push((session_id.clone(), embedding));
    }

    Some(LsaModel {
        vocab,
        term_index,
        idf,
        u_k,
        sigma_k,
        session_embeddings,
        dimension: k,
    })
}

impl LsaModel {
    /// Rebuild a model from its persisted basis (vocabulary, IDF weights,
    /// term-space projection, singular values) plus the session
    /// embeddings read back from storage. Used when a query runs in a
    /// process separate from the rebuild that trained the model.
    pub fn from_parts(
        vocab: Vec<String>,
        idf: Vec<f64>,
        u_k: DMatrix<f64>,
        sigma_k: Vec<f64>,
        session_embeddings: Vec<(String, Vec<f64>)>,
    ) -> Self {
        let dimension = sigma_k.len();
        let term_index = vocab.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        Self {
            vocab,
            term_index,
            idf,
            u_k,
            sigma_k,
            session_embeddings,
            dimension,
        }
    }

    pub fn vocab(&self) -> &[String] {
        &self.vocab
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn u_k(&self) -> &DMatrix<f64> {
        &self.u_k
    }

    pub fn sigma_k(&self) -> &[f64] {
        &self.sigma_k
    }

    /// Project a query string into the trained embedding space.
    pub fn project_query(&self, query: &str) -> Vec<f64> {
        let tokens = tokenize(query);
        let mut raw_tf: HashMap<usize, u32> = HashMap::new();
        for t in &tokens {
            if let Some(&idx) = self.term_index.get(t) {
                *raw_tf.entry(idx).or_insert(0) += 1;
            }
        }
        let max_tf = raw_tf.values().copied().max().unwrap_or(0) as f64;

        let mut q = vec![0.0f64; self.vocab.len()];
        if max_tf > 0.0 {
            for (&term_idx, &count) in &raw_tf {
                let tf_aug = 0.5 + 0.5 * (count as f64) / max_tf;
                q[term_idx] = tf_aug * self.idf[term_idx];
            }
        }

        (0..self.dimension)
            .map(|j| {
                let sigma = self.sigma_k[j];
                if sigma == 0.0 {
                    return 0.0;
                }
                let mut dot = 0.0;
                for (term_idx, &qv) in q.iter().enumerate() {
                    if qv != 0.0 {
                        dot += qv * self.u_k[(term_idx, j)];
                    }
                }
                dot / sigma
            })
            .collect()
    }
}

/// Cosine similarity. Zero vectors and mismatched dimensions both yield 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_sessions_yields_no_model() {
        let docs = vec![("s1".to_string(), "fix the auth bug".to_string())];
        assert!(train(&docs, DEFAULT_DIMENSION).is_none());
    }

    #[test]
    fn trains_embeddings_for_each_session() {
        let docs = vec![
            ("s1".to_string(), "fix the jwt auth bug in the middleware".to_string()),
            ("s2".to_string(), "optimize the database connection pooling".to_string()),
            ("s3".to_string(), "fix another jwt auth bug in login".to_string()),
        ];
        let model = train(&docs, DEFAULT_DIMENSION).unwrap();
        assert_eq!(model.session_embeddings.len(), 3);
        assert!(model.dimension >= 1);
    }

    #[test]
    fn query_about_jwt_projects_closer_to_jwt_sessions() {
        let docs = vec![
            ("s1".to_string(), "fix the jwt auth bug in the middleware".to_string()),
            ("s2".to_string(), "optimize the database connection pooling".to_string()),
            ("s3".to_string(), "fix another jwt auth bug in login".to_string()),
        ];
        let model = train(&docs, DEFAULT_DIMENSION).unwrap();
        let q = model.project_query("jwt auth bug");

        let sim_s1 = cosine_similarity(&q, &model.session_embeddings[0].1);
        let sim_s2 = cosine_similarity(&q, &model.session_embeddings[1].1);
        assert!(sim_s1 > sim_s2);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_mismatched_dims_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }
}
