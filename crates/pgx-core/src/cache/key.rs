//! Cache key derivation.
//!
//! A response key is the SHA-256 of the full request URL followed by the query
//! parameters serialized in sorted order, so parameter order at the call site
//! never produces two entries for the same request.

use sha2::{Digest, Sha256};

/// Deterministic digest of a request URL and its query parameters.
pub fn cache_key(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    if !sorted.is_empty() {
        // serde_json escaping keeps "a=b&c" and ("a", "b&c") apart
        let encoded = serde_json::to_string(&sorted).unwrap_or_default();
        hasher.update(encoded.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Make a key safe to use as a file name.
pub fn file_safe(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let a = cache_key(
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi",
            &params(&[("db", "clinvar"), ("term", "rs1065852"), ("retmode", "json")]),
        );
        let b = cache_key(
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi",
            &params(&[("retmode", "json"), ("db", "clinvar"), ("term", "rs1065852")]),
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_different_requests_differ() {
        let url = "https://api.pharmgkb.org/v1/data/variant";
        let a = cache_key(url, &params(&[("name", "rs1065852")]));
        let b = cache_key(url, &params(&[("name", "rs3892097")]));
        let c = cache_key(url, &[]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("rs1065852"), "rs1065852");
        assert_eq!(file_safe("chr22:42126611/A"), "chr22_42126611_A");
    }
}
