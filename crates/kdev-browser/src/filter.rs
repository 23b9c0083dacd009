//! Abbreviation-style list filtering
//!
//! Options such as `kube-proxy` are split into words on hyphens and
//! whitespace. A query word matches an option when it is a substring of one
//! of the option's words, or a prefix of the option's initials, so `prox`,
//! `kube p` and `kp` all find `kube-proxy`. Matching ignores case.

fn is_separator(c: char) -> bool {
    c == '-' || c.is_whitespace()
}

/// Whether every whitespace-separated word of `query` matches `option`
///
/// A blank query matches every option; callers skip filtering for it.
pub fn matches(option: &str, query: &str) -> bool {
    let option = option.to_lowercase();
    let words: Vec<&str> = option.split(is_separator).filter(|w| !w.is_empty()).collect();
    let initials: String = words.iter().filter_map(|w| w.chars().next()).collect();

    query
        .to_lowercase()
        .split_whitespace()
        .all(|q| initials.starts_with(q) || words.iter().any(|w| w.contains(q)))
}

/// Index of the first option matching `query`, or `None` for a blank query
pub fn first_match<S: AsRef<str>>(options: &[S], query: &str) -> Option<usize> {
    if query.trim().is_empty() {
        return None;
    }

    options.iter().position(|opt| matches(opt.as_ref(), query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials() {
        assert!(matches("kube-proxy", "kp"));
        assert!(matches("kube-proxy", "k"));
        assert!(matches("cert-manager-webhook", "cmw"));
        assert!(!matches("kube-proxy", "pk"));
    }

    #[test]
    fn test_substrings() {
        assert!(matches("kube-proxy", "prox"));
        assert!(matches("kube-proxy", "kube prox"));
        assert!(matches("Kube-Proxy", "PROXY"));
        assert!(!matches("kube-proxy", "zz"));
        assert!(!matches("kube-proxy", "kube zz"));
    }

    #[test]
    fn test_query_words_do_not_span_separators() {
        assert!(!matches("kube-proxy", "e-p"));
    }

    #[test]
    fn test_first_match() {
        let pods = ["coredns-5d78c", "kube-apiserver", "kube-proxy-x7k2p"];

        assert_eq!(first_match(&pods, "kp"), Some(2));
        assert_eq!(first_match(&pods, "kube"), Some(1));
        assert_eq!(first_match(&pods, "dns"), Some(0));
        assert_eq!(first_match(&pods, "etcd"), None);
    }

    #[test]
    fn test_blank_query_selects_nothing() {
        let pods = ["a", "b"];
        assert_eq!(first_match(&pods, ""), None);
        assert_eq!(first_match(&pods, "   "), None);
    }
}
