/**
 * Domain Classifier
 *
 * Maps an operation path to the rights domain owning it. Domains are
 * ordered by template length, longest first (stable, so configuration order
 * breaks ties), and the first compatible template wins. Deeper entities are
 * therefore never swallowed by an inheriting template of their parent.
 */

use crate::shared::config::{CollectionConfig, DomainConfig};
use crate::shared::path_template::{match_template, PathKey, PathTemplate};

#[derive(Debug, Clone)]
pub struct DomainClassifier {
    domains: Vec<DomainConfig>,
    templates: Vec<PathTemplate>,
}

impl DomainClassifier {
    pub fn new(domains: &[DomainConfig]) -> Self {
        let mut domains = domains.to_vec();
        domains.sort_by(|a, b| b.path_template.len().cmp(&a.path_template.len()));
        let templates = domains.iter().map(|d| d.path_template.clone()).collect();
        Self { domains, templates }
    }

    pub fn from_collection(collection: &CollectionConfig) -> Self {
        Self::new(&collection.domains)
    }

    /// Domain owning `path`; `None` means no domain and therefore deny
    pub fn classify(&self, path: &[PathKey]) -> Option<&DomainConfig> {
        match_template(&self.templates, path).map(|index| &self.domains[index])
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    fn template(segments: serde_json::Value, inherit: bool) -> PathTemplate {
        PathTemplate::from_json(segments, inherit).unwrap()
    }

    #[test]
    fn test_longest_template_wins() {
        let classifier = DomainClassifier::new(&[
            DomainConfig::new(100, template(json!([]), true)),
            DomainConfig::new(200, template(json!(["answers", -1]), true)),
            DomainConfig::new(300, template(json!(["answers", -1, "comments", -1]), true)),
        ]);

        let domain = |p: &[PathKey]| classifier.classify(p).map(|d| d.domain);
        assert_eq!(domain(&path!["title"]), Some(100));
        assert_eq!(domain(&path!["answers", 0usize]), Some(200));
        assert_eq!(domain(&path!["answers", 0usize, "text"]), Some(200));
        assert_eq!(domain(&path!["answers", 0usize, "comments", 1usize, "text"]), Some(300));
    }

    #[test]
    fn test_exact_template_listed_after_inheriting_prefix_wins_on_equal_length() {
        let classifier = DomainClassifier::new(&[
            DomainConfig::new(100, template(json!(["answers"]), true)),
            DomainConfig::new(200, template(json!(["answers", -1]), false)),
        ]);

        let domain = |p: &[PathKey]| classifier.classify(p).map(|d| d.domain);
        assert_eq!(domain(&path!["answers", 0usize]), Some(200));
        assert_eq!(domain(&path!["answers"]), Some(100));
        // Deeper than the exact template: only the inheriting one fits
        assert_eq!(domain(&path!["answers", 0usize, "text"]), Some(100));
    }

    #[test]
    fn test_no_domain_matches() {
        let classifier = DomainClassifier::new(&[DomainConfig::new(200, template(json!(["answers", -1]), false))]);
        assert!(classifier.classify(&path!["answers", 0usize, "text"]).is_none());
        assert!(classifier.classify(&path!["title"]).is_none());
    }
}
