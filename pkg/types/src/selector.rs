use anyhow::{Result, bail};
use std::collections::BTreeMap;

/// Equality-based label selector: every `key=value` pair must be present.
pub type LabelSelector = BTreeMap<String, String>;

/// Whether `labels` satisfy `selector`. An empty selector matches everything.
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|l| l == v))
}

/// Render a selector in `labelSelector` query form (`a=b,c=d`).
pub fn to_query(selector: &LabelSelector) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse `a=b,c=d` into a selector. Whitespace around terms is ignored.
pub fn parse(input: &str) -> Result<LabelSelector> {
    let mut selector = LabelSelector::new();
    for term in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let Some((key, value)) = term.split_once('=') else {
            bail!("selector term '{}' must have the form key=value", term);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("selector term '{}' has an empty key", term);
        }
        selector.insert(key.to_string(), value.trim().to_string());
    }
    Ok(selector)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(matches(&LabelSelector::new(), &labels(&[("app", "web")])));
        assert!(matches(&LabelSelector::new(), &BTreeMap::new()));
    }

    #[test]
    fn all_pairs_must_match() {
        let sel = labels(&[("app", "web"), ("tier", "front")]);
        assert!(matches(&sel, &labels(&[("app", "web"), ("tier", "front"), ("x", "y")])));
        assert!(!matches(&sel, &labels(&[("app", "web")])));
        assert!(!matches(&sel, &labels(&[("app", "web"), ("tier", "back")])));
    }

    #[test]
    fn parse_and_render() {
        let sel = parse(" tier=front , app=web ").unwrap();
        assert_eq!(sel, labels(&[("app", "web"), ("tier", "front")]));
        assert_eq!(to_query(&sel), "app=web,tier=front");
        assert!(parse("").unwrap().is_empty());
        assert!(parse("app").is_err());
        assert!(parse("=web").is_err());
    }
}
