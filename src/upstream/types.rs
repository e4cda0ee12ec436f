//! JSON bodies exchanged with the upstream directory service.

use serde::{Deserialize, Serialize};

/// `GET {base}/sets`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSetNames {
    #[serde(rename = "featureSets", default)]
    pub feature_sets: Vec<String>,
}

/// `GET {base}/set/{name}/features`
///
/// Feature order is preserved as returned upstream and duplicates are kept.
/// `version` is opaque to the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureList {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub features: Vec<String>,
}

impl FeatureList {
    pub fn new(version: i64, features: Vec<String>) -> Self {
        Self { version, features }
    }
}

/// `GET {base}/set/{name}/aliases`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasList {
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sets() {
        let body: FeatureSetNames =
            serde_json::from_str(r#"{"featureSets": ["alpha", "beta"]}"#).unwrap();
        assert_eq!(body.feature_sets, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_decode_features_keeps_order_and_duplicates() {
        let body: FeatureList =
            serde_json::from_str(r#"{"version": 4, "features": ["y", "x", "y"]}"#).unwrap();
        assert_eq!(body.version, 4);
        assert_eq!(body.features, vec!["y", "x", "y"]);
    }

    #[test]
    fn test_missing_fields_default() {
        let body: FeatureList = serde_json::from_str("{}").unwrap();
        assert_eq!(body, FeatureList::default());

        let aliases: AliasList = serde_json::from_str("{}").unwrap();
        assert!(aliases.aliases.is_empty());

        assert!(serde_json::from_str::<FeatureList>(r#"{"version": "one"}"#).is_err());
    }
}
