use crate::logic::features::FeatureSet;

pub const URL_BUCKET_PREFIX: &str = "__urls:";
pub const MISSING_FIELDS_TOKEN: &str = "__missing_fields";
pub const PATTERN_PREFIX: &str = "__pattern:";

/// Classifier input: bag of words plus discrete signal tokens.
/// Signal tokens use a `__` prefix so they can never collide with words.
pub fn feature_tokens(features: &FeatureSet) -> Vec<String> {
    let mut tokens = features.tokens.clone();
    tokens.push(format!("{}{}", URL_BUCKET_PREFIX, features.url_bucket()));
    if features.has_missing_fields() {
        tokens.push(MISSING_FIELDS_TOKEN.to_string());
    }
    tokens.extend(features.pattern_hits.keys().map(|family| format!("{}{}", PATTERN_PREFIX, family)));
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_tokens() {
        let mut fs = FeatureSet { tokens: vec!["cheap".into(), "pills".into()], url_count: 4, ..Default::default() };
        fs.missing_fields.push("email".into());
        fs.pattern_hits.insert("money".into(), 2);

        let tokens = feature_tokens(&fs);
        assert_eq!(
            tokens,
            vec!["cheap", "pills", "__urls:3-5", "__missing_fields", "__pattern:money"]
        );
    }

    #[test]
    fn test_empty_features_still_carry_url_bucket() {
        assert_eq!(feature_tokens(&FeatureSet::default()), vec!["__urls:0"]);
    }
}
