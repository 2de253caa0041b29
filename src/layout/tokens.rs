//! Placeholder tokens substituted into the runtime template.

use regex::{Captures, Regex};
use serde::Serialize;
use std::borrow::Cow;

/// Runtime settings serialized into the `BUILD_OPTIONS` token and read by
/// the server entry at process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOptions {
    pub development: bool,
    pub dynamic_origin: bool,
    pub xff_depth: u32,
    pub assets: bool,
}

/// A fixed set of placeholder → value pairs.
///
/// The set is frozen at construction: substitution is one left-to-right
/// pass over a single alternation, longest token first, so a token that
/// contains another (`dotENV_PREFIX` ⊃ `ENV_PREFIX`) wins and substituted
/// values are never rescanned.
#[derive(Debug, Clone)]
pub struct TokenSet {
    tokens: Vec<(String, String)>,
    pattern: Option<Regex>,
}

impl TokenSet {
    pub fn new<K, V, I>(tokens: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut tokens: Vec<(String, String)> = tokens
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        tokens.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens.dedup_by(|(a, _), (b, _)| a == b);

        let pattern = (!tokens.is_empty()).then(|| {
            let alternation = tokens
                .iter()
                .map(|(k, _)| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            // Escaped literals always form a valid pattern.
            Regex::new(&alternation).expect("escaped token alternation")
        });

        Self { tokens, pattern }
    }

    /// Tokens wiring the bundle and runtime settings into the template.
    pub fn for_runtime(env_prefix: &str, options: &BuildOptions) -> Self {
        Self::new([
            ("SERVER", "./server/index.js".to_string()),
            ("MANIFEST", "./server/manifest.js".to_string()),
            ("ENV_PREFIX", to_json(env_prefix)),
            ("dotENV_PREFIX", env_prefix.to_string()),
            ("BUILD_OPTIONS", to_json(options)),
        ])
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace every token occurrence in `text`.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let Some(pattern) = &self.pattern else {
            return Cow::Borrowed(text);
        };
        pattern.replace_all(text, |caps: &Captures| {
            let key = &caps[0];
            self.get(key).unwrap_or(key).to_string()
        })
    }
}

/// Render a token value as JSON.
fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    // Strings and flat structs of scalars cannot fail to serialize.
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BuildOptions {
        BuildOptions {
            development: false,
            dynamic_origin: true,
            xff_depth: 2,
            assets: true,
        }
    }

    #[test]
    fn test_runtime_tokens() {
        let tokens = TokenSet::for_runtime("MYAPP_", &options());

        assert_eq!(tokens.get("SERVER"), Some("./server/index.js"));
        assert_eq!(tokens.get("MANIFEST"), Some("./server/manifest.js"));
        assert_eq!(tokens.get("ENV_PREFIX"), Some("\"MYAPP_\""));
        assert_eq!(tokens.get("dotENV_PREFIX"), Some("MYAPP_"));
        assert_eq!(
            tokens.get("BUILD_OPTIONS"),
            Some(r#"{"development":false,"dynamic_origin":true,"xff_depth":2,"assets":true}"#)
        );
    }

    #[test]
    fn test_longer_token_wins() {
        let tokens = TokenSet::for_runtime("MYAPP_", &options());
        let out = tokens.apply("const p = ENV_PREFIX;\ndotENV_PREFIXPORT=3000\n");
        assert_eq!(out, "const p = \"MYAPP_\";\nMYAPP_PORT=3000\n");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let tokens = TokenSet::new([("A", "B"), ("B", "A")]);
        assert_eq!(tokens.apply("AB"), "BA");
    }

    #[test]
    fn test_empty_set_borrows() {
        let tokens = TokenSet::new(Vec::<(String, String)>::new());
        assert!(matches!(tokens.apply("SERVER"), Cow::Borrowed("SERVER")));
    }

    #[test]
    fn test_empty_prefix() {
        let tokens = TokenSet::for_runtime("", &options());
        assert_eq!(tokens.apply("ENV_PREFIX|dotENV_PREFIXHOST"), "\"\"|HOST");
    }
}
