use regex::{Regex, RegexBuilder};
use serde::Deserialize;

/// A filename rule routing downloads into a subdirectory of the local directory.
///
/// Every field is required; there is no implicit case-sensitivity default.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CategoryRule {
    pub pattern: String,
    pub regex: bool,
    pub ignore_case: bool,
    pub subdirectory: String,
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Contains { needle: String, ignore_case: bool },
}

impl Matcher {
    fn is_match(&self, filename: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(filename),
            Matcher::Contains {
                needle,
                ignore_case: true,
            } => filename.to_lowercase().contains(needle.as_str()),
            Matcher::Contains { needle, .. } => filename.contains(needle.as_str()),
        }
    }
}

/// Ordered, pre-compiled category rules. First match wins.
#[derive(Debug, Clone, Default)]
pub struct CategoryMatcher {
    rules: Vec<(Matcher, String)>,
}

impl CategoryMatcher {
    pub fn compile(rules: &[CategoryRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| {
                let matcher = if rule.regex {
                    Matcher::Regex(
                        RegexBuilder::new(&rule.pattern)
                            .case_insensitive(rule.ignore_case)
                            .build()?,
                    )
                } else if rule.ignore_case {
                    Matcher::Contains {
                        needle: rule.pattern.to_lowercase(),
                        ignore_case: true,
                    }
                } else {
                    Matcher::Contains {
                        needle: rule.pattern.clone(),
                        ignore_case: false,
                    }
                };
                Ok((matcher, rule.subdirectory.clone()))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// Subdirectory of the first rule matching `filename`, if any.
    pub fn match_category(&self, filename: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.is_match(filename))
            .map(|(_, subdirectory)| subdirectory.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
