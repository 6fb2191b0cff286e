//! The closed set of labels a reviewer may assign.

use serde::{Deserialize, Serialize};

/// One selectable label: what the reviewer sees and what goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationOption {
    pub label: String,
    pub value: String,
}

impl ClassificationOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Ordered enumeration of accepted classifications.
///
/// Membership is decided on the wire `value`, exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSet {
    options: Vec<ClassificationOption>,
}

impl Default for ClassificationSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl ClassificationSet {
    /// The moderation backend's labels.
    ///
    /// | Label            | Wire value       |
    /// |------------------|------------------|
    /// | Safe             | safe             |
    /// | Mildly Offensive | Mildly Offensive |
    /// | Highly Offensive | Highly Offensive |
    pub fn standard() -> Self {
        Self {
            options: vec![
                ClassificationOption::new("Safe", "safe"),
                ClassificationOption::new("Mildly Offensive", "Mildly Offensive"),
                ClassificationOption::new("Highly Offensive", "Highly Offensive"),
            ],
        }
    }

    /// Build a set whose labels equal their wire values.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: values
                .into_iter()
                .map(|v| {
                    let v = v.into();
                    ClassificationOption::new(v.clone(), v)
                })
                .collect(),
        }
    }

    /// Append an option (builder pattern).
    pub fn with_option(mut self, option: ClassificationOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(&self) -> &[ClassificationOption] {
        &self.options
    }

    /// Whether `value` is an accepted wire value.
    pub fn contains(&self, value: &str) -> bool {
        self.options.iter().any(|o| o.value == value)
    }

    /// Resolve free user input to an option, case-insensitively on label or value.
    pub fn resolve(&self, input: &str) -> Option<&ClassificationOption> {
        let needle = input.trim();
        self.options.iter().find(|o| o.value == needle).or_else(|| {
            self.options.iter().find(|o| {
                o.label.eq_ignore_ascii_case(needle) || o.value.eq_ignore_ascii_case(needle)
            })
        })
    }
}
