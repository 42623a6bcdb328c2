/// A stylesheet parameter as the user edits it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XsltParameter {
    pub name: String,
    pub value: String,
}

impl XsltParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parameters without a name are kept in the list but never passed to
    /// a transform.
    pub fn is_applied(&self) -> bool {
        !self.name.is_empty()
    }
}

/// What happens to typed parameter values when a stylesheet is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParameterMergePolicy {
    /// Start over with empty values.
    #[default]
    Discard,
    /// Keep the value of every name the new stylesheet still declares.
    PreserveValues,
}

/// The parameter list for a freshly loaded stylesheet declaring `names`.
/// Repeated names get one entry.
pub fn reload_parameters(
    previous: &[XsltParameter],
    names: Vec<String>,
    policy: ParameterMergePolicy,
) -> Vec<XsltParameter> {
    let mut parameters: Vec<XsltParameter> = Vec::with_capacity(names.len());
    for name in names {
        if parameters.iter().any(|parameter| parameter.name == name) {
            continue;
        }
        let value = match policy {
            ParameterMergePolicy::Discard => String::new(),
            ParameterMergePolicy::PreserveValues => previous
                .iter()
                .find(|parameter| parameter.name == name)
                .map(|parameter| parameter.value.clone())
                .unwrap_or_default(),
        };
        parameters.push(XsltParameter { name, value });
    }
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ParameterMergePolicy::Discard, vec![("a", ""), ("c", "")])]
    #[case(ParameterMergePolicy::PreserveValues, vec![("a", "1"), ("c", "")])]
    fn test_reload(#[case] policy: ParameterMergePolicy, #[case] expected: Vec<(&str, &str)>) {
        let previous = vec![XsltParameter::new("a", "1"), XsltParameter::new("b", "2")];
        let names = vec!["a".to_string(), "c".to_string(), "a".to_string()];
        let expected: Vec<XsltParameter> = expected
            .into_iter()
            .map(|(name, value)| XsltParameter::new(name, value))
            .collect();
        assert_eq!(reload_parameters(&previous, names, policy), expected);
    }
}
