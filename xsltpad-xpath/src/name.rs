use ahash::{HashMap, HashMapExt};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A name with its namespace resolved.
///
/// XPath 1.0 has no default element namespace, so an unprefixed name is
/// always in no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub namespace: String,
    pub local: String,
}

impl ExpandedName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new("", local)
    }

    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    pub fn matches(&self, namespace: &str, local: &str) -> bool {
        self.namespace == namespace && self.local == local
    }
}

impl std::fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "Q{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// Prefix to namespace bindings used to resolve QNames while parsing.
#[derive(Debug, Clone)]
pub struct Namespaces {
    namespaces: HashMap<String, String>,
}

impl Namespaces {
    pub fn new() -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert("xml".to_string(), XML_NAMESPACE.to_string());
        Self { namespaces }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut namespaces = Self::new();
        for (prefix, uri) in pairs {
            namespaces.add(prefix, uri);
        }
        namespaces
    }

    /// Bind a prefix. The empty prefix is ignored; it never applies to
    /// names in expressions.
    pub fn add(&mut self, prefix: &str, uri: &str) {
        if !prefix.is_empty() {
            self.namespaces.insert(prefix.to_string(), uri.to_string());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    pub fn by_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(|s| s.as_str())
    }

    /// Resolve a lexical QName. Returns `None` if the prefix is unbound.
    pub fn resolve(&self, qname: &str) -> Option<ExpandedName> {
        match qname.split_once(':') {
            Some((prefix, local)) => self
                .by_prefix(prefix)
                .map(|uri| ExpandedName::new(uri, local)),
            None => Some(ExpandedName::local(qname)),
        }
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
    }
}
