//! Compiled schema components.
//!
//! Types and element declarations live in arenas and refer to each other by
//! index, so recursive content models need no special treatment.

use ahash::{HashMap, HashMapExt};
use xsltpad_xpath::ExpandedName;

use crate::facets::Facets;
use crate::xs::{WhiteSpace, Xs, XS_NAMESPACE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TypeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ElementId(pub(crate) usize);

#[derive(Debug, Clone)]
pub(crate) enum TypeDefinition {
    Simple(SimpleType),
    Complex(ComplexType),
    /// Reserved while the definition is being compiled.
    Pending,
}

#[derive(Debug, Clone)]
pub(crate) struct SimpleType {
    pub(crate) name: Option<ExpandedName>,
    pub(crate) variety: Variety,
}

#[derive(Debug, Clone)]
pub(crate) enum Variety {
    Builtin(Xs),
    Restriction { base: TypeId, facets: Facets },
    List { item: TypeId },
    Union { members: Vec<TypeId> },
}

#[derive(Debug, Clone)]
pub(crate) struct ComplexType {
    pub(crate) name: Option<ExpandedName>,
    pub(crate) content: Content,
    pub(crate) attributes: Vec<AttributeUse>,
    pub(crate) any_attribute: Option<Wildcard>,
}

#[derive(Debug, Clone)]
pub(crate) enum Content {
    Empty,
    Simple(TypeId),
    Elements { particle: Particle, mixed: bool },
    /// The content of `xs:anyType`: anything, validated laxly.
    Any,
}

#[derive(Debug, Clone)]
pub(crate) struct AttributeUse {
    pub(crate) name: ExpandedName,
    pub(crate) type_id: TypeId,
    pub(crate) required: bool,
    pub(crate) prohibited: bool,
    pub(crate) default: Option<String>,
    pub(crate) fixed: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ElementDeclaration {
    pub(crate) name: ExpandedName,
    pub(crate) type_id: TypeId,
    pub(crate) nillable: bool,
    pub(crate) default: Option<String>,
    pub(crate) fixed: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Particle {
    pub(crate) min: usize,
    /// `None` is unbounded.
    pub(crate) max: Option<usize>,
    pub(crate) term: Term,
}

impl Particle {
    pub(crate) fn once(term: Term) -> Self {
        Self {
            min: 1,
            max: Some(1),
            term,
        }
    }

    /// Whether the particle can match no elements at all.
    pub(crate) fn emptiable(&self) -> bool {
        self.min == 0
            || match &self.term {
                Term::Element(_) | Term::Any(_) => false,
                Term::Sequence(items) | Term::All(items) => items.iter().all(Particle::emptiable),
                Term::Choice(items) => items.iter().any(Particle::emptiable),
            }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Term {
    Element(ElementId),
    Any(Wildcard),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessContents {
    Strict,
    Lax,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NamespaceConstraint {
    Any,
    /// Any namespace other than this one; names in no namespace are
    /// excluded as well.
    Not(String),
    /// One of these; the empty string stands for no namespace.
    Enumeration(Vec<String>),
}

#[derive(Debug, Clone)]
pub(crate) struct Wildcard {
    pub(crate) namespaces: NamespaceConstraint,
    pub(crate) process: ProcessContents,
}

impl Wildcard {
    pub(crate) fn allows(&self, namespace: &str) -> bool {
        match &self.namespaces {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Not(excluded) => !namespace.is_empty() && namespace != excluded,
            NamespaceConstraint::Enumeration(allowed) => allowed.iter().any(|a| a == namespace),
        }
    }
}

/// Everything a compiled schema consists of.
#[derive(Debug, Clone)]
pub(crate) struct Components {
    pub(crate) types: Vec<TypeDefinition>,
    pub(crate) elements: Vec<ElementDeclaration>,
    pub(crate) global_elements: HashMap<ExpandedName, ElementId>,
    pub(crate) global_types: HashMap<ExpandedName, TypeId>,
    pub(crate) global_attributes: HashMap<ExpandedName, AttributeUse>,
}

pub(crate) const ANY_TYPE: TypeId = TypeId(0);

impl Components {
    /// The built-in types, with `xs:anyType` first.
    pub(crate) fn new() -> Self {
        let mut components = Self {
            types: Vec::new(),
            elements: Vec::new(),
            global_elements: HashMap::new(),
            global_types: HashMap::new(),
            global_attributes: HashMap::new(),
        };
        let any_type = ExpandedName::new(XS_NAMESPACE, "anyType");
        components.types.push(TypeDefinition::Complex(ComplexType {
            name: Some(any_type.clone()),
            content: Content::Any,
            attributes: Vec::new(),
            any_attribute: Some(Wildcard {
                namespaces: NamespaceConstraint::Any,
                process: ProcessContents::Lax,
            }),
        }));
        components.global_types.insert(any_type, ANY_TYPE);
        for xs in Xs::ALL {
            let name = ExpandedName::new(XS_NAMESPACE, xs.local_name());
            let id = components.add_type(TypeDefinition::Simple(SimpleType {
                name: Some(name.clone()),
                variety: Variety::Builtin(xs),
            }));
            components.global_types.insert(name, id);
        }
        components
    }

    pub(crate) fn add_type(&mut self, definition: TypeDefinition) -> TypeId {
        self.types.push(definition);
        TypeId(self.types.len() - 1)
    }

    pub(crate) fn type_definition(&self, id: TypeId) -> &TypeDefinition {
        &self.types[id.0]
    }

    pub(crate) fn element(&self, id: ElementId) -> &ElementDeclaration {
        &self.elements[id.0]
    }

    /// The simple type of values of `id`: the type itself, or the content
    /// type of a complex type with simple content.
    fn simple(&self, id: TypeId) -> Option<&SimpleType> {
        match self.type_definition(id) {
            TypeDefinition::Simple(simple) => Some(simple),
            TypeDefinition::Complex(ComplexType {
                content: Content::Simple(content),
                ..
            }) => self.simple(*content),
            _ => None,
        }
    }

    /// The built-in type an atomic type is ultimately derived from.
    pub(crate) fn primitive(&self, id: TypeId) -> Option<Xs> {
        match &self.simple(id)?.variety {
            Variety::Builtin(xs) => Some(*xs),
            Variety::Restriction { base, .. } => self.primitive(*base),
            Variety::List { .. } | Variety::Union { .. } => None,
        }
    }

    pub(crate) fn is_list(&self, id: TypeId) -> bool {
        match self.simple(id).map(|simple| &simple.variety) {
            Some(Variety::Builtin(xs)) => xs.is_list(),
            Some(Variety::List { .. }) => true,
            Some(Variety::Restriction { base, .. }) => self.is_list(*base),
            _ => false,
        }
    }

    pub(crate) fn white_space(&self, id: TypeId) -> WhiteSpace {
        match self.simple(id).map(|simple| &simple.variety) {
            Some(Variety::Builtin(xs)) => xs.white_space(),
            Some(Variety::List { .. }) => WhiteSpace::Collapse,
            Some(Variety::Restriction { base, facets }) => facets
                .white_space
                .unwrap_or_else(|| self.white_space(*base)),
            _ => WhiteSpace::Preserve,
        }
    }

    /// Check a value against a simple type. The error describes the first
    /// problem found.
    pub(crate) fn check_simple(&self, id: TypeId, value: &str) -> Result<(), String> {
        let Some(simple) = self.simple(id) else {
            return Ok(());
        };
        let normalized = self.white_space(id).apply(value);
        match &simple.variety {
            Variety::Builtin(xs) => xs.parse(&normalized).map(|_| ()),
            Variety::List { item } => normalized
                .split(' ')
                .filter(|token| !token.is_empty())
                .try_for_each(|token| self.check_simple(*item, token)),
            Variety::Union { members } => {
                if members
                    .iter()
                    .any(|member| self.check_simple(*member, &normalized).is_ok())
                {
                    Ok(())
                } else {
                    Err(format!(
                        "'{}' is not valid for any member type of the union",
                        normalized
                    ))
                }
            }
            Variety::Restriction { base, facets } => {
                self.check_simple(*base, &normalized)?;
                let length = if self.is_list(id) {
                    normalized.split(' ').filter(|s| !s.is_empty()).count()
                } else {
                    match self.primitive(id) {
                        Some(xs) => xs.length(&normalized),
                        None => normalized.chars().count(),
                    }
                };
                let value = self
                    .primitive(id)
                    .and_then(|xs| xs.parse(&normalized).ok());
                facets.check(&normalized, length, value.as_ref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_namespaces() {
        let other = Wildcard {
            namespaces: NamespaceConstraint::Not("urn:t".to_string()),
            process: ProcessContents::Lax,
        };
        assert!(other.allows("urn:x"));
        assert!(!other.allows("urn:t"));
        assert!(!other.allows(""));
        let local = Wildcard {
            namespaces: NamespaceConstraint::Enumeration(vec![String::new()]),
            process: ProcessContents::Skip,
        };
        assert!(local.allows(""));
        assert!(!local.allows("urn:x"));
    }

    #[test]
    fn test_emptiable() {
        let element = || Particle::once(Term::Element(ElementId(0)));
        let optional = Particle {
            min: 0,
            max: Some(1),
            term: Term::Element(ElementId(0)),
        };
        assert!(!Particle::once(Term::Sequence(vec![element(), optional.clone()])).emptiable());
        assert!(Particle::once(Term::Choice(vec![element(), optional])).emptiable());
    }

    #[test]
    fn test_restriction_inherits_white_space() {
        let mut components = Components::new();
        let token = components.global_types[&ExpandedName::new(XS_NAMESPACE, "token")];
        let restricted = components.add_type(TypeDefinition::Simple(SimpleType {
            name: None,
            variety: Variety::Restriction {
                base: token,
                facets: Facets {
                    max_length: Some(3),
                    ..Default::default()
                },
            },
        }));
        assert_eq!(components.white_space(restricted), WhiteSpace::Collapse);
        assert!(components.check_simple(restricted, "  abc ").is_ok());
        assert!(components.check_simple(restricted, "abcd").is_err());
    }

    #[test]
    fn test_list_of_integers() {
        let mut components = Components::new();
        let integer = components.global_types[&ExpandedName::new(XS_NAMESPACE, "integer")];
        let list = components.add_type(TypeDefinition::Simple(SimpleType {
            name: None,
            variety: Variety::List { item: integer },
        }));
        assert!(components.check_simple(list, "1 2\n 3").is_ok());
        assert!(components.check_simple(list, "1 x").is_err());
        assert!(components.is_list(list));
    }
}
