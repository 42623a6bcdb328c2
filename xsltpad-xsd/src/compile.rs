//! Compile schema documents into [`Components`].
//!
//! Loading happens first: the principal document and everything it
//! includes or imports are parsed, and their top-level declarations are
//! registered by name. Named components are then compiled on demand, so
//! declarations may refer to each other in any order.

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use tracing::debug;
use xot::{Node, Xot};
use xsltpad_xpath::{
    attribute_value, in_scope_namespaces, local_name, namespace_uri, ExpandedName, Resolver,
};

use crate::error::{Result, SchemaError};
use crate::facets::{facet_bound, facet_count, Facets};
use crate::model::{
    AttributeUse, ComplexType, Components, Content, ElementDeclaration, ElementId,
    NamespaceConstraint, Particle, ProcessContents, SimpleType, Term, TypeDefinition, TypeId,
    Variety, Wildcard, ANY_TYPE,
};
use crate::xs::{WhiteSpace, XS_NAMESPACE};

/// A loaded schema document.
struct Document {
    target: String,
    qualified_elements: bool,
    qualified_attributes: bool,
}

/// A top-level declaration and the document it's declared in.
#[derive(Debug, Clone, Copy)]
struct Declared {
    document: usize,
    node: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Type,
    Element,
    Attribute,
    Group,
    AttributeGroup,
}

struct Compiler<'a> {
    xot: Xot,
    resolver: &'a dyn Resolver,
    documents: Vec<Document>,
    loaded: HashSet<(String, String)>,
    declared: HashMap<(Kind, ExpandedName), Declared>,
    components: Components,
    /// Named groups and attribute groups being expanded.
    expanding: Vec<(Kind, ExpandedName)>,
}

pub(crate) fn compile(
    text: &str,
    uri: Option<&str>,
    resolver: &dyn Resolver,
) -> Result<Components> {
    let mut compiler = Compiler {
        xot: Xot::new(),
        resolver,
        documents: Vec::new(),
        loaded: HashSet::new(),
        declared: HashMap::new(),
        components: Components::new(),
        expanding: Vec::new(),
    };
    compiler.load(text, uri, None)?;
    compiler.compile_declarations()?;
    Ok(compiler.components)
}

impl Compiler<'_> {
    fn load(&mut self, text: &str, uri: Option<&str>, chameleon: Option<&str>) -> Result<()> {
        let document_name = uri.unwrap_or("schema").to_string();
        let root = self.xot.parse(text).map_err(|source| SchemaError::Xml {
            document: document_name.clone(),
            source,
        })?;
        let schema = self
            .xot
            .document_element(root)
            .map_err(|_| SchemaError::NotASchema(document_name.clone()))?;
        if !self.is_xs(schema, "schema") {
            return Err(SchemaError::NotASchema(document_name));
        }
        let own_target = self.attribute(schema, "targetNamespace");
        if let Some(uri) = uri {
            // A chameleon include is a distinct document per including
            // namespace.
            let key = match &own_target {
                Some(_) => String::new(),
                None => chameleon.unwrap_or_default().to_string(),
            };
            if !self.loaded.insert((uri.to_string(), key)) {
                return Ok(());
            }
        }
        let target = own_target.unwrap_or_else(|| chameleon.unwrap_or_default().to_string());
        let qualified_elements =
            self.attribute(schema, "elementFormDefault").as_deref() == Some("qualified");
        let qualified_attributes =
            self.attribute(schema, "attributeFormDefault").as_deref() == Some("qualified");
        let document = self.documents.len();
        self.documents.push(Document {
            target: target.clone(),
            qualified_elements,
            qualified_attributes,
        });
        for child in self.xs_children(schema) {
            let kind = local_name(&self.xot, child).to_string();
            match kind.as_str() {
                "include" => {
                    let href = self.required(child, "schemaLocation")?;
                    self.load_external(&href, uri, Some(&target))?;
                }
                "import" => match self.attribute(child, "schemaLocation") {
                    Some(href) => self.load_external(&href, uri, None)?,
                    None => debug!(
                        namespace = ?self.attribute(child, "namespace"),
                        "import without schemaLocation ignored"
                    ),
                },
                "redefine" | "override" => {
                    return Err(SchemaError::Malformed(format!(
                        "xs:{} is not supported",
                        local_name(&self.xot, child)
                    )))
                }
                "element" => self.declare(Kind::Element, document, child)?,
                "attribute" => self.declare(Kind::Attribute, document, child)?,
                "simpleType" | "complexType" => self.declare(Kind::Type, document, child)?,
                "group" => self.declare(Kind::Group, document, child)?,
                "attributeGroup" => self.declare(Kind::AttributeGroup, document, child)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn load_external(
        &mut self,
        href: &str,
        base: Option<&str>,
        chameleon: Option<&str>,
    ) -> Result<()> {
        let loaded = self
            .resolver
            .load(href, base)
            .map_err(|source| SchemaError::Load {
                href: href.to_string(),
                source,
            })?;
        self.load(&loaded.text, Some(&loaded.uri), chameleon)
    }

    fn declare(&mut self, kind: Kind, document: usize, node: Node) -> Result<()> {
        let local = self.required(node, "name")?;
        let name = ExpandedName::new(self.documents[document].target.clone(), local);
        self.declared.insert((kind, name), Declared { document, node });
        Ok(())
    }

    fn compile_declarations(&mut self) -> Result<()> {
        let mut declared = self.declared.keys().cloned().collect::<Vec<_>>();
        declared.sort_by(|a, b| a.1.cmp(&b.1));
        for (kind, name) in declared {
            match kind {
                Kind::Type => {
                    self.type_by_name(&name)?;
                }
                Kind::Element => {
                    self.element_by_name(&name)?;
                }
                Kind::Attribute => {
                    self.attribute_by_name(&name)?;
                }
                Kind::Group | Kind::AttributeGroup => {}
            }
        }
        Ok(())
    }

    // Names

    fn is_xs(&self, node: Node, local: &str) -> bool {
        self.xot.is_element(node)
            && namespace_uri(&self.xot, node) == XS_NAMESPACE
            && local_name(&self.xot, node) == local
    }

    /// Element children in the schema namespace, annotations skipped.
    fn xs_children(&self, node: Node) -> Vec<Node> {
        self.xot
            .children(node)
            .filter(|child| {
                self.xot.is_element(*child)
                    && namespace_uri(&self.xot, *child) == XS_NAMESPACE
                    && local_name(&self.xot, *child) != "annotation"
            })
            .collect()
    }

    fn attribute(&self, node: Node, local: &str) -> Option<String> {
        attribute_value(&self.xot, node, "", local).map(str::to_string)
    }

    fn required(&self, node: Node, local: &str) -> Result<String> {
        self.attribute(node, local).ok_or_else(|| {
            SchemaError::Malformed(format!(
                "xs:{} requires a {} attribute",
                local_name(&self.xot, node),
                local
            ))
        })
    }

    /// Resolve a QName-valued attribute using the namespaces in scope,
    /// the default namespace included.
    fn qname(&self, node: Node, qname: &str) -> Result<ExpandedName> {
        let qname = qname.trim();
        let (prefix, local) = qname.split_once(':').unwrap_or(("", qname));
        let namespaces = in_scope_namespaces(&self.xot, node);
        match namespaces.iter().find(|(bound, _)| bound == prefix) {
            Some((_, uri)) => Ok(ExpandedName::new(uri.clone(), local)),
            None if prefix.is_empty() => Ok(ExpandedName::local(local)),
            None => Err(SchemaError::UnboundPrefix(qname.to_string())),
        }
    }

    fn qualified(&self, document: usize, node: Node, local: &str, default: bool) -> ExpandedName {
        let qualified = match self.attribute(node, "form").as_deref() {
            Some("qualified") => true,
            Some("unqualified") => false,
            _ => default,
        };
        if qualified {
            ExpandedName::new(self.documents[document].target.clone(), local)
        } else {
            ExpandedName::local(local)
        }
    }

    // Types

    fn type_by_name(&mut self, name: &ExpandedName) -> Result<TypeId> {
        if let Some(id) = self.components.global_types.get(name) {
            return Ok(*id);
        }
        let declared = *self
            .declared
            .get(&(Kind::Type, name.clone()))
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))?;
        let id = self.components.add_type(TypeDefinition::Pending);
        self.components.global_types.insert(name.clone(), id);
        let definition = self.type_definition(declared.document, declared.node, Some(name.clone()))?;
        self.components.types[id.0] = definition;
        Ok(id)
    }

    /// A referenced base type; it must be fully compiled already.
    fn base_type(&mut self, node: Node, qname: &str) -> Result<TypeId> {
        let name = self.qname(node, qname)?;
        let id = self.type_by_name(&name)?;
        if matches!(self.components.type_definition(id), TypeDefinition::Pending) {
            return Err(SchemaError::CircularDerivation(name.to_string()));
        }
        Ok(id)
    }

    fn type_definition(
        &mut self,
        document: usize,
        node: Node,
        name: Option<ExpandedName>,
    ) -> Result<TypeDefinition> {
        if self.is_xs(node, "simpleType") {
            Ok(TypeDefinition::Simple(self.simple_type(document, node, name)?))
        } else {
            Ok(TypeDefinition::Complex(self.complex_type(document, node, name)?))
        }
    }

    fn anonymous_type(&mut self, document: usize, node: Node) -> Result<TypeId> {
        let definition = self.type_definition(document, node, None)?;
        Ok(self.components.add_type(definition))
    }

    /// The type given by a `type` attribute or an anonymous type child.
    fn declared_type(&mut self, document: usize, node: Node, default: TypeId) -> Result<TypeId> {
        if let Some(qname) = self.attribute(node, "type") {
            let name = self.qname(node, &qname)?;
            return self.type_by_name(&name);
        }
        let anonymous = self
            .xs_children(node)
            .into_iter()
            .find(|child| self.is_xs(*child, "simpleType") || self.is_xs(*child, "complexType"));
        match anonymous {
            Some(child) => self.anonymous_type(document, child),
            None => Ok(default),
        }
    }

    fn simple_type(
        &mut self,
        document: usize,
        node: Node,
        name: Option<ExpandedName>,
    ) -> Result<SimpleType> {
        let derivation = self
            .xs_children(node)
            .into_iter()
            .next()
            .ok_or_else(|| SchemaError::Malformed("empty xs:simpleType".to_string()))?;
        let kind = local_name(&self.xot, derivation).to_string();
        let variety = match kind.as_str() {
            "restriction" => {
                let base = self.simple_base(document, derivation)?;
                let facets = self.facets(derivation, base)?;
                Variety::Restriction { base, facets }
            }
            "list" => {
                let item = match self.attribute(derivation, "itemType") {
                    Some(qname) => self.base_type(derivation, &qname)?,
                    None => self.nested_simple_type(document, derivation)?,
                };
                Variety::List { item }
            }
            "union" => {
                let mut members = Vec::new();
                if let Some(member_types) = self.attribute(derivation, "memberTypes") {
                    for qname in member_types.split_whitespace() {
                        members.push(self.base_type(derivation, qname)?);
                    }
                }
                for child in self.xs_children(derivation) {
                    if self.is_xs(child, "simpleType") {
                        members.push(self.anonymous_type(document, child)?);
                    }
                }
                Variety::Union { members }
            }
            other => {
                return Err(SchemaError::Malformed(format!(
                    "unexpected xs:{} in xs:simpleType",
                    other
                )))
            }
        };
        Ok(SimpleType { name, variety })
    }

    fn simple_base(&mut self, document: usize, restriction: Node) -> Result<TypeId> {
        match self.attribute(restriction, "base") {
            Some(qname) => self.base_type(restriction, &qname),
            None => self.nested_simple_type(document, restriction),
        }
    }

    fn nested_simple_type(&mut self, document: usize, node: Node) -> Result<TypeId> {
        let child = self
            .xs_children(node)
            .into_iter()
            .find(|child| self.is_xs(*child, "simpleType"))
            .ok_or_else(|| {
                SchemaError::Malformed(format!(
                    "xs:{} needs a type reference or an xs:simpleType",
                    local_name(&self.xot, node)
                ))
            })?;
        self.anonymous_type(document, child)
    }

    /// The facets of a restriction of `base`.
    fn facets(&mut self, restriction: Node, base: TypeId) -> Result<Facets> {
        let primitive = self.components.primitive(base);
        let white_space = self.components.white_space(base);
        let mut facets = Facets::default();
        let mut patterns = Vec::new();
        for child in self.xs_children(restriction) {
            let facet = local_name(&self.xot, child).to_string();
            if matches!(
                facet.as_str(),
                "simpleType" | "attribute" | "attributeGroup" | "anyAttribute"
            ) {
                continue;
            }
            let value = self.required(child, "value")?;
            match facet.as_str() {
                "enumeration" => {
                    let normalized = white_space.apply(&value);
                    let atomic = match primitive {
                        Some(xs) => Some(xs.parse(&normalized).map_err(|reason| {
                            SchemaError::BadFacet {
                                facet: facet.clone(),
                                value: value.clone(),
                                reason,
                            }
                        })?),
                        None => None,
                    };
                    facets.enumeration.push((normalized, atomic));
                }
                "pattern" => patterns.push(value),
                "length" => facets.length = Some(facet_count(&facet, &value)?),
                "minLength" => facets.min_length = Some(facet_count(&facet, &value)?),
                "maxLength" => facets.max_length = Some(facet_count(&facet, &value)?),
                "totalDigits" => facets.total_digits = Some(facet_count(&facet, &value)? as u32),
                "fractionDigits" => {
                    facets.fraction_digits = Some(facet_count(&facet, &value)? as u32)
                }
                "minInclusive" | "maxInclusive" | "minExclusive" | "maxExclusive" => {
                    let xs = primitive.ok_or_else(|| SchemaError::BadFacet {
                        facet: facet.clone(),
                        value: value.clone(),
                        reason: "the base type is not atomic".to_string(),
                    })?;
                    let bound = Some(facet_bound(&facet, &value, xs)?);
                    match facet.as_str() {
                        "minInclusive" => facets.min_inclusive = bound,
                        "maxInclusive" => facets.max_inclusive = bound,
                        "minExclusive" => facets.min_exclusive = bound,
                        _ => facets.max_exclusive = bound,
                    }
                }
                "whiteSpace" => {
                    let requested =
                        WhiteSpace::by_name(&value).ok_or_else(|| SchemaError::BadFacet {
                            facet: facet.clone(),
                            value: value.clone(),
                            reason: "expected preserve, replace or collapse".to_string(),
                        })?;
                    if requested < white_space {
                        return Err(SchemaError::BadFacet {
                            facet: facet.clone(),
                            value,
                            reason: "cannot relax the whitespace handling of the base type"
                                .to_string(),
                        });
                    }
                    facets.white_space = Some(requested);
                }
                other => {
                    return Err(SchemaError::BadFacet {
                        facet: other.to_string(),
                        value,
                        reason: "unknown facet".to_string(),
                    })
                }
            }
        }
        facets.set_pattern(patterns)?;
        Ok(facets)
    }

    fn complex_type(
        &mut self,
        document: usize,
        node: Node,
        name: Option<ExpandedName>,
    ) -> Result<ComplexType> {
        let mixed = self.attribute(node, "mixed").as_deref() == Some("true");
        let children = self.xs_children(node);
        let derivation = children.iter().copied().find(|child| {
            self.is_xs(*child, "simpleContent") || self.is_xs(*child, "complexContent")
        });
        let mut complex = ComplexType {
            name,
            content: Content::Empty,
            attributes: Vec::new(),
            any_attribute: None,
        };
        let Some(derivation) = derivation else {
            let particle = self.content_particle(document, node)?;
            complex.content = elements_content(particle, mixed);
            self.attribute_uses(
                document,
                node,
                &mut complex.attributes,
                &mut complex.any_attribute,
            )?;
            return Ok(complex);
        };
        let method = self
            .xs_children(derivation)
            .into_iter()
            .next()
            .ok_or_else(|| {
                SchemaError::Malformed(format!("empty xs:{}", local_name(&self.xot, derivation)))
            })?;
        let kind = local_name(&self.xot, method).to_string();
        let extension = match kind.as_str() {
            "extension" => true,
            "restriction" => false,
            other => {
                return Err(SchemaError::Malformed(format!(
                    "unexpected xs:{} in xs:{}",
                    other,
                    local_name(&self.xot, derivation)
                )))
            }
        };
        let base_qname = self.required(method, "base")?;
        let base = self.base_type(method, &base_qname)?;
        let (base_content, base_attributes, base_wildcard) =
            match self.components.type_definition(base) {
                TypeDefinition::Complex(base) => (
                    Some(base.content.clone()),
                    base.attributes.clone(),
                    base.any_attribute.clone(),
                ),
                _ => (None, Vec::new(), None),
            };

        if self.is_xs(derivation, "simpleContent") {
            complex.content = match (extension, base_content) {
                (true, None) => Content::Simple(base),
                (_, Some(Content::Simple(content))) => {
                    if extension {
                        Content::Simple(content)
                    } else {
                        let restricted = match self
                            .xs_children(method)
                            .into_iter()
                            .find(|child| self.is_xs(*child, "simpleType"))
                        {
                            Some(child) => self.anonymous_type(document, child)?,
                            None => content,
                        };
                        let facets = self.facets(method, restricted)?;
                        Content::Simple(self.components.add_type(TypeDefinition::Simple(
                            SimpleType {
                                name: None,
                                variety: Variety::Restriction {
                                    base: restricted,
                                    facets,
                                },
                            },
                        )))
                    }
                }
                _ => {
                    return Err(SchemaError::Malformed(format!(
                        "simple content cannot derive from {}",
                        base_qname
                    )))
                }
            };
        } else {
            let mixed = match self.attribute(derivation, "mixed").as_deref() {
                Some(value) => value == "true",
                None => mixed,
            };
            let own = self.content_particle(document, method)?;
            complex.content = if extension {
                match base_content {
                    Some(Content::Elements { particle, mixed: base_mixed }) => {
                        let particle = match own {
                            Some(own) => Particle::once(Term::Sequence(vec![particle, own])),
                            None => particle,
                        };
                        Content::Elements {
                            particle,
                            mixed: mixed || base_mixed,
                        }
                    }
                    Some(Content::Any) => Content::Any,
                    Some(Content::Empty) | None => elements_content(own, mixed),
                    Some(Content::Simple(_)) => {
                        return Err(SchemaError::Malformed(format!(
                            "complex content cannot extend the simple content of {}",
                            base_qname
                        )))
                    }
                }
            } else {
                elements_content(own, mixed)
            };
        }

        let mut own_attributes = Vec::new();
        let mut own_wildcard = None;
        self.attribute_uses(document, method, &mut own_attributes, &mut own_wildcard)?;
        complex.attributes = base_attributes;
        for attribute in own_attributes {
            merge_attribute(&mut complex.attributes, attribute);
        }
        complex.attributes.retain(|attribute| !attribute.prohibited);
        complex.any_attribute = if extension {
            own_wildcard.or(base_wildcard)
        } else {
            own_wildcard
        };
        Ok(complex)
    }

    /// The model group particle among the children of `node`, if any.
    fn content_particle(&mut self, document: usize, node: Node) -> Result<Option<Particle>> {
        let group = self.xs_children(node).into_iter().find(|child| {
            ["sequence", "choice", "all", "group"]
                .iter()
                .any(|local| self.is_xs(*child, local))
        });
        match group {
            Some(group) => self.particle(document, group),
            None => Ok(None),
        }
    }

    // Particles

    fn occurs(&self, node: Node) -> Result<(usize, Option<usize>)> {
        let min = match self.attribute(node, "minOccurs") {
            Some(value) => facet_count("minOccurs", &value)?,
            None => 1,
        };
        let max = match self.attribute(node, "maxOccurs").as_deref() {
            Some("unbounded") => None,
            Some(value) => Some(facet_count("maxOccurs", value)?),
            None => Some(1),
        };
        if max.is_some_and(|max| max < min) {
            return Err(SchemaError::Malformed(format!(
                "maxOccurs is less than minOccurs on xs:{}",
                local_name(&self.xot, node)
            )));
        }
        Ok((min, max))
    }

    /// Compile a particle. A particle with `maxOccurs="0"` is dropped.
    fn particle(&mut self, document: usize, node: Node) -> Result<Option<Particle>> {
        let (min, max) = self.occurs(node)?;
        if max == Some(0) {
            return Ok(None);
        }
        let kind = local_name(&self.xot, node).to_string();
        let term = match kind.as_str() {
            "element" => Term::Element(self.local_element(document, node)?),
            "any" => Term::Any(self.wildcard(document, node)),
            "sequence" | "choice" | "all" => {
                let mut items = Vec::new();
                for child in self.xs_children(node) {
                    if let Some(item) = self.particle(document, child)? {
                        items.push(item);
                    }
                }
                match kind.as_str() {
                    "sequence" => Term::Sequence(items),
                    "choice" => Term::Choice(items),
                    _ => Term::All(items),
                }
            }
            "group" => {
                let qname = self.required(node, "ref")?;
                let name = self.qname(node, &qname)?;
                let Some(mut particle) = self.group(&name)? else {
                    return Ok(None);
                };
                particle.min = min;
                particle.max = max;
                return Ok(Some(particle));
            }
            other => {
                return Err(SchemaError::Malformed(format!(
                    "unexpected xs:{} in a content model",
                    other
                )))
            }
        };
        Ok(Some(Particle { min, max, term }))
    }

    fn group(&mut self, name: &ExpandedName) -> Result<Option<Particle>> {
        let declared = *self
            .declared
            .get(&(Kind::Group, name.clone()))
            .ok_or_else(|| SchemaError::UnknownGroup(name.to_string()))?;
        let key = (Kind::Group, name.clone());
        if self.expanding.contains(&key) {
            return Err(SchemaError::Malformed(format!("group {} refers to itself", name)));
        }
        self.expanding.push(key);
        let particle = self.content_particle(declared.document, declared.node);
        self.expanding.pop();
        particle
    }

    fn wildcard(&self, document: usize, node: Node) -> Wildcard {
        let target = &self.documents[document].target;
        let namespaces = match self.attribute(node, "namespace").as_deref() {
            None | Some("##any") => NamespaceConstraint::Any,
            Some("##other") => NamespaceConstraint::Not(target.clone()),
            Some(list) => NamespaceConstraint::Enumeration(
                list.split_whitespace()
                    .map(|token| match token {
                        "##targetNamespace" => target.clone(),
                        "##local" => String::new(),
                        uri => uri.to_string(),
                    })
                    .collect(),
            ),
        };
        let process = match self.attribute(node, "processContents").as_deref() {
            Some("lax") => ProcessContents::Lax,
            Some("skip") => ProcessContents::Skip,
            _ => ProcessContents::Strict,
        };
        Wildcard {
            namespaces,
            process,
        }
    }

    // Elements

    fn element_by_name(&mut self, name: &ExpandedName) -> Result<ElementId> {
        if let Some(id) = self.components.global_elements.get(name) {
            return Ok(*id);
        }
        let declared = *self
            .declared
            .get(&(Kind::Element, name.clone()))
            .ok_or_else(|| SchemaError::UnknownElement(name.to_string()))?;
        let id = ElementId(self.components.elements.len());
        self.components.elements.push(ElementDeclaration {
            name: name.clone(),
            type_id: ANY_TYPE,
            nillable: false,
            default: None,
            fixed: None,
        });
        self.components.global_elements.insert(name.clone(), id);
        let declaration = self.element_declaration(declared.document, declared.node, name.clone())?;
        self.components.elements[id.0] = declaration;
        Ok(id)
    }

    fn local_element(&mut self, document: usize, node: Node) -> Result<ElementId> {
        if let Some(qname) = self.attribute(node, "ref") {
            let name = self.qname(node, &qname)?;
            return self.element_by_name(&name);
        }
        let local = self.required(node, "name")?;
        let default = self.documents[document].qualified_elements;
        let name = self.qualified(document, node, &local, default);
        let declaration = self.element_declaration(document, node, name)?;
        self.components.elements.push(declaration);
        Ok(ElementId(self.components.elements.len() - 1))
    }

    fn element_declaration(
        &mut self,
        document: usize,
        node: Node,
        name: ExpandedName,
    ) -> Result<ElementDeclaration> {
        let type_id = self.declared_type(document, node, ANY_TYPE)?;
        Ok(ElementDeclaration {
            name,
            type_id,
            nillable: self.attribute(node, "nillable").as_deref() == Some("true"),
            default: self.attribute(node, "default"),
            fixed: self.attribute(node, "fixed"),
        })
    }

    // Attributes

    fn attribute_by_name(&mut self, name: &ExpandedName) -> Result<AttributeUse> {
        if let Some(attribute) = self.components.global_attributes.get(name) {
            return Ok(attribute.clone());
        }
        let declared = *self
            .declared
            .get(&(Kind::Attribute, name.clone()))
            .ok_or_else(|| SchemaError::UnknownAttribute(name.to_string()))?;
        let any_simple_type = self.type_by_name(&ExpandedName::new(XS_NAMESPACE, "anySimpleType"))?;
        let type_id = self.declared_type(declared.document, declared.node, any_simple_type)?;
        let attribute = AttributeUse {
            name: name.clone(),
            type_id,
            required: false,
            prohibited: false,
            default: self.attribute(declared.node, "default"),
            fixed: self.attribute(declared.node, "fixed"),
        };
        self.components
            .global_attributes
            .insert(name.clone(), attribute.clone());
        Ok(attribute)
    }

    /// Collect the attribute uses and attribute wildcard declared among the
    /// children of `node`.
    fn attribute_uses(
        &mut self,
        document: usize,
        node: Node,
        attributes: &mut Vec<AttributeUse>,
        wildcard: &mut Option<Wildcard>,
    ) -> Result<()> {
        for child in self.xs_children(node) {
            let kind = local_name(&self.xot, child).to_string();
            match kind.as_str() {
                "attribute" => {
                    let attribute = self.attribute_use(document, child)?;
                    merge_attribute(attributes, attribute);
                }
                "attributeGroup" => {
                    let qname = self.required(child, "ref")?;
                    let name = self.qname(child, &qname)?;
                    let declared = *self
                        .declared
                        .get(&(Kind::AttributeGroup, name.clone()))
                        .ok_or_else(|| SchemaError::UnknownAttributeGroup(name.to_string()))?;
                    let key = (Kind::AttributeGroup, name.clone());
                    if self.expanding.contains(&key) {
                        return Err(SchemaError::Malformed(format!(
                            "attribute group {} refers to itself",
                            name
                        )));
                    }
                    self.expanding.push(key);
                    let result =
                        self.attribute_uses(declared.document, declared.node, attributes, wildcard);
                    self.expanding.pop();
                    result?;
                }
                "anyAttribute" => *wildcard = Some(self.wildcard(document, child)),
                _ => {}
            }
        }
        Ok(())
    }

    fn attribute_use(&mut self, document: usize, node: Node) -> Result<AttributeUse> {
        let mut attribute = match self.attribute(node, "ref") {
            Some(qname) => {
                let name = self.qname(node, &qname)?;
                self.attribute_by_name(&name)?
            }
            None => {
                let local = self.required(node, "name")?;
                let default = self.documents[document].qualified_attributes;
                let name = self.qualified(document, node, &local, default);
                let any_simple_type =
                    self.type_by_name(&ExpandedName::new(XS_NAMESPACE, "anySimpleType"))?;
                AttributeUse {
                    name,
                    type_id: self.declared_type(document, node, any_simple_type)?,
                    required: false,
                    prohibited: false,
                    default: None,
                    fixed: None,
                }
            }
        };
        match self.attribute(node, "use").as_deref() {
            Some("required") => attribute.required = true,
            Some("prohibited") => attribute.prohibited = true,
            _ => {}
        }
        if let Some(default) = self.attribute(node, "default") {
            attribute.default = Some(default);
        }
        if let Some(fixed) = self.attribute(node, "fixed") {
            attribute.fixed = Some(fixed);
        }
        Ok(attribute)
    }
}

fn elements_content(particle: Option<Particle>, mixed: bool) -> Content {
    match particle {
        Some(particle) => Content::Elements { particle, mixed },
        None if mixed => Content::Elements {
            particle: Particle::once(Term::Sequence(Vec::new())),
            mixed,
        },
        None => Content::Empty,
    }
}

/// Add an attribute use, replacing one with the same name.
fn merge_attribute(attributes: &mut Vec<AttributeUse>, attribute: AttributeUse) {
    match attributes.iter_mut().find(|a| a.name == attribute.name) {
        Some(existing) => *existing = attribute,
        None => attributes.push(attribute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsltpad_xpath::NoResolver;

    fn compile_str(schema: &str) -> Result<Components> {
        compile(schema, None, &NoResolver)
    }

    const XS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    #[test]
    fn test_forward_references() {
        let components = compile_str(&format!(
            r#"<xs:schema {XS}>
                 <xs:element name="root" type="Root"/>
                 <xs:complexType name="Root">
                   <xs:sequence><xs:element ref="item" maxOccurs="unbounded"/></xs:sequence>
                 </xs:complexType>
                 <xs:element name="item" type="xs:string"/>
               </xs:schema>"#
        ))
        .unwrap();
        assert!(components
            .global_elements
            .contains_key(&ExpandedName::local("root")));
        assert!(components
            .global_types
            .contains_key(&ExpandedName::local("Root")));
    }

    #[test]
    fn test_recursive_element() {
        let components = compile_str(&format!(
            r#"<xs:schema {XS}>
                 <xs:element name="node">
                   <xs:complexType>
                     <xs:sequence><xs:element ref="node" minOccurs="0" maxOccurs="unbounded"/></xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#
        ));
        assert!(components.is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let error = compile_str(&format!(
            r#"<xs:schema {XS}><xs:element name="a" type="Missing"/></xs:schema>"#
        ))
        .unwrap_err();
        assert_eq!(error.to_string(), "unknown type Missing");
    }

    #[test]
    fn test_unbound_prefix() {
        let error = compile_str(&format!(
            r#"<xs:schema {XS}><xs:element name="a" type="nope:T"/></xs:schema>"#
        ))
        .unwrap_err();
        assert!(matches!(error, SchemaError::UnboundPrefix(_)));
    }

    #[test]
    fn test_circular_derivation() {
        let error = compile_str(&format!(
            r#"<xs:schema {XS}>
                 <xs:simpleType name="A"><xs:restriction base="B"/></xs:simpleType>
                 <xs:simpleType name="B"><xs:restriction base="A"/></xs:simpleType>
               </xs:schema>"#
        ))
        .unwrap_err();
        assert!(matches!(error, SchemaError::CircularDerivation(_)));
    }

    #[test]
    fn test_bad_facet() {
        let error = compile_str(&format!(
            r#"<xs:schema {XS}>
                 <xs:simpleType name="A">
                   <xs:restriction base="xs:integer"><xs:maxInclusive value="ten"/></xs:restriction>
                 </xs:simpleType>
               </xs:schema>"#
        ))
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid value \"ten\" for facet maxInclusive: 'ten' is not a valid integer"
        );
    }

    #[test]
    fn test_not_a_schema() {
        let error = compile_str("<schema/>").unwrap_err();
        assert!(matches!(error, SchemaError::NotASchema(_)));
    }

    #[test]
    fn test_target_namespace_qualifies_globals() {
        let components = compile_str(&format!(
            r#"<xs:schema {XS} targetNamespace="urn:t" elementFormDefault="qualified">
                 <xs:element name="a" type="xs:int"/>
               </xs:schema>"#
        ))
        .unwrap();
        assert!(components
            .global_elements
            .contains_key(&ExpandedName::new("urn:t", "a")));
    }
}
