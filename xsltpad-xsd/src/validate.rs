//! Validation of a document against compiled components.

use std::cell::{Cell, RefCell};

use xot::{Node, SpanInfo, SpanInfoKey, Xot};
use xsltpad_xpath::{
    attribute_value, in_scope_namespaces, local_name, namespace_uri, qualified_name,
    string_value, ExpandedName,
};

use crate::model::{
    ComplexType, Components, Content, ElementId, Particle, ProcessContents, Term,
    TypeDefinition, TypeId,
};
use crate::xs::{XSI_NAMESPACE, XS_NAMESPACE};
use crate::ValidationMessage;

/// Content models that need more matching steps than this are reported
/// instead of matched.
const STEP_LIMIT: usize = 100_000;

pub(crate) struct Validation<'a> {
    components: &'a Components,
    xot: &'a Xot,
    source: Option<(&'a str, &'a SpanInfo)>,
    messages: Vec<ValidationMessage>,
}

impl<'a> Validation<'a> {
    pub(crate) fn new(
        components: &'a Components,
        xot: &'a Xot,
        source: Option<(&'a str, &'a SpanInfo)>,
    ) -> Self {
        Self {
            components,
            xot,
            source,
            messages: Vec::new(),
        }
    }

    pub(crate) fn run(mut self, root: Node) -> Vec<ValidationMessage> {
        let element = if self.xot.is_element(root) {
            Some(root)
        } else {
            self.xot.document_element(root).ok()
        };
        let Some(element) = element else {
            self.report(root, "The document has no root element.".to_string());
            return self.messages;
        };
        match self.components.global_elements.get(&self.name(element)) {
            Some(id) => self.element(element, *id),
            None => self.report(
                element,
                format!("The '{}' element is not declared.", self.display(element)),
            ),
        }
        self.messages
    }

    fn report(&mut self, node: Node, message: String) {
        let position = self.source.and_then(|(text, spans)| {
            spans
                .get(SpanInfoKey::ElementStart(node))
                .map(|span| line_column(text, span.start))
        });
        self.messages.push(ValidationMessage {
            message,
            line: position.map(|(line, _)| line),
            column: position.map(|(_, column)| column),
        });
    }

    fn name(&self, node: Node) -> ExpandedName {
        ExpandedName::new(namespace_uri(self.xot, node), local_name(self.xot, node))
    }

    fn display(&self, node: Node) -> String {
        qualified_name(self.xot, node)
    }

    fn type_label(&self, id: TypeId) -> Option<String> {
        let name = match self.components.type_definition(id) {
            TypeDefinition::Simple(simple) => simple.name.as_ref(),
            TypeDefinition::Complex(complex) => complex.name.as_ref(),
            TypeDefinition::Pending => None,
        }?;
        Some(if name.namespace == XS_NAMESPACE {
            format!("xs:{}", name.local)
        } else {
            name.to_string()
        })
    }

    fn element_children(&self, node: Node) -> Vec<Node> {
        self.xot
            .children(node)
            .filter(|child| self.xot.is_element(*child))
            .collect()
    }

    fn has_text(&self, node: Node) -> bool {
        self.xot.children(node).any(|child| {
            self.xot
                .text_str(child)
                .is_some_and(|text| !text.trim().is_empty())
        })
    }

    fn element(&mut self, node: Node, id: ElementId) {
        let declaration = self.components.element(id);
        let mut type_id = declaration.type_id;
        if let Some(qname) = attribute_value(self.xot, node, XSI_NAMESPACE, "type") {
            match self.resolve(node, qname) {
                Some(id) => type_id = id,
                None => {
                    self.report(
                        node,
                        format!("The type '{}' given by xsi:type is not declared.", qname.trim()),
                    );
                    return;
                }
            }
        }
        let nil = attribute_value(self.xot, node, XSI_NAMESPACE, "nil")
            .is_some_and(|nil| matches!(nil.trim(), "true" | "1"));
        if nil {
            if !declaration.nillable {
                self.report(
                    node,
                    format!("The '{}' element is not nillable.", self.display(node)),
                );
            } else if !self.element_children(node).is_empty() || self.has_text(node) {
                self.report(
                    node,
                    format!(
                        "The '{}' element is nil and must be empty.",
                        self.display(node)
                    ),
                );
            }
            return;
        }
        self.typed(
            node,
            type_id,
            declaration.default.as_deref(),
            declaration.fixed.as_deref(),
        );
    }

    fn resolve(&self, node: Node, qname: &str) -> Option<TypeId> {
        let qname = qname.trim();
        let (prefix, local) = qname.split_once(':').unwrap_or(("", qname));
        let namespace = in_scope_namespaces(self.xot, node)
            .into_iter()
            .find(|(bound, _)| bound == prefix)
            .map(|(_, uri)| uri)
            .unwrap_or_default();
        self.components
            .global_types
            .get(&ExpandedName::new(namespace, local))
            .copied()
    }

    fn typed(&mut self, node: Node, type_id: TypeId, default: Option<&str>, fixed: Option<&str>) {
        match self.components.type_definition(type_id) {
            TypeDefinition::Simple(_) => {
                self.undeclared_attributes(node);
                if self.element_children(node).is_empty() {
                    self.value(node, type_id, default, fixed);
                } else {
                    self.report(
                        node,
                        format!(
                            "The '{}' element cannot contain child elements because its type is simple.",
                            self.display(node)
                        ),
                    );
                }
            }
            TypeDefinition::Complex(complex) => {
                self.attributes(node, complex);
                match &complex.content {
                    Content::Empty => {
                        if !self.element_children(node).is_empty() || self.has_text(node) {
                            self.report(
                                node,
                                format!("The '{}' element must be empty.", self.display(node)),
                            );
                        }
                    }
                    Content::Simple(content) => {
                        if self.element_children(node).is_empty() {
                            self.value(node, *content, default, fixed);
                        } else {
                            self.report(
                                node,
                                format!(
                                    "The '{}' element cannot contain child elements.",
                                    self.display(node)
                                ),
                            );
                        }
                    }
                    Content::Elements { particle, mixed } => {
                        if !mixed && self.has_text(node) {
                            self.report(
                                node,
                                format!(
                                    "The '{}' element cannot contain text.",
                                    self.display(node)
                                ),
                            );
                        }
                        self.children(node, particle);
                    }
                    Content::Any => {
                        for child in self.element_children(node) {
                            self.lax(child);
                        }
                    }
                }
            }
            TypeDefinition::Pending => {}
        }
    }

    fn value(&mut self, node: Node, type_id: TypeId, default: Option<&str>, fixed: Option<&str>) {
        let mut text = string_value(self.xot, node);
        if text.is_empty() {
            if let Some(default) = default.or(fixed) {
                text = default.to_string();
            }
        }
        if let Err(reason) = self.components.check_simple(type_id, &text) {
            let message = match self.type_label(type_id) {
                Some(label) => format!(
                    "The '{}' element is not a valid {}: {}.",
                    self.display(node),
                    label,
                    reason
                ),
                None => format!("The '{}' element is invalid: {}.", self.display(node), reason),
            };
            self.report(node, message);
            return;
        }
        if let Some(fixed) = fixed {
            let white_space = self.components.white_space(type_id);
            if white_space.apply(&text) != white_space.apply(fixed) {
                self.report(
                    node,
                    format!(
                        "The value of the '{}' element must equal its fixed value '{}'.",
                        self.display(node),
                        fixed
                    ),
                );
            }
        }
    }

    fn attribute_list(&self, node: Node) -> Vec<(ExpandedName, String)> {
        let mut attributes = Vec::new();
        for attribute in self.xot.axis(xot::Axis::Attribute, node) {
            if let xot::Value::Attribute(attribute) = self.xot.value(attribute) {
                let (local, namespace) = self.xot.name_ns_str(attribute.name());
                if namespace != XSI_NAMESPACE {
                    attributes.push((
                        ExpandedName::new(namespace, local),
                        attribute.value().to_string(),
                    ));
                }
            }
        }
        attributes
    }

    fn undeclared_attributes(&mut self, node: Node) {
        for (name, _) in self.attribute_list(node) {
            self.report(node, format!("The '{}' attribute is not declared.", name));
        }
    }

    fn attributes(&mut self, node: Node, complex: &ComplexType) {
        let present = self.attribute_list(node);
        for (name, value) in &present {
            if let Some(attribute) = complex.attributes.iter().find(|a| &a.name == name) {
                self.attribute_value(node, name, value, attribute.type_id, attribute.fixed.as_deref());
                continue;
            }
            let wildcard = complex
                .any_attribute
                .as_ref()
                .filter(|wildcard| wildcard.allows(&name.namespace));
            let Some(wildcard) = wildcard else {
                self.report(node, format!("The '{}' attribute is not declared.", name));
                continue;
            };
            match (wildcard.process, self.components.global_attributes.get(name)) {
                (ProcessContents::Skip, _) => {}
                (_, Some(global)) => {
                    self.attribute_value(node, name, value, global.type_id, global.fixed.as_deref())
                }
                (ProcessContents::Strict, None) => {
                    self.report(node, format!("The '{}' attribute is not declared.", name))
                }
                (ProcessContents::Lax, None) => {}
            }
        }
        for attribute in &complex.attributes {
            if attribute.required && present.iter().all(|(name, _)| name != &attribute.name) {
                self.report(
                    node,
                    format!(
                        "The required attribute '{}' is missing from the '{}' element.",
                        attribute.name,
                        self.display(node)
                    ),
                );
            }
        }
    }

    fn attribute_value(
        &mut self,
        node: Node,
        name: &ExpandedName,
        value: &str,
        type_id: TypeId,
        fixed: Option<&str>,
    ) {
        if let Err(reason) = self.components.check_simple(type_id, value) {
            self.report(
                node,
                format!("The '{}' attribute is invalid: {}.", name, reason),
            );
            return;
        }
        if let Some(fixed) = fixed {
            let white_space = self.components.white_space(type_id);
            if white_space.apply(value) != white_space.apply(fixed) {
                self.report(
                    node,
                    format!(
                        "The value of the '{}' attribute must equal its fixed value '{}'.",
                        name, fixed
                    ),
                );
            }
        }
    }

    fn children(&mut self, node: Node, particle: &Particle) {
        let children = self.element_children(node);
        let names = children
            .iter()
            .map(|child| self.name(*child))
            .collect::<Vec<_>>();
        match Matcher::new(self.components, &names).run(particle) {
            Outcome::Matched(assigned) => {
                for (child, assigned) in children.into_iter().zip(assigned) {
                    match assigned {
                        Assigned::Element(id) => self.element(child, id),
                        Assigned::Wildcard(process) => self.wildcard(child, process),
                    }
                }
            }
            Outcome::Failed { position, expected } => {
                let expected = if expected.is_empty() {
                    String::new()
                } else {
                    format!(
                        " List of possible elements expected: {}.",
                        expected
                            .iter()
                            .map(|name| format!("'{}'", name))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
                match children.get(position) {
                    Some(child) => self.report(
                        *child,
                        format!(
                            "The element '{}' has invalid child element '{}'.{}",
                            self.display(node),
                            self.display(*child),
                            expected
                        ),
                    ),
                    None => self.report(
                        node,
                        format!(
                            "The element '{}' has incomplete content.{}",
                            self.display(node),
                            expected
                        ),
                    ),
                }
            }
            Outcome::TooComplex => self.report(
                node,
                format!(
                    "The content of the '{}' element is too complex to validate.",
                    self.display(node)
                ),
            ),
        }
    }

    fn wildcard(&mut self, node: Node, process: ProcessContents) {
        let declaration = self.components.global_elements.get(&self.name(node)).copied();
        match (process, declaration) {
            (ProcessContents::Skip, _) => {}
            (_, Some(id)) => self.element(node, id),
            (ProcessContents::Strict, None) => self.report(
                node,
                format!("The '{}' element is not declared.", self.display(node)),
            ),
            (ProcessContents::Lax, None) => self.lax(node),
        }
    }

    /// Validate what has a declaration, and look inside what hasn't.
    fn lax(&mut self, node: Node) {
        match self.components.global_elements.get(&self.name(node)) {
            Some(id) => self.element(node, *id),
            None => {
                for child in self.element_children(node) {
                    self.lax(child);
                }
            }
        }
    }
}

/// What a child element was matched by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assigned {
    Element(ElementId),
    Wildcard(ProcessContents),
}

#[derive(Debug, PartialEq)]
enum Outcome {
    Matched(Vec<Assigned>),
    /// No way to match was found. `position` is the furthest child any
    /// attempt got to, `expected` the element names that would have been
    /// accepted there.
    Failed {
        position: usize,
        expected: Vec<String>,
    },
    TooComplex,
}

type Continuation<'k> = dyn FnMut(usize, &mut Vec<Assigned>) -> bool + 'k;

/// Matches a sequence of child element names against a particle.
///
/// Every alternative is tried in turn: more occurrences of a repeated
/// particle before fewer, choices in order, and the members of an `all`
/// group in every order. The first complete match wins.
struct Matcher<'a> {
    components: &'a Components,
    names: &'a [ExpandedName],
    furthest: Cell<usize>,
    expected: RefCell<Vec<String>>,
    steps: Cell<usize>,
}

impl<'a> Matcher<'a> {
    fn new(components: &'a Components, names: &'a [ExpandedName]) -> Self {
        Self {
            components,
            names,
            furthest: Cell::new(0),
            expected: RefCell::new(Vec::new()),
            steps: Cell::new(0),
        }
    }

    fn run(self, particle: &Particle) -> Outcome {
        let mut assigned = Vec::new();
        let end = self.names.len();
        let matched = self.particle(particle, 0, &mut assigned, &mut |position, _| {
            self.reach(position);
            position == end
        });
        if matched {
            Outcome::Matched(assigned)
        } else if self.steps.get() > STEP_LIMIT {
            Outcome::TooComplex
        } else {
            Outcome::Failed {
                position: self.furthest.get(),
                expected: self.expected.into_inner(),
            }
        }
    }

    fn step(&self) -> bool {
        self.steps.set(self.steps.get() + 1);
        self.steps.get() <= STEP_LIMIT
    }

    fn reach(&self, position: usize) {
        if position > self.furthest.get() {
            self.furthest.set(position);
            self.expected.borrow_mut().clear();
        }
    }

    fn expect(&self, position: usize, name: String) {
        self.reach(position);
        if position == self.furthest.get() {
            let mut expected = self.expected.borrow_mut();
            if !expected.contains(&name) {
                expected.push(name);
            }
        }
    }

    fn particle(
        &self,
        particle: &Particle,
        position: usize,
        assigned: &mut Vec<Assigned>,
        k: &mut Continuation,
    ) -> bool {
        self.repeat(particle, 0, position, assigned, k)
    }

    fn repeat(
        &self,
        particle: &Particle,
        count: usize,
        position: usize,
        assigned: &mut Vec<Assigned>,
        k: &mut Continuation,
    ) -> bool {
        if !self.step() {
            return false;
        }
        if particle.max.map_or(true, |max| count < max) {
            let mark = assigned.len();
            // an occurrence that consumes nothing only counts towards the
            // minimum
            let matched = self.term(&particle.term, position, assigned, &mut |next, assigned| {
                (next > position || count < particle.min)
                    && self.repeat(particle, count + 1, next, assigned, k)
            });
            if matched {
                return true;
            }
            assigned.truncate(mark);
        }
        count >= particle.min && k(position, assigned)
    }

    fn term(
        &self,
        term: &Term,
        position: usize,
        assigned: &mut Vec<Assigned>,
        k: &mut Continuation,
    ) -> bool {
        match term {
            Term::Element(id) => {
                let declaration = self.components.element(*id);
                if self.names.get(position) != Some(&declaration.name) {
                    self.expect(position, declaration.name.local.clone());
                    return false;
                }
                self.consume(Assigned::Element(*id), position, assigned, k)
            }
            Term::Any(wildcard) => match self.names.get(position) {
                Some(name) if wildcard.allows(&name.namespace) => {
                    self.consume(Assigned::Wildcard(wildcard.process), position, assigned, k)
                }
                _ => {
                    self.reach(position);
                    false
                }
            },
            Term::Sequence(items) => self.sequence(items, position, assigned, k),
            Term::Choice(items) => {
                for item in items {
                    let mark = assigned.len();
                    if self.particle(item, position, assigned, k) {
                        return true;
                    }
                    assigned.truncate(mark);
                }
                false
            }
            Term::All(items) => {
                let mut used = vec![false; items.len()];
                self.all(items, &mut used, position, assigned, k)
            }
        }
    }

    fn consume(
        &self,
        matched: Assigned,
        position: usize,
        assigned: &mut Vec<Assigned>,
        k: &mut Continuation,
    ) -> bool {
        assigned.push(matched);
        if k(position + 1, assigned) {
            return true;
        }
        assigned.pop();
        false
    }

    fn sequence(
        &self,
        items: &[Particle],
        position: usize,
        assigned: &mut Vec<Assigned>,
        k: &mut Continuation,
    ) -> bool {
        match items.split_first() {
            None => k(position, assigned),
            Some((first, rest)) => self.particle(first, position, assigned, &mut |next, assigned| {
                self.sequence(rest, next, assigned, k)
            }),
        }
    }

    fn all(
        &self,
        items: &[Particle],
        used: &mut [bool],
        position: usize,
        assigned: &mut Vec<Assigned>,
        k: &mut Continuation,
    ) -> bool {
        if !self.step() {
            return false;
        }
        for (index, item) in items.iter().enumerate() {
            if used[index] {
                continue;
            }
            used[index] = true;
            let mark = assigned.len();
            let matched = self.term(&item.term, position, assigned, &mut |next, assigned| {
                next > position && self.all(items, used, next, assigned, k)
            });
            if matched {
                return true;
            }
            assigned.truncate(mark);
            used[index] = false;
        }
        let complete = items
            .iter()
            .zip(used.iter())
            .all(|(item, used)| *used || item.emptiable());
        complete && k(position, assigned)
    }
}

/// 1-based line and column of a byte offset.
pub(crate) fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |line| line.chars().count())
        + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementDeclaration, ANY_TYPE};

    fn components(names: &[&str]) -> Components {
        let mut components = Components::new();
        for name in names {
            components.elements.push(ElementDeclaration {
                name: ExpandedName::local(*name),
                type_id: ANY_TYPE,
                nillable: false,
                default: None,
                fixed: None,
            });
        }
        components
    }

    fn element(id: usize, min: usize, max: Option<usize>) -> Particle {
        Particle {
            min,
            max,
            term: Term::Element(ElementId(id)),
        }
    }

    fn run(components: &Components, particle: &Particle, children: &[&str]) -> Outcome {
        let names = children
            .iter()
            .map(|name| ExpandedName::local(*name))
            .collect::<Vec<_>>();
        Matcher::new(components, &names).run(particle)
    }

    #[test]
    fn test_greedy_repetition_backtracks() {
        // (a*, a): the star must give back the last a
        let components = components(&["a"]);
        let particle = Particle::once(Term::Sequence(vec![
            element(0, 0, None),
            element(0, 1, Some(1)),
        ]));
        let outcome = run(&components, &particle, &["a", "a", "a"]);
        assert_eq!(
            outcome,
            Outcome::Matched(vec![Assigned::Element(ElementId(0)); 3])
        );
    }

    #[test]
    fn test_choice_alternatives() {
        // ((a, b) | (a, c))
        let components = components(&["a", "b", "c"]);
        let particle = Particle::once(Term::Choice(vec![
            Particle::once(Term::Sequence(vec![element(0, 1, Some(1)), element(1, 1, Some(1))])),
            Particle::once(Term::Sequence(vec![element(0, 1, Some(1)), element(2, 1, Some(1))])),
        ]));
        assert!(matches!(
            run(&components, &particle, &["a", "c"]),
            Outcome::Matched(_)
        ));
    }

    #[test]
    fn test_unexpected_child() {
        let components = components(&["a", "b"]);
        let particle = Particle::once(Term::Sequence(vec![
            element(0, 1, Some(1)),
            element(1, 0, Some(1)),
        ]));
        assert_eq!(
            run(&components, &particle, &["a", "x"]),
            Outcome::Failed {
                position: 1,
                expected: vec!["b".to_string()]
            }
        );
    }

    #[test]
    fn test_too_many() {
        let components = components(&["a"]);
        let particle = Particle::once(Term::Sequence(vec![element(0, 1, Some(2))]));
        assert_eq!(
            run(&components, &particle, &["a", "a", "a"]),
            Outcome::Failed {
                position: 2,
                expected: vec![]
            }
        );
    }

    #[test]
    fn test_incomplete() {
        let components = components(&["a", "b"]);
        let particle = Particle::once(Term::Sequence(vec![
            element(0, 1, Some(1)),
            element(1, 1, Some(1)),
        ]));
        assert_eq!(
            run(&components, &particle, &["a"]),
            Outcome::Failed {
                position: 1,
                expected: vec!["b".to_string()]
            }
        );
    }

    #[test]
    fn test_all_in_any_order() {
        let components = components(&["a", "b", "c"]);
        let particle = Particle::once(Term::All(vec![
            element(0, 1, Some(1)),
            element(1, 1, Some(1)),
            element(2, 0, Some(1)),
        ]));
        assert!(matches!(
            run(&components, &particle, &["b", "a"]),
            Outcome::Matched(_)
        ));
        assert!(matches!(
            run(&components, &particle, &["c", "a"]),
            Outcome::Failed { .. }
        ));
    }

    #[test]
    fn test_nested_stars_terminate() {
        let components = components(&["a"]);
        let particle = Particle {
            min: 0,
            max: None,
            term: Term::Sequence(vec![element(0, 0, None)]),
        };
        assert!(matches!(
            run(&components, &particle, &["a", "a"]),
            Outcome::Matched(_)
        ));
    }

    #[test]
    fn test_line_column() {
        let text = "<a>\n  <b/>\n</a>";
        assert_eq!(line_column(text, 0), (1, 1));
        assert_eq!(line_column(text, 6), (2, 3));
        assert_eq!(line_column(text, 100), (3, 5));
    }
}
