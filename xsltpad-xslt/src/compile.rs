//! Compile stylesheet modules into a [`Program`].
//!
//! Modules are loaded first, so that every declaration knows its import
//! precedence: imported modules are compiled before the module importing
//! them and get a lower precedence, included modules share the precedence
//! of the module including them.

use std::str::FromStr;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use xot::{Node, SpanInfo, SpanInfoKey, Xot};
use xsltpad_xpath::{
    in_scope_namespaces, parse_expr, parse_pattern, Anchor, ExpandedName, Expr, Namespaces,
    NodeTest, PathStart, Pattern, Resolver, SourceSpan, SpannedError,
};

use crate::ast::{
    AttributeSet, Avt, AvtPart, Binding, BindingValue, Body, ComputedName, Expression, Global,
    Instruction, KeyDefinition, LiteralAttribute, LiteralElement, NumberInstruction, NumberLevel,
    Program, Rule, Sort, SpaceRule, Template,
};
use crate::avt::parse_avt;
use crate::error::{Error, Result};
use crate::format_number::DecimalFormat;
use crate::names::{DeclarationName, InstructionName, XSL_NAMESPACE};
use crate::output::{OutputMethod, OutputSettings};
use crate::priority::{default_priorities, default_priority_node_test};
use crate::whitespace::strip_stylesheet;

type CompileResult<T> = std::result::Result<T, SpannedError>;

// functions whose string literal arguments are QNames, with the argument
// position
const QNAME_ARGUMENTS: [(&str, usize); 5] = [
    ("element-available", 0),
    ("format-number", 2),
    ("function-available", 0),
    ("key", 0),
    ("system-property", 0),
];

struct Module {
    /// The href the module was included or imported with; `None` for the
    /// principal module.
    href: Option<String>,
    uri: Option<String>,
    span_info: SpanInfo,
}

struct Declaration {
    node: Node,
    module: usize,
    precedence: usize,
}

pub(crate) fn compile(text: &str, uri: Option<&str>, resolver: &dyn Resolver) -> Result<Program> {
    let mut compiler = Compiler::new(resolver);
    let (module, root) = compiler.parse_module(text, None, uri.map(str::to_string))?;
    if let Some(uri) = uri {
        compiler.loading.push(uri.to_string());
    }
    compiler.load(module, root)?;
    compiler.namespace_aliases()?;
    let declarations = std::mem::take(&mut compiler.declarations);
    for declaration in &declarations {
        compiler.module = declaration.module;
        compiler
            .declaration(declaration.node, declaration.precedence)
            .map_err(|error| compiler.wrap(declaration.module, error.into()))?;
    }
    Ok(compiler.finish(text, uri))
}

struct Compiler<'a> {
    xot: Xot,
    resolver: &'a dyn Resolver,
    modules: Vec<Module>,
    /// URIs of the modules being loaded, to detect cycles.
    loading: Vec<String>,
    declarations: Vec<Declaration>,
    next_precedence: usize,
    next_position: usize,
    /// stylesheet namespace URI to result (prefix, URI)
    aliases: HashMap<String, (String, String)>,
    module: usize,
    program: Program,
}

impl<'a> Compiler<'a> {
    fn new(resolver: &'a dyn Resolver) -> Self {
        Self {
            xot: Xot::new(),
            resolver,
            modules: Vec::new(),
            loading: Vec::new(),
            declarations: Vec::new(),
            next_precedence: 0,
            next_position: 0,
            aliases: HashMap::new(),
            module: 0,
            program: Program::default(),
        }
    }

    fn finish(mut self, text: &str, uri: Option<&str>) -> Program {
        self.program.rules.sort_by(|a, b| {
            b.precedence
                .cmp(&a.precedence)
                .then(b.priority.cmp(&a.priority))
                .then(b.position.cmp(&a.position))
        });
        self.program.text = text.to_string();
        self.program.uri = uri.map(str::to_string);
        self.program
    }

    fn wrap(&self, module: usize, error: Error) -> Error {
        match &self.modules[module].href {
            Some(href) => Error::Module {
                href: href.clone(),
                source: Box::new(error),
            },
            None => error,
        }
    }

    fn parse_module(
        &mut self,
        text: &str,
        href: Option<String>,
        uri: Option<String>,
    ) -> Result<(usize, Node)> {
        let document_name = href
            .clone()
            .or_else(|| uri.clone())
            .unwrap_or_else(|| "stylesheet".to_string());
        let (document, span_info) =
            self.xot
                .parse_with_span_info(text)
                .map_err(|source| Error::Xml {
                    document: document_name,
                    source,
                })?;
        strip_stylesheet(&mut self.xot, document);
        let module = self.modules.len();
        self.modules.push(Module {
            href,
            uri,
            span_info,
        });
        let root = self
            .xot
            .children(document)
            .find(|child| self.xot.is_element(*child))
            .ok_or_else(|| {
                self.wrap(
                    module,
                    Error::from(xsltpad_xpath::Error::XTSE0165.with_span(SourceSpan::new(0, 0))),
                )
            })?;
        Ok((module, root))
    }

    /// Load the module referenced by an xsl:include or xsl:import element.
    fn load_referenced(&mut self, module: usize, node: Node) -> Result<(usize, Node)> {
        self.module = module;
        let href = self
            .required(node, "href")
            .map_err(|error| self.wrap(module, error.into()))?;
        let base = self.modules[module].uri.clone();
        let loaded = self
            .resolver
            .load(&href, base.as_deref())
            .map_err(|source| {
                self.wrap(
                    module,
                    Error::Load {
                        href: href.clone(),
                        source,
                    },
                )
            })?;
        if self.loading.contains(&loaded.uri) {
            let span = self.value_span(node, "href");
            return Err(self.wrap(
                module,
                xsltpad_xpath::Error::XTSE0180.with_span(span).into(),
            ));
        }
        self.parse_module(&loaded.text, Some(href), Some(loaded.uri))
    }

    fn load(&mut self, module: usize, root: Node) -> Result<()> {
        let mut imports = Vec::new();
        let mut declarations = Vec::new();
        self.flatten(module, root, &mut imports, &mut declarations)?;
        for (importing, node) in imports {
            let (imported, imported_root) = self.load_referenced(importing, node)?;
            self.enter(imported);
            let result = self.load(imported, imported_root);
            self.loading.pop();
            result?;
        }
        let precedence = self.next_precedence;
        self.next_precedence += 1;
        for (module, node) in declarations {
            self.declarations.push(Declaration {
                node,
                module,
                precedence,
            });
        }
        Ok(())
    }

    fn enter(&mut self, module: usize) {
        let uri = self.modules[module].uri.clone().unwrap_or_default();
        self.loading.push(uri);
    }

    /// Collect the top-level elements of a module, inlining included
    /// modules and setting imports aside.
    fn flatten(
        &mut self,
        module: usize,
        root: Node,
        imports: &mut Vec<(usize, Node)>,
        declarations: &mut Vec<(usize, Node)>,
    ) -> Result<()> {
        let (namespace, local) = self.name(root);
        if namespace != XSL_NAMESPACE {
            // a literal result element used as a stylesheet
            if xsltpad_xpath::attribute_value(&self.xot, root, XSL_NAMESPACE, "version").is_none()
            {
                let span = self.span_in(module, root);
                return Err(self.wrap(
                    module,
                    xsltpad_xpath::Error::XTSE0150.with_span(span).into(),
                ));
            }
            declarations.push((module, root));
            return Ok(());
        }
        if local != "stylesheet" && local != "transform" {
            let span = self.span_in(module, root);
            return Err(self.wrap(
                module,
                xsltpad_xpath::Error::XTSE0010.with_span(span).into(),
            ));
        }
        let children: Vec<Node> = self
            .xot
            .children(root)
            .filter(|child| self.xot.is_element(*child))
            .collect();
        for child in children {
            let (namespace, local) = self.name(child);
            if namespace != XSL_NAMESPACE {
                // user-defined top-level elements are ignored
                continue;
            }
            match local.as_str() {
                "import" => imports.push((module, child)),
                "include" => {
                    let (included, included_root) = self.load_referenced(module, child)?;
                    self.enter(included);
                    let result = self.flatten(included, included_root, imports, declarations);
                    self.loading.pop();
                    result?;
                }
                _ => declarations.push((module, child)),
            }
        }
        Ok(())
    }

    fn namespace_aliases(&mut self) -> Result<()> {
        let mut aliases = Vec::new();
        for declaration in &self.declarations {
            let (namespace, local) = self.name(declaration.node);
            if namespace == XSL_NAMESPACE && local == "namespace-alias" {
                aliases.push((declaration.node, declaration.module));
            }
        }
        for (node, module) in aliases {
            self.module = module;
            self.namespace_alias(node)
                .map_err(|error| self.wrap(module, error.into()))?;
        }
        Ok(())
    }

    fn namespace_alias(&mut self, node: Node) -> CompileResult<()> {
        let stylesheet_prefix = self.required(node, "stylesheet-prefix")?;
        let result_prefix = self.required(node, "result-prefix")?;
        let stylesheet_uri = self.prefix_uri(node, "stylesheet-prefix", &stylesheet_prefix)?;
        let result_uri = self.prefix_uri(node, "result-prefix", &result_prefix)?;
        let result_prefix = if result_prefix == "#default" {
            String::new()
        } else {
            result_prefix
        };
        self.aliases
            .insert(stylesheet_uri, (result_prefix, result_uri));
        Ok(())
    }

    fn prefix_uri(&self, node: Node, attribute: &str, prefix: &str) -> CompileResult<String> {
        let prefix = if prefix == "#default" { "" } else { prefix };
        in_scope_namespaces(&self.xot, node)
            .into_iter()
            .find(|(bound, _)| bound == prefix)
            .map(|(_, uri)| uri)
            .or_else(|| prefix.is_empty().then(String::new))
            .ok_or_else(|| {
                xsltpad_xpath::Error::XPST0081.with_span(self.value_span(node, attribute))
            })
    }

    fn declaration(&mut self, node: Node, precedence: usize) -> CompileResult<()> {
        let (namespace, local) = self.name(node);
        if namespace != XSL_NAMESPACE {
            return self.simplified_stylesheet(node, precedence);
        }
        let name = DeclarationName::from_str(&local)
            .map_err(|_| xsltpad_xpath::Error::XTSE0010.with_span(self.span(node)))?;
        match name {
            DeclarationName::Template => self.template(node, precedence),
            DeclarationName::Variable => self.global(node, precedence, false),
            DeclarationName::Param => self.global(node, precedence, true),
            DeclarationName::Key => self.key(node),
            DeclarationName::AttributeSet => self.attribute_set(node),
            DeclarationName::DecimalFormat => self.decimal_format(node),
            DeclarationName::StripSpace => self.space(node, precedence, true),
            DeclarationName::PreserveSpace => self.space(node, precedence, false),
            DeclarationName::Output => self.output(node),
            // handled while loading
            DeclarationName::NamespaceAlias | DeclarationName::Import | DeclarationName::Include => {
                Ok(())
            }
        }
    }

    fn simplified_stylesheet(&mut self, node: Node, precedence: usize) -> CompileResult<()> {
        let body = vec![self.literal_element(node)?];
        let template = self.program.templates.len();
        self.program.templates.push(Template {
            params: Vec::new(),
            body,
            precedence,
        });
        let pattern = parse_pattern("/", &Namespaces::new())?;
        for (pattern, priority) in default_priorities(&pattern) {
            self.add_rule(pattern, None, priority, precedence, template);
        }
        Ok(())
    }

    fn add_rule(
        &mut self,
        pattern: Pattern,
        mode: Option<ExpandedName>,
        priority: rust_decimal::Decimal,
        precedence: usize,
        template: usize,
    ) {
        self.program.rules.push(Rule {
            pattern,
            mode,
            priority,
            precedence,
            position: self.next_position,
            template,
        });
        self.next_position += 1;
    }

    fn template(&mut self, node: Node, precedence: usize) -> CompileResult<()> {
        let pattern = self.pattern(node, "match")?;
        let name = self.qname(node, "name")?;
        if pattern.is_none() && name.is_none() {
            return Err(xsltpad_xpath::Error::XTSE0500.with_span(self.span(node)));
        }
        let priority = match self.attribute(node, "priority") {
            Some(priority) => Some(
                rust_decimal::Decimal::from_str(priority.trim()).map_err(|_| {
                    xsltpad_xpath::Error::XTSE0530.with_span(self.value_span(node, "priority"))
                })?,
            ),
            None => None,
        };
        let mode = self.qname(node, "mode")?;

        let children = self.children(node);
        let split = children
            .iter()
            .position(|child| !self.is_xsl(*child, "param"))
            .unwrap_or(children.len());
        let mut params: Vec<Binding> = Vec::new();
        for child in &children[..split] {
            let param = self.binding(*child)?;
            if params.iter().any(|existing| existing.name == param.name) {
                return Err(xsltpad_xpath::Error::XTSE0580.with_span(param.span));
            }
            params.push(param);
        }
        let body = self.sequence(&children[split..])?;

        let template = self.program.templates.len();
        self.program.templates.push(Template {
            params,
            body,
            precedence,
        });
        if let Some(name) = name {
            let duplicate = self
                .program
                .named_templates
                .get(&name)
                .is_some_and(|existing| self.program.templates[*existing].precedence == precedence);
            if duplicate {
                return Err(xsltpad_xpath::Error::XTSE0660.with_span(self.span(node)));
            }
            self.program.named_templates.insert(name, template);
        }
        if let Some(pattern) = pattern {
            for (alternative, default_priority) in default_priorities(&pattern) {
                self.add_rule(
                    alternative,
                    mode.clone(),
                    priority.unwrap_or(default_priority),
                    precedence,
                    template,
                );
            }
        }
        Ok(())
    }

    fn global(&mut self, node: Node, precedence: usize, is_param: bool) -> CompileResult<()> {
        let binding = self.binding(node)?;
        if let Some(existing) = self.program.globals.get(&binding.name) {
            if existing.precedence == precedence {
                return Err(xsltpad_xpath::Error::XTSE0630.with_span(binding.span));
            }
            if existing.precedence > precedence {
                return Ok(());
            }
        }
        self.program.globals.insert(
            binding.name.clone(),
            Global {
                binding,
                is_param,
                precedence,
            },
        );
        Ok(())
    }

    fn key(&mut self, node: Node) -> CompileResult<()> {
        let name = self.required_qname(node, "name")?;
        let pattern = self
            .pattern(node, "match")?
            .ok_or_else(|| self.missing(node))?;
        let use_ = self.required_expression(node, "use")?;
        self.program
            .keys
            .entry(name)
            .or_default()
            .push(KeyDefinition { pattern, use_ });
        Ok(())
    }

    fn attribute_set(&mut self, node: Node) -> CompileResult<()> {
        let name = self.required_qname(node, "name")?;
        let use_attribute_sets = self.qnames(node, "use-attribute-sets")?;
        let mut attributes = Vec::new();
        for child in self.children(node) {
            if !self.is_xsl(child, "attribute") {
                return Err(xsltpad_xpath::Error::XTSE0010.with_span(self.span(child)));
            }
            attributes.extend(self.instruction(InstructionName::Attribute, child)?);
        }
        self.program
            .attribute_sets
            .entry(name)
            .or_default()
            .push(AttributeSet {
                use_attribute_sets,
                attributes,
            });
        Ok(())
    }

    fn decimal_format(&mut self, node: Node) -> CompileResult<()> {
        let name = self.qname(node, "name")?;
        let default = DecimalFormat::default();
        let format = DecimalFormat {
            decimal_separator: self
                .char_attribute(node, "decimal-separator")?
                .unwrap_or(default.decimal_separator),
            grouping_separator: self
                .char_attribute(node, "grouping-separator")?
                .unwrap_or(default.grouping_separator),
            infinity: self.attribute(node, "infinity").unwrap_or(default.infinity),
            minus_sign: self
                .char_attribute(node, "minus-sign")?
                .unwrap_or(default.minus_sign),
            nan: self.attribute(node, "NaN").unwrap_or(default.nan),
            percent: self
                .char_attribute(node, "percent")?
                .unwrap_or(default.percent),
            per_mille: self
                .char_attribute(node, "per-mille")?
                .unwrap_or(default.per_mille),
            zero_digit: self
                .char_attribute(node, "zero-digit")?
                .unwrap_or(default.zero_digit),
            digit: self.char_attribute(node, "digit")?.unwrap_or(default.digit),
            pattern_separator: self
                .char_attribute(node, "pattern-separator")?
                .unwrap_or(default.pattern_separator),
        };
        self.program.decimal_formats.insert(name, format);
        Ok(())
    }

    fn space(&mut self, node: Node, precedence: usize, strip: bool) -> CompileResult<()> {
        let elements = self.required(node, "elements")?;
        let namespaces = self.namespaces(node);
        for token in elements.split_whitespace() {
            let test = if token == "*" {
                NodeTest::Wildcard
            } else if let Some(prefix) = token.strip_suffix(":*") {
                let uri = namespaces.by_prefix(prefix).ok_or_else(|| {
                    xsltpad_xpath::Error::XPST0081.with_span(self.value_span(node, "elements"))
                })?;
                NodeTest::NamespaceWildcard(uri.to_string())
            } else {
                NodeTest::Name(namespaces.resolve(token).ok_or_else(|| {
                    xsltpad_xpath::Error::XPST0081.with_span(self.value_span(node, "elements"))
                })?)
            };
            let priority = default_priority_node_test(&test);
            self.program.space_rules.push(SpaceRule {
                test,
                strip,
                precedence,
                priority,
            });
        }
        Ok(())
    }

    fn output(&mut self, node: Node) -> CompileResult<()> {
        let method = match self.attribute(node, "method").as_deref() {
            None => None,
            Some("xml") => Some(OutputMethod::Xml),
            Some("html") => Some(OutputMethod::Html),
            Some("text") => Some(OutputMethod::Text),
            // a vendor-specific method
            Some(method) if method.contains(':') => Some(OutputMethod::Xml),
            Some(_) => {
                return Err(xsltpad_xpath::Error::XTSE0020.with_span(self.value_span(node, "method")))
            }
        };
        let settings = OutputSettings {
            method,
            indent: self.boolean(node, "indent", false)?,
            omit_xml_declaration: self.boolean(node, "omit-xml-declaration", false)?,
            encoding: self.attribute(node, "encoding"),
            standalone: match self.attribute(node, "standalone") {
                Some(_) => Some(self.boolean(node, "standalone", false)?),
                None => None,
            },
            doctype_public: self.attribute(node, "doctype-public"),
            doctype_system: self.attribute(node, "doctype-system"),
            cdata_section_elements: self.qnames(node, "cdata-section-elements")?,
        };
        let specified: Vec<&str> = [
            "method",
            "indent",
            "omit-xml-declaration",
            "encoding",
            "standalone",
            "doctype-public",
            "doctype-system",
        ]
        .into_iter()
        .filter(|attribute| self.attribute(node, attribute).is_some())
        .collect();
        self.program.output.merge(settings, &specified);
        Ok(())
    }

    // template bodies

    fn sequence(&mut self, nodes: &[Node]) -> CompileResult<Body> {
        let mut body = Vec::new();
        for node in nodes {
            self.item(*node, &mut body)?;
        }
        Ok(body)
    }

    fn body(&mut self, node: Node) -> CompileResult<Body> {
        let children = self.children(node);
        self.sequence(&children)
    }

    fn item(&mut self, node: Node, body: &mut Body) -> CompileResult<()> {
        if let Some(text) = self.xot.text_str(node) {
            body.push(Instruction::Text(text.to_string()));
            return Ok(());
        }
        if !self.xot.is_element(node) {
            return Ok(());
        }
        let (namespace, local) = self.name(node);
        if namespace == XSL_NAMESPACE {
            match InstructionName::from_str(&local) {
                Ok(name) => body.extend(self.instruction(name, node)?),
                Err(_) => self.fallback(node, body, true)?,
            }
        } else if self
            .declared_namespaces(node, "extension-element-prefixes")
            .contains(&namespace)
        {
            self.fallback(node, body, false)?;
        } else {
            body.push(self.literal_element(node)?);
        }
        Ok(())
    }

    /// Compile the xsl:fallback children of an element we cannot run.
    fn fallback(&mut self, node: Node, body: &mut Body, required: bool) -> CompileResult<()> {
        let fallbacks: Vec<Node> = self
            .children(node)
            .into_iter()
            .filter(|child| self.is_xsl(*child, "fallback"))
            .collect();
        if fallbacks.is_empty() && required {
            return Err(xsltpad_xpath::Error::XTSE0010.with_span(self.span(node)));
        }
        for fallback in fallbacks {
            body.extend(self.body(fallback)?);
        }
        Ok(())
    }

    fn instruction(
        &mut self,
        name: InstructionName,
        node: Node,
    ) -> CompileResult<Option<Instruction>> {
        let span = self.span(node);
        let instruction = match name {
            InstructionName::ApplyTemplates => {
                let select = self.expression(node, "select")?;
                let mode = self.qname(node, "mode")?;
                let mut sorts = Vec::new();
                let mut params = Vec::new();
                for child in self.children(node) {
                    if self.is_xsl(child, "sort") {
                        sorts.push(self.sort(child)?);
                    } else if self.is_xsl(child, "with-param") {
                        params.push(self.binding(child)?);
                    } else {
                        return Err(xsltpad_xpath::Error::XTSE0010.with_span(self.span(child)));
                    }
                }
                Instruction::ApplyTemplates {
                    select,
                    mode,
                    sorts,
                    params,
                    span,
                }
            }
            InstructionName::ApplyImports => Instruction::ApplyImports { span },
            InstructionName::CallTemplate => {
                let name = self.required_qname(node, "name")?;
                let mut params = Vec::new();
                for child in self.children(node) {
                    if !self.is_xsl(child, "with-param") {
                        return Err(xsltpad_xpath::Error::XTSE0010.with_span(self.span(child)));
                    }
                    params.push(self.binding(child)?);
                }
                Instruction::CallTemplate { name, params, span }
            }
            InstructionName::ForEach => {
                let select = self.required_expression(node, "select")?;
                let children = self.children(node);
                let split = children
                    .iter()
                    .position(|child| !self.is_xsl(*child, "sort"))
                    .unwrap_or(children.len());
                let mut sorts = Vec::new();
                for child in &children[..split] {
                    sorts.push(self.sort(*child)?);
                }
                let body = self.sequence(&children[split..])?;
                Instruction::ForEach {
                    select,
                    sorts,
                    body,
                }
            }
            InstructionName::If => Instruction::If {
                test: self.required_expression(node, "test")?,
                body: self.body(node)?,
            },
            InstructionName::Choose => {
                let mut whens = Vec::new();
                let mut otherwise = None;
                for child in self.children(node) {
                    if self.is_xsl(child, "when") && otherwise.is_none() {
                        let test = self.required_expression(child, "test")?;
                        whens.push((test, self.body(child)?));
                    } else if self.is_xsl(child, "otherwise") && otherwise.is_none() {
                        otherwise = Some(self.body(child)?);
                    } else {
                        return Err(xsltpad_xpath::Error::XTSE0010.with_span(self.span(child)));
                    }
                }
                if whens.is_empty() {
                    return Err(xsltpad_xpath::Error::XTSE0010.with_span(span));
                }
                Instruction::Choose {
                    whens,
                    otherwise: otherwise.unwrap_or_default(),
                }
            }
            InstructionName::Variable => Instruction::Variable(self.binding(node)?),
            InstructionName::Message => Instruction::Message {
                body: self.body(node)?,
                terminate: self.boolean(node, "terminate", false)?,
                span,
            },
            InstructionName::ValueOf => Instruction::ValueOf {
                select: self.required_expression(node, "select")?,
            },
            InstructionName::Text => {
                Instruction::Text(xsltpad_xpath::string_value(&self.xot, node))
            }
            InstructionName::Copy => Instruction::Copy {
                use_attribute_sets: self.qnames(node, "use-attribute-sets")?,
                body: self.body(node)?,
                span,
            },
            InstructionName::CopyOf => Instruction::CopyOf {
                select: self.required_expression(node, "select")?,
            },
            InstructionName::Number => Instruction::Number(Box::new(self.number(node)?)),
            InstructionName::Element => Instruction::Element {
                name: Box::new(self.computed_name(node)?),
                use_attribute_sets: self.qnames(node, "use-attribute-sets")?,
                body: self.body(node)?,
                span,
            },
            InstructionName::Attribute => Instruction::Attribute {
                name: Box::new(self.computed_name(node)?),
                body: self.body(node)?,
                span,
            },
            InstructionName::Comment => Instruction::Comment {
                body: self.body(node)?,
            },
            InstructionName::ProcessingInstruction => Instruction::ProcessingInstruction {
                name: self.required_avt(node, "name")?,
                body: self.body(node)?,
                span,
            },
            // only runs in place of an instruction we don't know
            InstructionName::Fallback => return Ok(None),
        };
        Ok(Some(instruction))
    }

    fn binding(&mut self, node: Node) -> CompileResult<Binding> {
        let name = self.required_qname(node, "name")?;
        let span = self.span(node);
        let value = match self.expression(node, "select")? {
            Some(select) => BindingValue::Select(select),
            None if self.xot.first_child(node).is_some() => BindingValue::Content(self.body(node)?),
            None => BindingValue::Empty,
        };
        Ok(Binding { name, value, span })
    }

    fn sort(&mut self, node: Node) -> CompileResult<Sort> {
        let select = match self.expression(node, "select")? {
            Some(select) => select,
            None => self.parse_expression(".", self.span(node), &Namespaces::new())?,
        };
        Ok(Sort {
            select,
            data_type: self.avt(node, "data-type")?,
            order: self.avt(node, "order")?,
            case_order: self.avt(node, "case-order")?,
        })
    }

    fn number(&mut self, node: Node) -> CompileResult<NumberInstruction> {
        let level = match self.attribute(node, "level").as_deref() {
            None | Some("single") => NumberLevel::Single,
            Some("multiple") => NumberLevel::Multiple,
            Some("any") => NumberLevel::Any,
            Some(_) => {
                return Err(xsltpad_xpath::Error::XTSE0020.with_span(self.value_span(node, "level")))
            }
        };
        let span = self.span(node);
        let format = match self.avt(node, "format")? {
            Some(format) => format,
            None => Avt {
                parts: vec![AvtPart::Text("1".to_string())],
            },
        };
        Ok(NumberInstruction {
            level,
            count: self.pattern(node, "count")?,
            from: self.pattern(node, "from")?,
            value: self.expression(node, "value")?,
            format,
            grouping_separator: self.avt(node, "grouping-separator")?,
            grouping_size: self.avt(node, "grouping-size")?,
            span,
        })
    }

    fn computed_name(&mut self, node: Node) -> CompileResult<ComputedName> {
        let default_namespace = in_scope_namespaces(&self.xot, node)
            .into_iter()
            .find(|(prefix, _)| prefix.is_empty())
            .map(|(_, uri)| uri)
            .unwrap_or_default();
        Ok(ComputedName {
            name: self.required_avt(node, "name")?,
            namespace: self.avt(node, "namespace")?,
            namespaces: self.namespaces(node),
            default_namespace,
        })
    }

    fn literal_element(&mut self, node: Node) -> CompileResult<Instruction> {
        let span = self.span(node);
        let (namespace, local) = self.name(node);
        let in_scope = in_scope_namespaces(&self.xot, node);
        let (namespace, prefix) = self.alias(&namespace, prefix_for(&in_scope, &namespace, true));
        let name = ExpandedName::new(namespace, local);

        let excluded = self.excluded_namespaces(node);
        let namespaces = in_scope
            .iter()
            .filter(|(_, uri)| !excluded.contains(uri))
            .map(|(prefix, uri)| self.alias(uri, prefix.clone()))
            .map(|(uri, prefix)| (prefix, uri))
            .collect();

        let expression_namespaces = self.namespaces(node);
        let mut attributes = Vec::new();
        let attribute_nodes: Vec<Node> = self.xot.axis(xot::Axis::Attribute, node).collect();
        for attribute in attribute_nodes {
            let (name_id, value) = match self.xot.value(attribute) {
                xot::Value::Attribute(value) => (value.name(), value.value().to_string()),
                _ => continue,
            };
            let (local, namespace) = self.xot.name_ns_str(name_id);
            if namespace == XSL_NAMESPACE {
                continue;
            }
            let (namespace, local) = (namespace.to_string(), local.to_string());
            let span = self
                .modules[self.module]
                .span_info
                .get(SpanInfoKey::AttributeValue(node, name_id))
                .map(|span| SourceSpan::new(span.start, span.end))
                .unwrap_or_else(|| self.span(node));
            let value = parse_avt(&value, span, &expression_namespaces)?;
            let (namespace, prefix) = self.alias(&namespace, prefix_for(&in_scope, &namespace, false));
            attributes.push(LiteralAttribute {
                name: ExpandedName::new(namespace, local),
                prefix,
                value,
            });
        }

        let use_attribute_sets = match xsltpad_xpath::attribute_value(
            &self.xot,
            node,
            XSL_NAMESPACE,
            "use-attribute-sets",
        ) {
            Some(value) => value
                .split_whitespace()
                .map(|name| {
                    expression_namespaces
                        .resolve(name)
                        .ok_or_else(|| xsltpad_xpath::Error::XPST0081.with_span(span))
                })
                .collect::<CompileResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Instruction::LiteralElement(Box::new(LiteralElement {
            name,
            prefix,
            namespaces,
            attributes,
            use_attribute_sets,
            body: self.body(node)?,
            span,
        })))
    }

    /// Apply xsl:namespace-alias to a namespace and its prefix.
    fn alias(&self, namespace: &str, prefix: String) -> (String, String) {
        match self.aliases.get(namespace) {
            Some((result_prefix, result_uri)) => (result_uri.clone(), result_prefix.clone()),
            None => (namespace.to_string(), prefix),
        }
    }

    /// Namespaces that aren't copied to the result by literal result
    /// elements.
    fn excluded_namespaces(&self, node: Node) -> HashSet<String> {
        let mut excluded = self.declared_namespaces(node, "exclude-result-prefixes");
        excluded.extend(self.declared_namespaces(node, "extension-element-prefixes"));
        excluded.insert(XSL_NAMESPACE.to_string());
        excluded
    }

    /// The namespaces listed by exclude-result-prefixes or
    /// extension-element-prefixes on a node and its ancestors.
    fn declared_namespaces(&self, node: Node, attribute: &str) -> HashSet<String> {
        let mut namespaces = HashSet::new();
        for ancestor in self.xot.axis(xot::Axis::AncestorOrSelf, node) {
            if !self.xot.is_element(ancestor) {
                continue;
            }
            let (namespace, local) = self.name(ancestor);
            let prefixes = if namespace == XSL_NAMESPACE {
                if local != "stylesheet" && local != "transform" {
                    continue;
                }
                xsltpad_xpath::attribute_value(&self.xot, ancestor, "", attribute)
            } else {
                xsltpad_xpath::attribute_value(&self.xot, ancestor, XSL_NAMESPACE, attribute)
            };
            let prefixes = match prefixes {
                Some(prefixes) => prefixes,
                None => continue,
            };
            let in_scope = in_scope_namespaces(&self.xot, ancestor);
            for prefix in prefixes.split_whitespace() {
                match prefix {
                    "#all" => namespaces.extend(in_scope.iter().map(|(_, uri)| uri.clone())),
                    "#default" => namespaces.extend(
                        in_scope
                            .iter()
                            .filter(|(bound, _)| bound.is_empty())
                            .map(|(_, uri)| uri.clone()),
                    ),
                    prefix => namespaces.extend(
                        in_scope
                            .iter()
                            .filter(|(bound, _)| bound == prefix)
                            .map(|(_, uri)| uri.clone()),
                    ),
                }
            }
        }
        namespaces
    }

    // attributes and spans

    fn name(&self, node: Node) -> (String, String) {
        match xsltpad_xpath::name_parts(&self.xot, node) {
            Some((namespace, local)) => (namespace.to_string(), local.to_string()),
            None => (String::new(), String::new()),
        }
    }

    fn is_xsl(&self, node: Node, local: &str) -> bool {
        let (namespace, name) = self.name(node);
        namespace == XSL_NAMESPACE && name == local
    }

    /// Element and text children; the stylesheet has no other children
    /// left after whitespace stripping.
    fn children(&self, node: Node) -> Vec<Node> {
        self.xot
            .children(node)
            .filter(|child| self.xot.is_element(*child) || self.xot.is_text(*child))
            .collect()
    }

    fn span_in(&self, module: usize, node: Node) -> SourceSpan {
        self.modules[module]
            .span_info
            .get(SpanInfoKey::ElementStart(node))
            .map(|span| SourceSpan::new(span.start, span.end))
            .unwrap_or_else(|| SourceSpan::new(0, 0))
    }

    fn span(&self, node: Node) -> SourceSpan {
        self.span_in(self.module, node)
    }

    fn value_span(&self, node: Node, local: &str) -> SourceSpan {
        self.xot
            .name(local)
            .and_then(|name| {
                self.modules[self.module]
                    .span_info
                    .get(SpanInfoKey::AttributeValue(node, name))
            })
            .map(|span| SourceSpan::new(span.start, span.end))
            .unwrap_or_else(|| self.span(node))
    }

    fn attribute(&self, node: Node, local: &str) -> Option<String> {
        xsltpad_xpath::attribute_value(&self.xot, node, "", local).map(str::to_string)
    }

    fn missing(&self, node: Node) -> SpannedError {
        xsltpad_xpath::Error::XTSE0010.with_span(self.span(node))
    }

    fn required(&self, node: Node, local: &str) -> CompileResult<String> {
        self.attribute(node, local).ok_or_else(|| self.missing(node))
    }

    fn namespaces(&self, node: Node) -> Namespaces {
        let mut namespaces = Namespaces::new();
        for (prefix, uri) in in_scope_namespaces(&self.xot, node) {
            namespaces.add(&prefix, &uri);
        }
        namespaces
    }

    fn parse_expression(
        &self,
        value: &str,
        span: SourceSpan,
        namespaces: &Namespaces,
    ) -> CompileResult<Expression> {
        let start = span.range().start;
        let mut expr = parse_expr(value, namespaces).map_err(|error| SpannedError {
            error: error.error,
            span: error.span.map(|s| s.offset(start)),
        })?;
        resolve_name_arguments(&mut expr, namespaces).map_err(|error| error.with_span(span))?;
        Ok(Expression { expr, span })
    }

    fn expression(&self, node: Node, local: &str) -> CompileResult<Option<Expression>> {
        match self.attribute(node, local) {
            Some(value) => {
                let span = self.value_span(node, local);
                Ok(Some(self.parse_expression(
                    &value,
                    span,
                    &self.namespaces(node),
                )?))
            }
            None => Ok(None),
        }
    }

    fn required_expression(&self, node: Node, local: &str) -> CompileResult<Expression> {
        self.expression(node, local)?
            .ok_or_else(|| self.missing(node))
    }

    fn pattern(&self, node: Node, local: &str) -> CompileResult<Option<Pattern>> {
        let value = match self.attribute(node, local) {
            Some(value) => value,
            None => return Ok(None),
        };
        let span = self.value_span(node, local);
        let namespaces = self.namespaces(node);
        let start = span.range().start;
        let mut pattern = parse_pattern(&value, &namespaces).map_err(|error| SpannedError {
            error: error.error,
            span: error.span.map(|s| s.offset(start)),
        })?;
        for alternative in &mut pattern.alternatives {
            if let Anchor::Function(expr) = &mut alternative.anchor {
                resolve_name_arguments(expr, &namespaces).map_err(|error| error.with_span(span))?;
            }
            for step in &mut alternative.steps {
                for predicate in &mut step.predicates {
                    resolve_name_arguments(predicate, &namespaces)
                        .map_err(|error| error.with_span(span))?;
                }
            }
        }
        Ok(Some(pattern))
    }

    fn avt(&self, node: Node, local: &str) -> CompileResult<Option<Avt>> {
        match self.attribute(node, local) {
            Some(value) => {
                let span = self.value_span(node, local);
                Ok(Some(parse_avt(&value, span, &self.namespaces(node))?))
            }
            None => Ok(None),
        }
    }

    fn required_avt(&self, node: Node, local: &str) -> CompileResult<Avt> {
        self.avt(node, local)?.ok_or_else(|| self.missing(node))
    }

    fn qname(&self, node: Node, local: &str) -> CompileResult<Option<ExpandedName>> {
        match self.attribute(node, local) {
            Some(value) => {
                let span = self.value_span(node, local);
                let value = value.trim();
                if !is_qname(value) {
                    return Err(xsltpad_xpath::Error::XTSE0020.with_span(span));
                }
                self.namespaces(node)
                    .resolve(value)
                    .map(Some)
                    .ok_or_else(|| xsltpad_xpath::Error::XPST0081.with_span(span))
            }
            None => Ok(None),
        }
    }

    fn required_qname(&self, node: Node, local: &str) -> CompileResult<ExpandedName> {
        self.qname(node, local)?.ok_or_else(|| self.missing(node))
    }

    fn qnames(&self, node: Node, local: &str) -> CompileResult<Vec<ExpandedName>> {
        let value = match self.attribute(node, local) {
            Some(value) => value,
            None => return Ok(Vec::new()),
        };
        let namespaces = self.namespaces(node);
        value
            .split_whitespace()
            .map(|name| {
                namespaces.resolve(name).ok_or_else(|| {
                    xsltpad_xpath::Error::XPST0081.with_span(self.value_span(node, local))
                })
            })
            .collect()
    }

    fn boolean(&self, node: Node, local: &str, default: bool) -> CompileResult<bool> {
        match self.attribute(node, local).as_deref().map(str::trim) {
            None => Ok(default),
            Some("yes") => Ok(true),
            Some("no") => Ok(false),
            Some(_) => Err(xsltpad_xpath::Error::XTSE0020.with_span(self.value_span(node, local))),
        }
    }

    fn char_attribute(&self, node: Node, local: &str) -> CompileResult<Option<char>> {
        match self.attribute(node, local) {
            None => Ok(None),
            Some(value) => {
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Some(c)),
                    _ => Err(xsltpad_xpath::Error::XTSE0020.with_span(self.value_span(node, local))),
                }
            }
        }
    }
}

/// The prefix a namespace is bound to. Attributes never use the default
/// namespace.
fn prefix_for(in_scope: &[(String, String)], namespace: &str, allow_default: bool) -> String {
    if namespace.is_empty() {
        return String::new();
    }
    if allow_default
        && in_scope
            .iter()
            .any(|(prefix, uri)| prefix.is_empty() && uri == namespace)
    {
        return String::new();
    }
    in_scope
        .iter()
        .find(|(prefix, uri)| !prefix.is_empty() && uri == namespace)
        .map(|(prefix, _)| prefix.clone())
        .unwrap_or_default()
}

pub(crate) fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | '\u{B7}'))
}

pub(crate) fn is_qname(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(s),
    }
}

/// Resolve string literals naming keys, decimal formats and the like
/// against the namespaces in scope, rewriting them to `Q{uri}local`.
fn resolve_name_arguments(
    expr: &mut Expr,
    namespaces: &Namespaces,
) -> std::result::Result<(), xsltpad_xpath::Error> {
    match expr {
        Expr::Or(left, right)
        | Expr::And(left, right)
        | Expr::Compare(_, left, right)
        | Expr::Arithmetic(_, left, right)
        | Expr::Union(left, right) => {
            resolve_name_arguments(left, namespaces)?;
            resolve_name_arguments(right, namespaces)
        }
        Expr::Negate(operand) => resolve_name_arguments(operand, namespaces),
        Expr::Filter(primary, predicates) => {
            resolve_name_arguments(primary, namespaces)?;
            for predicate in predicates {
                resolve_name_arguments(predicate, namespaces)?;
            }
            Ok(())
        }
        Expr::Path(path) => {
            if let PathStart::Expr(start) = &mut path.start {
                resolve_name_arguments(start, namespaces)?;
            }
            for step in &mut path.steps {
                for predicate in &mut step.predicates {
                    resolve_name_arguments(predicate, namespaces)?;
                }
            }
            Ok(())
        }
        Expr::FunctionCall(name, arguments) => {
            for argument in arguments.iter_mut() {
                resolve_name_arguments(argument, namespaces)?;
            }
            if name.has_namespace() {
                return Ok(());
            }
            let position = QNAME_ARGUMENTS
                .iter()
                .find(|(function, _)| *function == name.local)
                .map(|(_, position)| *position);
            if let Some(Expr::Literal(literal)) = position.and_then(|p| arguments.get_mut(p)) {
                let resolved = namespaces
                    .resolve(literal.trim())
                    .ok_or(xsltpad_xpath::Error::XPST0081)?;
                *literal = if resolved.has_namespace() {
                    format!("Q{{{}}}{}", resolved.namespace, resolved.local)
                } else {
                    resolved.local
                };
            }
            Ok(())
        }
        Expr::Literal(_) | Expr::Number(_) | Expr::Variable(_) => Ok(()),
    }
}

/// Parse a name produced by [`resolve_name_arguments`], or an unprefixed
/// name computed at runtime.
pub(crate) fn parse_name_argument(
    s: &str,
) -> std::result::Result<ExpandedName, xsltpad_xpath::Error> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("Q{") {
        let (namespace, local) = rest
            .split_once('}')
            .ok_or(xsltpad_xpath::Error::XTDE1260)?;
        return Ok(ExpandedName::new(namespace, local));
    }
    if s.contains(':') {
        // a prefix we can no longer resolve
        return Err(xsltpad_xpath::Error::XPST0081);
    }
    Ok(ExpandedName::local(s))
}

#[cfg(test)]
mod tests {
    use xsltpad_xpath::{Error as XPathError, NoResolver};

    use super::*;

    const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

    fn stylesheet(body: &str) -> String {
        format!(r#"<xsl:stylesheet version="1.0" {}>{}</xsl:stylesheet>"#, XSL, body)
    }

    fn compile_str(text: &str) -> Result<Program> {
        compile(text, None, &NoResolver)
    }

    fn error_code(text: &str) -> XPathError {
        match compile_str(text) {
            Err(Error::Spanned(error)) => error.error,
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let program = compile_str(&stylesheet(
            r#"<xsl:template match="*"/><xsl:template match="a"/><xsl:template match="a[1]"/>"#,
        ))
        .unwrap();
        let templates: Vec<usize> = program.rules.iter().map(|rule| rule.template).collect();
        assert_eq!(templates, vec![2, 1, 0]);
    }

    #[test]
    fn test_union_pattern_becomes_rules() {
        let program =
            compile_str(&stylesheet(r#"<xsl:template match="a | b/c" mode="m"/>"#)).unwrap();
        assert_eq!(program.rules.len(), 2);
        assert!(program
            .rules
            .iter()
            .all(|rule| rule.mode == Some(ExpandedName::local("m"))));
    }

    #[test]
    fn test_simplified_stylesheet() {
        let program = compile_str(&format!(
            r#"<html xsl:version="1.0" {}><xsl:value-of select="/a"/></html>"#,
            XSL
        ))
        .unwrap();
        assert_eq!(program.rules.len(), 1);
        assert_eq!(program.templates.len(), 1);
    }

    #[test]
    fn test_simplified_stylesheet_needs_version() {
        assert_eq!(
            error_code(&format!(r#"<html {}/>"#, XSL)),
            XPathError::XTSE0150
        );
    }

    #[test]
    fn test_template_needs_match_or_name() {
        assert_eq!(
            error_code(&stylesheet("<xsl:template/>")),
            XPathError::XTSE0500
        );
    }

    #[test]
    fn test_duplicate_param() {
        assert_eq!(
            error_code(&stylesheet(
                r#"<xsl:template name="t"><xsl:param name="a"/><xsl:param name="a"/></xsl:template>"#
            )),
            XPathError::XTSE0580
        );
    }

    #[test]
    fn test_duplicate_global() {
        assert_eq!(
            error_code(&stylesheet(
                r#"<xsl:variable name="a"/><xsl:param name="a"/>"#
            )),
            XPathError::XTSE0630
        );
    }

    #[test]
    fn test_unknown_instruction() {
        assert_eq!(
            error_code(&stylesheet(
                r#"<xsl:template match="/"><xsl:frobnicate/></xsl:template>"#
            )),
            XPathError::XTSE0010
        );
    }

    #[test]
    fn test_unknown_instruction_with_fallback() {
        let program = compile_str(&stylesheet(
            r#"<xsl:template match="/"><xsl:frobnicate><xsl:fallback>x</xsl:fallback></xsl:frobnicate></xsl:template>"#,
        ))
        .unwrap();
        assert_eq!(program.templates[0].body.len(), 1);
    }

    #[test]
    fn test_expression_error_span() {
        let text = stylesheet(r#"<xsl:template match="/"><xsl:value-of select="1 +"/></xsl:template>"#);
        let offset = text.find("1 +").unwrap();
        match compile_str(&text) {
            Err(Error::Spanned(error)) => {
                assert_eq!(error.error, XPathError::XPST0003);
                assert_eq!(error.span, Some(SourceSpan::new(offset + 3, offset + 3)));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_not_well_formed() {
        assert!(matches!(
            compile_str("<xsl:stylesheet"),
            Err(Error::Xml { .. })
        ));
    }

    #[test]
    fn test_name_arguments_resolved() {
        let mut expr = parse_expr(
            "key('ex:k', 1)",
            &Namespaces::from_pairs([("ex", "urn:ex")]),
        )
        .unwrap();
        resolve_name_arguments(&mut expr, &Namespaces::from_pairs([("ex", "urn:ex")])).unwrap();
        match expr {
            Expr::FunctionCall(_, arguments) => {
                assert_eq!(arguments[0], Expr::Literal("Q{urn:ex}k".to_string()))
            }
            _ => panic!("unexpected {:?}", expr),
        }
        assert_eq!(
            parse_name_argument("Q{urn:ex}k"),
            Ok(ExpandedName::new("urn:ex", "k"))
        );
        assert_eq!(parse_name_argument("k"), Ok(ExpandedName::local("k")));
    }

    #[test]
    fn test_excluded_namespaces() {
        let program = compile_str(&format!(
            r#"<xsl:stylesheet version="1.0" {} xmlns:a="urn:a" xmlns:b="urn:b" exclude-result-prefixes="a"><xsl:template match="/"><out/></xsl:template></xsl:stylesheet>"#,
            XSL
        ))
        .unwrap();
        match &program.templates[0].body[0] {
            Instruction::LiteralElement(element) => {
                let uris: Vec<&str> = element
                    .namespaces
                    .iter()
                    .map(|(_, uri)| uri.as_str())
                    .collect();
                assert_eq!(uris, vec!["urn:b"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_qname_helpers() {
        assert!(is_qname("a:b"));
        assert!(is_qname("foo-bar"));
        assert!(!is_qname("1a"));
        assert!(!is_qname("a:b:c"));
        assert!(!is_qname(""));
    }
}
