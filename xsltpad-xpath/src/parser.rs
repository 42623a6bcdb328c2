use logos::Span;

use crate::ast::{
    ArithmeticOperator, Axis, CompareOperator, Expr, NodeTest, PathExpr, PathStart, Step,
};
use crate::error::{Error, SpannedError};
use crate::lexer::{tokenize, Token};
use crate::name::{ExpandedName, Namespaces};
use crate::span::SourceSpan;

type Result<T> = std::result::Result<T, SpannedError>;

const NODE_TYPES: [&str; 4] = ["node", "text", "comment", "processing-instruction"];

/// Parse an XPath 1.0 expression, resolving prefixes against `namespaces`.
pub fn parse_expr(input: &str, namespaces: &Namespaces) -> Result<Expr> {
    let mut parser = Parser::new(input, namespaces)?;
    let expr = parser.expr()?;
    parser.expect_end()?;
    Ok(expr)
}

pub(crate) struct Parser<'a, 'n> {
    tokens: Vec<(Token<'a>, Span)>,
    position: usize,
    input_len: usize,
    namespaces: &'n Namespaces,
}

impl<'a, 'n> Parser<'a, 'n> {
    pub(crate) fn new(input: &'a str, namespaces: &'n Namespaces) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            position: 0,
            input_len: input.len(),
            namespaces,
        })
    }

    pub(crate) fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token<'a>> {
        self.tokens
            .get(self.position + offset)
            .map(|(token, _)| token)
    }

    pub(crate) fn peek_second(&self) -> Option<&Token<'a>> {
        self.peek_at(1)
    }

    pub(crate) fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.position).map(|(token, _)| token.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    pub(crate) fn at(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn at_name(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::NCName(n)) if *n == name)
    }

    /// The span of the current token, or an empty span at the end of input.
    pub(crate) fn span(&self) -> SourceSpan {
        match self.tokens.get(self.position) {
            Some((_, span)) => SourceSpan::from(span.clone()),
            None => SourceSpan::empty_at(self.input_len),
        }
    }

    pub(crate) fn error(&self) -> SpannedError {
        Error::XPST0003.with_span(self.span())
    }

    pub(crate) fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    pub(crate) fn expect_end(&self) -> Result<()> {
        if self.peek().is_none() {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    pub(crate) fn resolve(&self, qname: &str) -> Result<ExpandedName> {
        self.namespaces
            .resolve(qname)
            .ok_or_else(|| Error::XPST0081.with_span(self.previous_span()))
    }

    fn previous_span(&self) -> SourceSpan {
        match self.position.checked_sub(1).and_then(|p| self.tokens.get(p)) {
            Some((_, span)) => SourceSpan::from(span.clone()),
            None => SourceSpan::empty_at(0),
        }
    }

    pub(crate) fn expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.at_name("or") {
            self.next();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.equality_expr()?;
        while self.at_name("and") {
            self.next();
            let right = self.equality_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<Expr> {
        let mut left = self.relational_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Equal) => CompareOperator::Equal,
                Some(Token::NotEqual) => CompareOperator::NotEqual,
                _ => return Ok(left),
            };
            self.next();
            let right = self.relational_expr()?;
            left = Expr::Compare(operator, Box::new(left), Box::new(right));
        }
    }

    fn relational_expr(&mut self) -> Result<Expr> {
        let mut left = self.additive_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::LessThan) => CompareOperator::LessThan,
                Some(Token::LessThanEqual) => CompareOperator::LessThanEqual,
                Some(Token::GreaterThan) => CompareOperator::GreaterThan,
                Some(Token::GreaterThanEqual) => CompareOperator::GreaterThanEqual,
                _ => return Ok(left),
            };
            self.next();
            let right = self.additive_expr()?;
            left = Expr::Compare(operator, Box::new(left), Box::new(right));
        }
    }

    fn additive_expr(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => ArithmeticOperator::Add,
                Some(Token::Minus) => ArithmeticOperator::Subtract,
                _ => return Ok(left),
            };
            self.next();
            let right = self.multiplicative_expr()?;
            left = Expr::Arithmetic(operator, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative_expr(&mut self) -> Result<Expr> {
        let mut left = self.unary_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Star) => ArithmeticOperator::Multiply,
                Some(Token::NCName("div")) => ArithmeticOperator::Divide,
                Some(Token::NCName("mod")) => ArithmeticOperator::Modulo,
                _ => return Ok(left),
            };
            self.next();
            let right = self.unary_expr()?;
            left = Expr::Arithmetic(operator, Box::new(left), Box::new(right));
        }
    }

    fn unary_expr(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.unary_expr()?;
            Ok(Expr::Negate(Box::new(operand)))
        } else {
            self.union_expr()
        }
    }

    fn union_expr(&mut self) -> Result<Expr> {
        let mut left = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn at_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Dollar | Token::LeftParen | Token::Literal(_) | Token::Number(_)) => true,
            Some(Token::NCName(name)) => {
                self.peek_at(1) == Some(&Token::LeftParen) && !NODE_TYPES.contains(name)
            }
            Some(Token::QName(_)) => self.peek_at(1) == Some(&Token::LeftParen),
            _ => false,
        }
    }

    fn path_expr(&mut self) -> Result<Expr> {
        if !self.at_primary() {
            return Ok(Expr::Path(self.location_path()?));
        }
        let primary = self.primary_expr()?;
        let predicates = self.predicates()?;
        let filter = if predicates.is_empty() {
            primary
        } else {
            Expr::Filter(Box::new(primary), predicates)
        };
        let mut steps = Vec::new();
        if self.eat(&Token::Slash) {
            self.relative_location_path(&mut steps)?;
        } else if self.eat(&Token::DoubleSlash) {
            steps.push(Step::descendant_or_self());
            self.relative_location_path(&mut steps)?;
        } else {
            return Ok(filter);
        }
        Ok(Expr::Path(PathExpr {
            start: PathStart::Expr(Box::new(filter)),
            steps,
        }))
    }

    fn primary_expr(&mut self) -> Result<Expr> {
        let span = self.span();
        match self.next() {
            Some(Token::Dollar) => match self.next() {
                Some(Token::NCName(name) | Token::QName(name)) => {
                    Ok(Expr::Variable(self.resolve(name)?))
                }
                _ => Err(Error::XPST0003.with_span(span)),
            },
            Some(Token::LeftParen) => {
                let expr = self.expr()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }
            Some(Token::Literal(literal)) => Ok(Expr::Literal(literal.to_string())),
            Some(Token::Number(number)) => Ok(Expr::Number(number)),
            Some(Token::NCName(name) | Token::QName(name)) => {
                let name = self.resolve(name)?;
                self.expect(&Token::LeftParen)?;
                let arguments = self.arguments()?;
                Ok(Expr::FunctionCall(name, arguments))
            }
            _ => Err(Error::XPST0003.with_span(span)),
        }
    }

    // after the opening parenthesis
    pub(crate) fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut arguments = Vec::new();
        if self.eat(&Token::RightParen) {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.expr()?);
            if self.eat(&Token::RightParen) {
                return Ok(arguments);
            }
            self.expect(&Token::Comma)?;
        }
    }

    pub(crate) fn predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LeftBracket) {
            predicates.push(self.expr()?);
            self.expect(&Token::RightBracket)?;
        }
        Ok(predicates)
    }

    pub(crate) fn at_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::Star
                    | Token::NCName(_)
                    | Token::QName(_)
                    | Token::PrefixWildcard(_)
            )
        )
    }

    fn location_path(&mut self) -> Result<PathExpr> {
        let mut steps = Vec::new();
        if self.eat(&Token::Slash) {
            if self.at_step() {
                self.relative_location_path(&mut steps)?;
            }
            Ok(PathExpr {
                start: PathStart::Root,
                steps,
            })
        } else if self.eat(&Token::DoubleSlash) {
            steps.push(Step::descendant_or_self());
            self.relative_location_path(&mut steps)?;
            Ok(PathExpr {
                start: PathStart::Root,
                steps,
            })
        } else {
            self.relative_location_path(&mut steps)?;
            Ok(PathExpr {
                start: PathStart::Context,
                steps,
            })
        }
    }

    fn relative_location_path(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        steps.push(self.step()?);
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
            } else {
                return Ok(());
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::Self_,
                node_test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                node_test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if self.peek_at(1) == Some(&Token::DoubleColon) {
            let span = self.span();
            let axis = match self.next() {
                Some(Token::NCName(name)) => Axis::from_name(name),
                _ => None,
            };
            self.next();
            axis.ok_or_else(|| Error::XPST0003.with_span(span))?
        } else {
            Axis::Child
        };
        let node_test = self.node_test()?;
        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            node_test,
            predicates,
        })
    }

    pub(crate) fn node_test(&mut self) -> Result<NodeTest> {
        let span = self.span();
        match self.next() {
            Some(Token::Star) => Ok(NodeTest::Wildcard),
            Some(Token::PrefixWildcard(prefix)) => match self.namespaces.by_prefix(prefix) {
                Some(uri) => Ok(NodeTest::NamespaceWildcard(uri.to_string())),
                None => Err(Error::XPST0081.with_span(span)),
            },
            Some(Token::NCName(name)) if self.at(&Token::LeftParen) => {
                self.next();
                let node_test = match name {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    "processing-instruction" => {
                        let target = match self.peek() {
                            Some(Token::Literal(literal)) => Some(literal.to_string()),
                            _ => None,
                        };
                        if target.is_some() {
                            self.next();
                        }
                        NodeTest::ProcessingInstruction(target)
                    }
                    _ => return Err(Error::XPST0003.with_span(span)),
                };
                self.expect(&Token::RightParen)?;
                Ok(node_test)
            }
            Some(Token::NCName(name) | Token::QName(name)) => {
                Ok(NodeTest::Name(self.resolve(name)?))
            }
            _ => Err(Error::XPST0003.with_span(span)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Expr {
        let namespaces = Namespaces::from_pairs([("ex", "http://example.com")]);
        parse_expr(input, &namespaces).unwrap()
    }

    fn name(local: &str) -> NodeTest {
        NodeTest::Name(ExpandedName::local(local))
    }

    #[test]
    fn test_abbreviated_path() {
        assert_eq!(
            parse("//a/@b"),
            Expr::Path(PathExpr {
                start: PathStart::Root,
                steps: vec![
                    Step::descendant_or_self(),
                    Step {
                        axis: Axis::Child,
                        node_test: name("a"),
                        predicates: vec![],
                    },
                    Step {
                        axis: Axis::Attribute,
                        node_test: name("b"),
                        predicates: vec![],
                    },
                ],
            })
        );
    }

    #[test]
    fn test_star_is_multiply_after_operand() {
        let expr = parse("* * 2");
        match expr {
            Expr::Arithmetic(ArithmeticOperator::Multiply, left, right) => {
                assert!(matches!(*left, Expr::Path(_)));
                assert_eq!(*right, Expr::Number(2.0));
            }
            _ => panic!("unexpected {:?}", expr),
        }
    }

    #[test]
    fn test_operator_names_as_element_names() {
        let expr = parse("div div mod");
        match expr {
            Expr::Arithmetic(ArithmeticOperator::Divide, left, right) => {
                assert!(matches!(*left, Expr::Path(_)));
                assert!(matches!(*right, Expr::Path(_)));
            }
            _ => panic!("unexpected {:?}", expr),
        }
    }

    #[test]
    fn test_function_call_with_path() {
        let expr = parse("count(ex:item[1])");
        match expr {
            Expr::FunctionCall(function, arguments) => {
                assert_eq!(function, ExpandedName::local("count"));
                assert_eq!(arguments.len(), 1);
            }
            _ => panic!("unexpected {:?}", expr),
        }
    }

    #[test]
    fn test_filter_path() {
        let expr = parse("$nodes[2]/child::text()");
        match expr {
            Expr::Path(PathExpr {
                start: PathStart::Expr(start),
                steps,
            }) => {
                assert!(matches!(*start, Expr::Filter(_, _)));
                assert_eq!(steps[0].node_test, NodeTest::Text);
            }
            _ => panic!("unexpected {:?}", expr),
        }
    }

    #[test]
    fn test_unknown_prefix() {
        let error = parse_expr("nope:a", &Namespaces::new()).unwrap_err();
        assert_eq!(error.error, Error::XPST0081);
    }

    #[test]
    fn test_syntax_error_span() {
        let error = parse_expr("a[1", &Namespaces::new()).unwrap_err();
        assert_eq!(error.error, Error::XPST0003);
        assert_eq!(error.span, Some(SourceSpan::new(3, 3)));
    }

    #[test]
    fn test_unknown_axis() {
        let error = parse_expr("sideways::a", &Namespaces::new()).unwrap_err();
        assert_eq!(error.error, Error::XPST0003);
    }
}
