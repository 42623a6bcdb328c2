use xot::{Node, Xot};

use crate::ast::{ArithmeticOperator, Axis, CompareOperator, Expr, NodeTest, PathStart, Step};
use crate::context::{Context, Host};
use crate::error::{Error, Result};
use crate::functions;
use crate::node::{self, NodeKind};
use crate::value::Value;

pub fn evaluate(expr: &Expr, context: &Context, host: &mut dyn Host) -> Result<Value> {
    match expr {
        Expr::Or(left, right) => {
            if evaluate(left, context, host)?.to_boolean() {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(evaluate(right, context, host)?.to_boolean()))
        }
        Expr::And(left, right) => {
            if !evaluate(left, context, host)?.to_boolean() {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(evaluate(right, context, host)?.to_boolean()))
        }
        Expr::Compare(operator, left, right) => {
            let left = evaluate(left, context, host)?;
            let right = evaluate(right, context, host)?;
            Ok(Value::Boolean(compare(
                *operator,
                &left,
                &right,
                host.xot(),
            )))
        }
        Expr::Arithmetic(operator, left, right) => {
            let left = evaluate(left, context, host)?.to_number(host.xot());
            let right = evaluate(right, context, host)?.to_number(host.xot());
            Ok(Value::Number(match operator {
                ArithmeticOperator::Add => left + right,
                ArithmeticOperator::Subtract => left - right,
                ArithmeticOperator::Multiply => left * right,
                ArithmeticOperator::Divide => left / right,
                // truncating remainder, like XPath's mod
                ArithmeticOperator::Modulo => left % right,
            }))
        }
        Expr::Negate(operand) => Ok(Value::Number(
            -evaluate(operand, context, host)?.to_number(host.xot()),
        )),
        Expr::Union(left, right) => {
            let mut nodes = evaluate(left, context, host)?.into_nodes()?;
            nodes.extend(evaluate(right, context, host)?.into_nodes()?);
            sort_nodes(host, &mut nodes);
            Ok(Value::NodeSet(nodes))
        }
        Expr::Filter(primary, predicates) => {
            let nodes = evaluate(primary, context, host)?.into_nodes()?;
            Ok(Value::NodeSet(apply_predicates(predicates, nodes, host)?))
        }
        Expr::Path(path) => {
            let mut nodes = match &path.start {
                PathStart::Root => vec![node::root(host.xot(), context.node)],
                PathStart::Context => vec![context.node],
                PathStart::Expr(expr) => evaluate(expr, context, host)?.into_nodes()?,
            };
            for step in &path.steps {
                let mut selected = Vec::new();
                for node in nodes {
                    selected.extend(evaluate_step(step, node, host)?);
                }
                sort_nodes(host, &mut selected);
                nodes = selected;
            }
            Ok(Value::NodeSet(nodes))
        }
        Expr::Literal(literal) => Ok(Value::String(literal.clone())),
        Expr::Number(number) => Ok(Value::Number(*number)),
        Expr::Variable(name) => host.variable(name),
        Expr::FunctionCall(name, arguments) => {
            let mut values = Vec::with_capacity(arguments.len());
            for argument in arguments {
                values.push(evaluate(argument, context, host)?);
            }
            if !name.has_namespace() && functions::is_core_function(&name.local) {
                return functions::call(&name.local, values, context, host);
            }
            host.function(name, values, context)
                .unwrap_or(Err(Error::XPST0017))
        }
    }
}

/// Evaluate an expression that must produce a node-set.
pub fn evaluate_nodes(expr: &Expr, context: &Context, host: &mut dyn Host) -> Result<Vec<Node>> {
    evaluate(expr, context, host)?.into_nodes()
}

pub(crate) fn sort_nodes(host: &dyn Host, nodes: &mut Vec<Node>) {
    host.document_order().sort(host.xot(), nodes);
}

fn evaluate_step(step: &Step, node: Node, host: &mut dyn Host) -> Result<Vec<Node>> {
    let candidates = axis_nodes(host, step.axis, node)
        .into_iter()
        .filter(|candidate| matches_node_test(host.xot(), &step.node_test, step.axis, *candidate))
        .collect();
    apply_predicates(&step.predicates, candidates, host)
}

/// The nodes on an axis in proximity order: document order for forward
/// axes, reverse document order for reverse axes.
pub(crate) fn axis_nodes(host: &dyn Host, axis: Axis, node: Node) -> Vec<Node> {
    let xot = host.xot();
    let xot_axis = match axis {
        Axis::Ancestor => xot::Axis::Ancestor,
        Axis::AncestorOrSelf => xot::Axis::AncestorOrSelf,
        Axis::Attribute => xot::Axis::Attribute,
        Axis::Child => xot::Axis::Child,
        Axis::Descendant => xot::Axis::Descendant,
        Axis::DescendantOrSelf => xot::Axis::DescendantOrSelf,
        Axis::Following => xot::Axis::Following,
        Axis::FollowingSibling => xot::Axis::FollowingSibling,
        Axis::Parent => xot::Axis::Parent,
        Axis::Preceding => xot::Axis::Preceding,
        Axis::PrecedingSibling => xot::Axis::PrecedingSibling,
        Axis::Self_ => xot::Axis::Self_,
        // namespace nodes are not exposed
        Axis::Namespace => return Vec::new(),
    };
    let mut nodes: Vec<Node> = xot.axis(xot_axis, node).collect();
    if axis.is_reverse() {
        sort_nodes(host, &mut nodes);
        nodes.reverse();
    }
    nodes
}

pub(crate) fn matches_node_test(xot: &Xot, node_test: &NodeTest, axis: Axis, node: Node) -> bool {
    let kind = node::node_kind(xot, node);
    let principal = if axis == Axis::Attribute {
        NodeKind::Attribute
    } else {
        NodeKind::Element
    };
    match node_test {
        NodeTest::Node => true,
        NodeTest::Text => kind == NodeKind::Text,
        NodeTest::Comment => kind == NodeKind::Comment,
        NodeTest::ProcessingInstruction(target) => {
            kind == NodeKind::ProcessingInstruction
                && target
                    .as_deref()
                    .map_or(true, |target| node::local_name(xot, node) == target)
        }
        NodeTest::Wildcard => kind == principal,
        NodeTest::NamespaceWildcard(namespace) => {
            kind == principal && node::namespace_uri(xot, node) == namespace
        }
        NodeTest::Name(name) => {
            kind == principal
                && node::name_parts(xot, node)
                    .is_some_and(|(namespace, local)| name.matches(namespace, local))
        }
    }
}

/// Filter nodes, given in proximity order, through predicates.
pub(crate) fn apply_predicates(
    predicates: &[Expr],
    mut nodes: Vec<Node>,
    host: &mut dyn Host,
) -> Result<Vec<Node>> {
    for predicate in predicates {
        if let Expr::Number(position) = predicate {
            nodes = select_position(nodes, *position);
            continue;
        }
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let context = Context {
                node,
                position: i + 1,
                size,
            };
            let keep = match evaluate(predicate, &context, host)? {
                Value::Number(n) => n == (i + 1) as f64,
                value => value.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

fn select_position(nodes: Vec<Node>, position: f64) -> Vec<Node> {
    if position.fract() != 0.0 || position < 1.0 {
        return Vec::new();
    }
    nodes.into_iter().nth(position as usize - 1).into_iter().collect()
}

fn compare(operator: CompareOperator, left: &Value, right: &Value, xot: &Xot) -> bool {
    match (left, right) {
        (Value::NodeSet(left), Value::NodeSet(right)) => {
            let right_strings: Vec<String> = right
                .iter()
                .map(|node| node::string_value(xot, *node))
                .collect();
            left.iter().any(|node| {
                let left = Value::String(node::string_value(xot, *node));
                right_strings
                    .iter()
                    .any(|right| compare_atomic(operator, &left, &Value::String(right.clone()), xot))
            })
        }
        (Value::NodeSet(_), Value::Boolean(_)) | (Value::Boolean(_), Value::NodeSet(_)) => {
            compare_atomic(
                operator,
                &Value::Boolean(left.to_boolean()),
                &Value::Boolean(right.to_boolean()),
                xot,
            )
        }
        (Value::NodeSet(nodes), other) => nodes.iter().any(|node| {
            compare_atomic(
                operator,
                &Value::String(node::string_value(xot, *node)),
                other,
                xot,
            )
        }),
        (other, Value::NodeSet(nodes)) => nodes.iter().any(|node| {
            compare_atomic(
                operator,
                other,
                &Value::String(node::string_value(xot, *node)),
                xot,
            )
        }),
        _ => compare_atomic(operator, left, right, xot),
    }
}

fn compare_atomic(operator: CompareOperator, left: &Value, right: &Value, xot: &Xot) -> bool {
    match operator {
        CompareOperator::Equal | CompareOperator::NotEqual => {
            let equal = match (left, right) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                    left.to_boolean() == right.to_boolean()
                }
                (Value::Number(_), _) | (_, Value::Number(_)) => {
                    let (left, right) = (left.to_number(xot), right.to_number(xot));
                    // NaN is unequal to everything, including itself
                    return if operator == CompareOperator::Equal {
                        left == right
                    } else {
                        left != right
                    };
                }
                _ => left.to_xpath_string(xot) == right.to_xpath_string(xot),
            };
            if operator == CompareOperator::Equal {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let (left, right) = (left.to_number(xot), right.to_number(xot));
            match operator {
                CompareOperator::LessThan => left < right,
                CompareOperator::LessThanEqual => left <= right,
                CompareOperator::GreaterThan => left > right,
                _ => left >= right,
            }
        }
    }
}
