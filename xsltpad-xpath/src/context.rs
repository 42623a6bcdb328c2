use ahash::{HashMap, HashMapExt};
use xot::{Node, Xot};

use crate::document_order::DocumentOrder;
use crate::error::{Error, Result};
use crate::name::ExpandedName;
use crate::value::Value;

/// The dynamic focus: context node, position and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub node: Node,
    /// 1-based
    pub position: usize,
    pub size: usize,
}

impl Context {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            position: 1,
            size: 1,
        }
    }
}

/// What an expression needs from its environment while it's evaluated.
///
/// XSLT implements this to supply variables in scope and its additional
/// functions.
pub trait Host {
    fn xot(&self) -> &Xot;

    fn document_order(&self) -> &DocumentOrder;

    /// Look up a variable in scope. Hosts may compute the value on first
    /// use, which is why this takes `&mut self`.
    fn variable(&mut self, name: &ExpandedName) -> Result<Value>;

    /// Call a function that isn't in the core library. Returns `None` if
    /// the host doesn't know the function either.
    fn function(
        &mut self,
        _name: &ExpandedName,
        _arguments: Vec<Value>,
        _context: &Context,
    ) -> Option<Result<Value>> {
        None
    }
}

/// A host for evaluating standalone expressions against a document.
pub struct DocumentHost<'a> {
    xot: &'a Xot,
    document_order: DocumentOrder,
    variables: HashMap<ExpandedName, Value>,
}

impl<'a> DocumentHost<'a> {
    pub fn new(xot: &'a Xot) -> Self {
        Self {
            xot,
            document_order: DocumentOrder::new(),
            variables: HashMap::new(),
        }
    }

    pub fn with_variable(mut self, name: ExpandedName, value: Value) -> Self {
        self.variables.insert(name, value);
        self
    }
}

impl Host for DocumentHost<'_> {
    fn xot(&self) -> &Xot {
        self.xot
    }

    fn document_order(&self) -> &DocumentOrder {
        &self.document_order
    }

    fn variable(&mut self, name: &ExpandedName) -> Result<Value> {
        self.variables.get(name).cloned().ok_or(Error::XPST0008)
    }
}
