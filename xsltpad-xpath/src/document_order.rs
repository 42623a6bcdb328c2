// Document order for XML nodes. This maintains both a tree id (so we can
// distinguish between nodes from different documents and fragments) as well
// as a preorder position (so we can sort nodes from the same tree).
//
// Annotations are created on the fly: the first time a node of a tree is
// seen, the whole tree is numbered. Trees must not be modified after they
// have been numbered; input documents never are, and fragments are complete
// before they are bound to a variable.

use std::cell::RefCell;

use ahash::{HashMap, HashMapExt};
use xot::{Node, Xot};

use crate::node::root;

#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Order(usize, usize);

impl Order {
    pub fn generate_id(&self) -> String {
        // must be alphanumeric and start with alphabetic character, so we
        // cannot use _ or - as separators
        format!("id{}s{}", self.0, self.1)
    }
}

#[derive(Debug, Default)]
pub struct DocumentOrder {
    tree_count: RefCell<usize>,
    map: RefCell<HashMap<Node, Order>>,
}

impl DocumentOrder {
    pub fn new() -> Self {
        Self {
            tree_count: RefCell::new(0),
            map: RefCell::new(HashMap::new()),
        }
    }

    pub fn get(&self, xot: &Xot, node: Node) -> Order {
        if let Some(order) = self.map.borrow().get(&node) {
            return *order;
        }
        self.annotate(xot, root(xot, node));
        // a node that isn't reachable through the traversal still gets a
        // stable order, after everything else in its tree
        let mut map = self.map.borrow_mut();
        let fallback = Order(*self.tree_count.borrow(), map.len());
        *map.entry(node).or_insert(fallback)
    }

    fn annotate(&self, xot: &Xot, tree: Node) {
        let tree_id = {
            let mut tree_count = self.tree_count.borrow_mut();
            *tree_count += 1;
            *tree_count
        };
        let mut map = self.map.borrow_mut();
        let mut position = 0;
        for node in xot.descendants(tree) {
            if map.contains_key(&node) {
                continue;
            }
            map.insert(node, Order(tree_id, position));
            position += 1;
            if xot.is_element(node) {
                for attribute in xot.axis(xot::Axis::Attribute, node) {
                    map.entry(attribute).or_insert(Order(tree_id, position));
                    position += 1;
                }
            }
        }
    }

    /// Sort nodes into document order and remove duplicates.
    pub fn sort(&self, xot: &Xot, nodes: &mut Vec<Node>) {
        nodes.sort_by_cached_key(|node| self.get(xot, *node));
        nodes.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort() {
        let mut xot = Xot::new();
        let doc = xot.parse(r#"<a x="1"><b/><c/></a>"#).unwrap();
        let a = xot.document_element(doc).unwrap();
        let b = xot.first_child(a).unwrap();
        let c = xot.next_sibling(b).unwrap();
        let order = DocumentOrder::new();
        let mut nodes = vec![c, a, b, c, doc];
        order.sort(&xot, &mut nodes);
        assert_eq!(nodes, vec![doc, a, b, c]);
    }

    #[test]
    fn test_attribute_before_children() {
        let mut xot = Xot::new();
        let doc = xot.parse(r#"<a x="1"><b/></a>"#).unwrap();
        let a = xot.document_element(doc).unwrap();
        let b = xot.first_child(a).unwrap();
        let x = xot.axis(xot::Axis::Attribute, a).next().unwrap();
        let order = DocumentOrder::new();
        assert!(order.get(&xot, a) < order.get(&xot, x));
        assert!(order.get(&xot, x) < order.get(&xot, b));
    }

    #[test]
    fn test_separate_trees() {
        let mut xot = Xot::new();
        let first = xot.parse("<a/>").unwrap();
        let second = xot.parse("<b/>").unwrap();
        let order = DocumentOrder::new();
        let first_id = order.get(&xot, first).generate_id();
        let second_id = order.get(&xot, second).generate_id();
        assert_ne!(first_id, second_id);
        assert_eq!(first_id, "id1s0");
    }
}
