//! XML tree model (C4): parses a document into an arena-indexed tree and derives the
//! metadata the mapper needs (select/insert, uuid, main table, requested table).
//!
//! Every `Node` the tree stores corresponds to an `XML_ELEMENT_NODE` in the original --
//! text and CDATA are folded into the owning element's `text` field rather than kept as
//! siblings, so `is_element_node()` is trivially `true` for every node in the arena and
//! the "object vs property" classification collapses to "has at least one child".

mod build;

use std::fmt;

/// Index into a `Tree`'s arena. Stable for the lifetime of the `Tree`.
pub type NodeId = usize;

#[derive(Debug)]
struct NodeData {
    name: String,
    text: String,
    attrs: Vec<(String, String)>,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

/// A parsed XML document plus the metadata the mapper (C5) needs to act on it.
///
/// Nodes are owned by a single arena (`nodes`) and referenced by index -- see
/// Design Notes §9 on the cyclic/parent-referential graph. Freeing the tree frees the
/// whole arena in one step; there is no per-node deallocation.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
    is_select_type: bool,
    uuid: String,
    main_table: String,
    table_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for crate::error::DbError {
    fn from(e: ParseError) -> Self {
        crate::error::DbError::Parse(e.0)
    }
}

type PResult<T> = std::result::Result<T, ParseError>;

impl Tree {
    /// Parses `xml` and derives select/insert metadata (spec §4.3).
    pub fn parse(xml: &[u8]) -> PResult<Tree> {
        let (nodes, root) = build::build_tree(xml)?;
        let mut tree = Tree {
            nodes,
            root,
            is_select_type: false,
            uuid: String::new(),
            main_table: String::new(),
            table_name: None,
        };
        tree.determine_type()?;
        if !tree.is_select_type {
            tree.determine_uuid()?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_select_type(&self) -> bool {
        self.is_select_type
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn main_table(&self) -> &str {
        &self.main_table
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    pub fn content(&self, id: NodeId) -> &str {
        &self.nodes[id].text
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// First child in document order, or `None` if this is a property node.
    pub fn child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].first_child
    }

    /// Next sibling in document order, or `None` if this is the last child.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].next_sibling
    }

    /// Every tree node wraps an XML element -- text nodes never get their own entry.
    pub fn is_element_node(&self, _id: NodeId) -> bool {
        true
    }

    /// Has at least one element child.
    pub fn is_object_node(&self, id: NodeId) -> bool {
        self.nodes[id].first_child.is_some()
    }

    /// No element children -- a leaf tag carrying text.
    pub fn is_property_node(&self, id: NodeId) -> bool {
        !self.is_object_node(id)
    }

    /// Has at least one child that is itself a property node.
    pub fn has_property_node(&self, id: NodeId) -> bool {
        self.children(id).any(|c| self.is_property_node(c))
    }

    /// Iterates the children of `id` in document order.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.nodes[id].first_child,
        }
    }

    /// Depth-first search (non-recursive) for the first element literally named `name`.
    /// Behavior with multiple matching elements is undefined but deterministic: the
    /// first one encountered in this traversal order wins (spec §9 Open Questions).
    pub fn find(&self, name: &str) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            if self.name(current) == name {
                return Some(current);
            }
            let mut child = self.child(current);
            while let Some(c) = child {
                stack.push(c);
                child = self.next(c);
            }
        }
        None
    }

    /// Names of `id`'s property-node children, in document order, skipping any child
    /// literally named `uuid`.
    pub fn collect_property_names(&self, id: NodeId) -> Vec<String> {
        self.children(id)
            .filter(|&c| self.is_property_node(c) && self.name(c) != "uuid")
            .map(|c| self.name(c).to_string())
            .collect()
    }

    /// Text content of `id`'s property-node children, in the same order as
    /// `collect_property_names`.
    pub fn collect_property_values(&self, id: NodeId) -> Vec<String> {
        self.children(id)
            .filter(|&c| self.is_property_node(c) && self.name(c) != "uuid")
            .map(|c| self.content(c).to_string())
            .collect()
    }

    fn determine_type(&mut self) -> PResult<()> {
        let operation = self
            .children(self.root)
            .find(|&c| self.name(c) == "operation");

        let Some(operation) = operation else {
            self.is_select_type = false;
            return Ok(());
        };

        let op_type = build::attribute(&self.nodes, operation, "type").ok_or_else(|| {
            ParseError("type attribute is null in <operation> element".to_string())
        })?;

        if op_type == "select" {
            self.is_select_type = true;
            self.table_name = self
                .children(operation)
                .find(|&c| self.name(c) == "table")
                .map(|c| self.content(c).to_string());
        } else {
            self.is_select_type = false;
        }
        Ok(())
    }

    fn determine_uuid(&mut self) -> PResult<()> {
        let uuid_node = self
            .find("uuid")
            .ok_or_else(|| ParseError("Uuid node not found!!!".to_string()))?;

        let parent = self
            .parent(uuid_node)
            .ok_or_else(|| ParseError("Parent of uuid node not found!!!".to_string()))?;

        let uuid = self.content(uuid_node).to_string();
        if uuid.is_empty() {
            return Err(ParseError("Uuid not found!!!".to_string()));
        }

        self.uuid = uuid;
        self.main_table = self.name(parent).to_string();
        Ok(())
    }
}

pub struct Children<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.next(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_object_and_property_nodes() {
        let xml = br#"<root><operation type="insert"/><person><uuid>u1</uuid><name>a</name></person></root>"#;
        let tree = Tree::parse(xml).unwrap();

        assert!(!tree.is_select_type());
        assert_eq!(tree.uuid(), "u1");
        assert_eq!(tree.main_table(), "person");

        let person = tree.find("person").unwrap();
        assert!(tree.is_object_node(person));
        assert!(tree.has_property_node(person));

        let name_node = tree.children(person).find(|&c| tree.name(c) == "name").unwrap();
        assert!(tree.is_property_node(name_node));
    }

    #[test]
    fn uuid_child_excluded_from_property_collection() {
        let xml = br#"<root><operation type="insert"/><person><uuid>u1</uuid><name>a</name></person></root>"#;
        let tree = Tree::parse(xml).unwrap();
        let person = tree.find("person").unwrap();

        assert_eq!(tree.collect_property_names(person), vec!["name".to_string()]);
        assert_eq!(tree.collect_property_values(person), vec!["a".to_string()]);
    }

    #[test]
    fn select_with_table_name() {
        let xml = br#"<request><operation type="select"><table>person</table></operation></request>"#;
        let tree = Tree::parse(xml).unwrap();

        assert!(tree.is_select_type());
        assert_eq!(tree.table_name(), Some("person"));
    }

    #[test]
    fn select_without_table_name() {
        let xml = br#"<request><operation type="select"/></request>"#;
        let tree = Tree::parse(xml).unwrap();

        assert!(tree.is_select_type());
        assert_eq!(tree.table_name(), None);
    }

    #[test]
    fn missing_operation_type_attribute_is_parse_error() {
        let xml = br#"<root><operation/><person><uuid>u1</uuid></person></root>"#;
        let err = Tree::parse(xml).unwrap_err();
        assert!(err.0.contains("type attribute"));
    }

    #[test]
    fn missing_uuid_on_insert_is_parse_error() {
        let xml = br#"<root><operation type="insert"/><person><name>a</name></person></root>"#;
        let err = Tree::parse(xml).unwrap_err();
        assert!(err.0.contains("Uuid"));
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let xml = b"not xml at all <<<";
        assert!(Tree::parse(xml).is_err());
    }

    #[test]
    fn foreign_key_shape_order_child_has_no_uuid() {
        let xml = br#"<root><operation type="insert"/><order><uuid>u2</uuid><total>9</total>
            <line><sku>s1</sku><qty>2</qty></line></order></root>"#;
        let tree = Tree::parse(xml).unwrap();

        assert_eq!(tree.main_table(), "order");
        let order = tree.find("order").unwrap();
        assert_eq!(
            tree.collect_property_names(order),
            vec!["total".to_string()]
        );

        let line = tree.find("line").unwrap();
        assert!(tree.has_property_node(line));
        assert_eq!(
            tree.collect_property_names(line),
            vec!["sku".to_string(), "qty".to_string()]
        );
    }
}
