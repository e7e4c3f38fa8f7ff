//! Mapper (C5): walks a parsed XML tree and either fetches data (SELECT) or derives a
//! schema and persists the document (INSERT) -- spec §4.4.

use crate::error::Result;
use crate::store::Store;
use crate::xmltree::Tree;

/// Parses `input` and returns the string that should become the session's result.
///
/// `ParseError`/`StoreError` never escape this function as `Err` to the caller except
/// as a surfaced `"Error : <msg>"` string -- mirroring the original's "exceptions never
/// cross the worker boundary" (spec §4.4 Failure semantics). The `Result` return is
/// only used for errors a worker truly cannot recover from (there are none today; kept
/// for symmetry with the rest of the crate's fallible API).
pub fn process(input: &str, store: &Store) -> Result<String> {
    match run(input, store) {
        Ok(result) => Ok(result),
        Err(message) => Ok(format!("Error : {message}")),
    }
}

fn run(input: &str, store: &Store) -> std::result::Result<String, String> {
    let tree = Tree::parse(input.as_bytes()).map_err(|e| e.0)?;

    if tree.is_select_type() {
        let result = match tree.table_name() {
            Some(table) => store.dump_table(table),
            None => store.dump_all(),
        };
        return result.map_err(|e| e.to_string());
    }

    store_xml_nodes(&tree, store).map_err(|e| e.to_string())?;
    Ok("done :) \n".to_string())
}

/// Depth-first, non-recursive walk of every element in the tree (spec §4.4, §9 Open
/// Questions): the stack is seeded with the root and, for each popped node, both its
/// first child and its next sibling are pushed -- the version that only follows
/// `next()` at the top level would skip every node past the root's own sibling chain,
/// which the spec explicitly rules out ("must visit every element exactly once").
fn store_xml_nodes(tree: &Tree, store: &Store) -> Result<()> {
    let mut stack = vec![tree.root()];

    while let Some(current) = stack.pop() {
        if let Some(next) = tree.next(current) {
            stack.push(next);
        }
        if let Some(child) = tree.child(current) {
            stack.push(child);
        }

        if tree.is_element_node(current) && tree.has_property_node(current) {
            let name = tree.name(current).to_string();
            let names = tree.collect_property_names(current);
            let values = tree.collect_property_values(current);

            if !store.table_exists(&name)? {
                let is_main_table = name == tree.main_table();
                store.create_table(&name, &names, is_main_table, tree.main_table())?;
            }
            store.insert(tree.uuid(), &names, &values, &name)?;
        }
    }

    Ok(())
}
