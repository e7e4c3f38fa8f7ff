//! Non-recursive construction of the arena from a byte stream (spec §4.3, §9).
//!
//! A single streaming pass over `quick_xml`'s event iterator, with an explicit stack of
//! currently-open elements, replaces the two-pass "parse into libxml2 DOM, then walk it
//! with an explicit stack" approach of the original -- the traversal is still
//! non-recursive and still visits elements strictly in document order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{NodeData, NodeId, ParseError, PResult};

pub(super) fn build_tree(xml: &[u8]) -> PResult<(Vec<NodeData>, NodeId)> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut nodes: Vec<NodeData> = Vec::new();
    let mut root: Option<NodeId> = None;

    // Parallel stacks: `open` holds the ids of currently-open elements (document order,
    // innermost last); `last_child` holds, for each frame in `open`, the id of the most
    // recently appended direct child (used to chain `next_sibling`).
    let mut open: Vec<NodeId> = Vec::new();
    let mut last_child: Vec<Option<NodeId>> = Vec::new();

    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError(format!("Failed to parse XML document!!!: {e}")))?;

        match event {
            Event::Start(e) => push_element(&mut nodes, &mut open, &mut last_child, &mut root, &e, true)?,
            Event::Empty(e) => push_element(&mut nodes, &mut open, &mut last_child, &mut root, &e, false)?,
            Event::End(_) => {
                open.pop();
                last_child.pop();
            }
            Event::Text(t) => {
                if let Some(&current) = open.last() {
                    let text = t
                        .decode()
                        .map_err(|e| ParseError(format!("Failed to parse XML document!!!: {e}")))?;
                    nodes[current].text.push_str(text.as_ref());
                }
            }
            Event::CData(t) => {
                if let Some(&current) = open.last() {
                    let text = t
                        .decode()
                        .map_err(|e| ParseError(format!("Failed to parse XML document!!!: {e}")))?;
                    nodes[current].text.push_str(text.as_ref());
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let root = root.ok_or_else(|| ParseError("Failed to parse XML document!!!".to_string()))?;
    Ok((nodes, root))
}

#[allow(clippy::too_many_arguments)]
fn push_element(
    nodes: &mut Vec<NodeData>,
    open: &mut Vec<NodeId>,
    last_child: &mut Vec<Option<NodeId>>,
    root: &mut Option<NodeId>,
    e: &BytesStart<'_>,
    has_children_event: bool,
) -> PResult<()> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let attrs = e
        .attributes()
        .filter_map(|a| a.ok())
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            (key, value)
        })
        .collect();

    let id = nodes.len();
    nodes.push(NodeData {
        name,
        text: String::new(),
        attrs,
        parent: open.last().copied(),
        first_child: None,
        next_sibling: None,
    });

    if let Some(&parent) = open.last() {
        if nodes[parent].first_child.is_none() {
            nodes[parent].first_child = Some(id);
        }
        if let Some(sibling) = last_child.last_mut() {
            if let Some(prev) = sibling.replace(id) {
                nodes[prev].next_sibling = Some(id);
            }
        }
    } else {
        if root.is_some() {
            return Err(ParseError(
                "Failed to parse XML document!!!: multiple root elements".to_string(),
            ));
        }
        *root = Some(id);
    }

    if has_children_event {
        open.push(id);
        last_child.push(None);
    }

    Ok(())
}

pub(super) fn attribute(nodes: &[NodeData], id: NodeId, key: &str) -> Option<String> {
    nodes[id]
        .attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}
