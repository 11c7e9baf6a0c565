//! Streaming XML parsing and `<Reference>` resolution for the XISF header
//! (§4.G). Builds a small arena of elements rather than a DOM-style tree of
//! owned nodes (see DESIGN NOTES: "a streaming XML parser with local-name
//! dispatch; the uid map is a separate `HashMap<String, NodeRef>`").

use std::collections::HashMap;
use std::string::String;
use std::vec::Vec;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{XisfError as Error, XisfResult as Result};

/// Index of a node within an [`XmlArena`].
pub type NodeRef = usize;

/// One parsed XML element: its local tag name, attributes, accumulated
/// text content, and child node indices.
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<NodeRef>,
}

impl XmlNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// A parsed XML document as a flat arena of nodes, plus the root index and
/// the `uid` attribute map built in the same pass.
pub struct XmlArena {
    pub nodes: Vec<XmlNode>,
    pub root: NodeRef,
    pub uids: HashMap<String, NodeRef>,
}

impl XmlArena {
    pub fn get(&self, idx: NodeRef) -> &XmlNode {
        &self.nodes[idx]
    }

    /// Children of `idx` whose local tag name is `tag`.
    pub fn children_named<'a>(&'a self, idx: NodeRef, tag: &'a str) -> impl Iterator<Item = NodeRef> + 'a {
        self.nodes[idx].children.iter().copied().filter(move |&c| self.nodes[c].tag == tag)
    }

    /// Resolve one level of `<Reference ref="uid">` indirection. Returns the
    /// referenced node directly if `idx` isn't a Reference. A Reference
    /// pointing at another Reference is rejected (chained references are
    /// invalid per §4.G), regardless of `strict` — it can never be a
    /// meaningful document.
    pub fn resolve<'a>(&'a self, idx: NodeRef) -> Result<&'a XmlNode> {
        let node = &self.nodes[idx];
        if node.tag != "Reference" {
            return Ok(node);
        }
        let target_uid = node.attr("ref").ok_or(Error::Validation("<Reference> missing ref attribute"))?;
        let target_idx = *self.uids.get(target_uid).ok_or(Error::Validation("<Reference> points to an unknown uid"))?;
        let target = &self.nodes[target_idx];
        if target.tag == "Reference" {
            return Err(Error::Validation("chained <Reference> elements are not allowed"));
        }
        Ok(target)
    }
}

/// Local name of a (possibly namespace-qualified) tag, e.g. `xisf:Image` → `Image`.
fn local_name(qname: &str) -> &str {
    match qname.rsplit_once(':') {
        Some((_, local)) => local,
        None => qname,
    }
}

/// Parse `xml` into an [`XmlArena`], collecting the `uid` attribute map in
/// the same pass (pass 1 of the two-pass reference algorithm; pass 2 is
/// [`XmlArena::resolve`] applied on demand by the unit/image/property
/// converters).
pub fn parse(xml: &str) -> Result<XmlArena> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text = true;

    let mut nodes: Vec<XmlNode> = Vec::new();
    let mut stack: Vec<NodeRef> = Vec::new();
    let mut root: Option<NodeRef> = None;
    let mut uids: HashMap<String, NodeRef> = HashMap::new();
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|_| Error::Format("malformed XML header"))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let idx = push_element(&mut nodes, &mut uids, &e, &stack, &mut root);
                stack.push(idx);
            }
            Event::Empty(e) => {
                push_element(&mut nodes, &mut uids, &e, &stack, &mut root);
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                if let Some(&top) = stack.last() {
                    let text = t.unescape().unwrap_or_default();
                    nodes[top].text.push_str(&text);
                }
            }
            Event::CData(t) => {
                if let Some(&top) = stack.last() {
                    nodes[top].text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            _ => {}
        }
        buf.clear();
    }

    let root = root.ok_or(Error::Format("XML header has no root element"))?;
    if nodes[root].tag != "xisf" {
        return Err(Error::Format("root element is not <xisf>"));
    }
    Ok(XmlArena { nodes, root, uids })
}

/// Shared bookkeeping for `Event::Start`/`Event::Empty`: allocate the node,
/// record it in the `uid` map, and link it into its parent (or set it as
/// the document root). Returns the new node's index; the caller alone
/// decides whether to push it onto the open-element stack.
fn push_element(
    nodes: &mut Vec<XmlNode>,
    uids: &mut HashMap<String, NodeRef>,
    e: &quick_xml::events::BytesStart,
    stack: &[NodeRef],
    root: &mut Option<NodeRef>,
) -> NodeRef {
    let tag = local_name(&String::from_utf8_lossy(e.name().as_ref())).to_string();
    let mut attrs = Vec::new();
    for a in e.attributes().flatten() {
        let key = local_name(&String::from_utf8_lossy(a.key.as_ref())).to_string();
        let value = a.unescape_value().unwrap_or_default().to_string();
        attrs.push((key, value));
    }
    let idx = nodes.len();
    if let Some(uid) = attrs.iter().find(|(k, _)| k == "uid").map(|(_, v)| v.clone()) {
        uids.insert(uid, idx);
    }
    nodes.push(XmlNode { tag, attrs, text: String::new(), children: Vec::new() });
    if let Some(&parent) = stack.last() {
        nodes[parent].children.push(idx);
    } else if root.is_none() {
        *root = Some(idx);
    }
    idx
}
