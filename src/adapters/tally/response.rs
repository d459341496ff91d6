//! Tolerant reading of TallyPrime responses
//!
//! Tally answers with loosely structured XML whose interesting elements move
//! around depending on request type and product version, so responses are
//! read into a small element tree and searched instead of being mapped onto
//! fixed structs.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let attrs = start
            .attributes()
            .flatten()
            .map(|a| {
                let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                let value = a
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
                (key, value)
            })
            .collect();
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attrs,
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a chain of child names from this node
    pub fn path(&self, names: &[&str]) -> Option<&XmlNode> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Depth-first search including this node
    pub fn find_first(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_first(name))
    }

    /// Every descendant (or self) named `name`, document order
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        if self.name == name {
            out.push(self);
            return;
        }
        for child in &self.children {
            child.find_all(name, out);
        }
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Parse a response body into an element tree
///
/// Text and CDATA are accumulated on the enclosing element; comments,
/// declarations and processing instructions are ignored.
pub fn parse(raw: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(XmlNode::from_start(&e)),
            Ok(Event::Empty(e)) => {
                let node = XmlNode::from_start(&e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = root.or(Some(node)),
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                let Some(node) = stack.pop() else {
                    return Err(SyncError::Xml("unbalanced end tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = root.or(Some(node)),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SyncError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            Ok(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(SyncError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SyncError::Xml("empty document".to_string()))
}

/// Company names from a "List of Companies" export
///
/// Accepted shapes, in order: `<COMPANY NAME="…">`, `<COMPANY><NAME>…</NAME>`
/// (with or without attributes on NAME), and as a fallback any
/// `<COMPANYNAME>` element anywhere in the document. The result is sorted
/// and de-duplicated.
pub fn company_names(root: &XmlNode) -> Vec<String> {
    let data_root = root
        .path(&["BODY", "DATA"])
        .or_else(|| root.path(&["BODY", "EXPORTDATA"]));

    let mut names: Vec<String> = match data_root.and_then(|d| d.child("COLLECTION")) {
        Some(collection) => collection
            .children_named("COMPANY")
            .filter_map(|company| {
                company
                    .attr("NAME")
                    .map(str::to_string)
                    .or_else(|| company.child("NAME").map(|n| n.trimmed_text().to_string()))
            })
            .filter(|name| !name.is_empty())
            .collect(),
        None => {
            let mut found = Vec::new();
            root.find_all("COMPANYNAME", &mut found);
            found
                .into_iter()
                .map(|n| n.trimmed_text().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        }
    };

    names.sort();
    names.dedup();
    names
}

/// Does a voucher export contain the given remote id?
///
/// The structured check looks for a `REMOTEID` element or attribute equal to
/// the id. The raw-text check is a last resort for export formats that put
/// the id somewhere else.
pub fn contains_remote_id(raw: &str, remote_id: &str) -> bool {
    let Ok(root) = parse(raw) else {
        return false;
    };
    if root.name != "ENVELOPE" {
        return false;
    }
    if has_remote_id(&root, remote_id) {
        return true;
    }
    let escaped = quick_xml::escape::escape(remote_id);
    raw.contains(&format!(">{}<", escaped)) || raw.contains(&format!("\"{}\"", escaped))
}

fn has_remote_id(node: &XmlNode, remote_id: &str) -> bool {
    (node.name == "REMOTEID" && node.trimmed_text() == remote_id)
        || node.attr("REMOTEID") == Some(remote_id)
        || node.children.iter().any(|c| has_remote_id(c, remote_id))
}
