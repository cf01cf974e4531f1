//! The concrete XML persistence strategy (spec §4.6), the default backend a
//! [`super::strategy::PersistenceStrategy`] consumer reaches for.
//!
//! Document shape:
//!
//! ```xml
//! <ConfigurationFile>
//!   <Configuration name="root">
//!     <!--listening port-->
//!     <Item name="port">8080</Item>
//!     <Configuration name="server">
//!       <Item name="hosts">
//!         <Item>a.example</Item>
//!         <Item>b.example</Item>
//!       </Item>
//!       <Item name="bind">
//!         <Field name="host">0.0.0.0</Field>
//!         <Field name="port">8080</Field>
//!       </Item>
//!     </Configuration>
//!   </Configuration>
//! </ConfigurationFile>
//! ```
//!
//! `<Configuration name="…">` elements nest exactly as the configuration
//! tree itself does, one per path segment. An item's own element carries its
//! leaf name; its value is either inner text (scalar), nested unnamed
//! `<Item>` children (a one-dimensional array), or nested `<Field name="…">`
//! children (a complex type) — never a `kind`/`type` attribute, since the
//! shape of the children already says which of the three it is. An item's
//! comment lines are written as their own XML comment nodes immediately
//! preceding its `<Item>` element (one `<!--...-->` per line), not as a
//! data-bearing child, matching how a hand-authored XML configuration file
//! actually comments an entry; on every save the old leading comment nodes
//! are discarded and regenerated from the item's current comment.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use xml::attribute::OwnedAttribute;
use xml::name::OwnedName;
use xml::reader::{EventReader, ParserConfig, XmlEvent as ReadEvent};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as WriteEvent};

use crate::config::path;
use crate::error::{Error, Result};
use crate::persistence::strategy::{Document, DocumentItem, PersistenceStrategy};
use crate::persistence::value::ItemNode;

/// Persists a configuration tree as a single XML file on disk.
pub struct XmlPersistenceStrategy {
    path: PathBuf,
}

impl XmlPersistenceStrategy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        XmlPersistenceStrategy { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Names become XML element/attribute content; this rejects anything that
/// would need escaping as a tag name rather than attempt to escape it,
/// matching `ConfigurationNode`/item name validation against a backend that
/// can't represent arbitrary names (spec §4.5 "is_valid_*_name").
fn is_valid_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

impl PersistenceStrategy for XmlPersistenceStrategy {
    fn is_valid_configuration_name(&self, name: &str) -> bool {
        is_valid_xml_name(name)
    }

    fn is_valid_item_name(&self, name: &str) -> bool {
        is_valid_xml_name(name)
    }

    fn load_document(&self) -> Result<Document> {
        if !self.path.is_file() {
            return Ok(Document::default());
        }
        let file = File::open(&self.path).map_err(|e| Error::persistence(e.to_string()))?;
        parse_document(BufReader::new(file))
    }

    fn save_document(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::persistence(e.to_string()))?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path).map_err(|e| Error::persistence(e.to_string()))?;
            write_document(BufWriter::new(file), doc)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| Error::persistence(e.to_string()))
    }
}

/// An in-memory tree mirroring the `<Configuration>` nesting, built from the
/// flat, path-addressed `Document` on write and torn back down into one on
/// read. Keeps the path-segment/tree-shape bookkeeping local to this module
/// rather than pushing it onto `persistence::strategy`'s object-safe,
/// tree-agnostic `Document`/`DocumentItem` pair.
#[derive(Default)]
struct ConfigNode {
    children: Vec<(String, ConfigNode)>,
    items: Vec<(String, ItemNode, Option<Vec<String>>)>,
}

impl ConfigNode {
    fn child_mut(&mut self, name: &str) -> &mut ConfigNode {
        if let Some(i) = self.children.iter().position(|(n, _)| n == name) {
            &mut self.children[i].1
        } else {
            self.children.push((name.to_string(), ConfigNode::default()));
            &mut self.children.last_mut().unwrap().1
        }
    }
}

fn build_tree(doc: &Document) -> Result<ConfigNode> {
    let mut root = ConfigNode::default();
    for item in &doc.items {
        let segments = path::split(&item.path)?;
        let (leaf, parents) = segments.split_last().expect("split never returns zero segments");
        let mut node = &mut root;
        for seg in parents {
            node = node.child_mut(seg);
        }
        node.items.push((leaf.clone(), item.value.clone(), item.comment.clone()));
    }
    Ok(root)
}

fn write_document<W: Write>(writer: W, doc: &Document) -> Result<()> {
    let tree = build_tree(doc)?;
    let mut w = EmitterConfig::new().perform_indent(true).create_writer(writer);
    w.write(WriteEvent::start_element("ConfigurationFile"))
        .map_err(|e| Error::persistence(e.to_string()))?;
    write_config_node(&mut w, "root", &tree)?;
    w.write(WriteEvent::end_element())
        .map_err(|e| Error::persistence(e.to_string()))?;
    Ok(())
}

fn write_config_node<W: Write>(w: &mut EventWriter<W>, name: &str, node: &ConfigNode) -> Result<()> {
    w.write(WriteEvent::start_element("Configuration").attr("name", name))
        .map_err(|e| Error::persistence(e.to_string()))?;

    for (item_name, value, comment) in &node.items {
        for line in comment.iter().flatten() {
            w.write(WriteEvent::comment(line))
                .map_err(|e| Error::persistence(e.to_string()))?;
        }
        write_item(w, Some(item_name), value)?;
    }
    for (child_name, child) in &node.children {
        write_config_node(w, child_name, child)?;
    }

    w.write(WriteEvent::end_element())
        .map_err(|e| Error::persistence(e.to_string()))?;
    Ok(())
}

/// Writes an `<Item>` element: `name` is present for a named item under a
/// `<Configuration>`, absent for an array element nested inside another
/// `<Item>`.
fn write_item<W: Write>(w: &mut EventWriter<W>, name: Option<&str>, value: &ItemNode) -> Result<()> {
    let start = match name {
        Some(n) => WriteEvent::start_element("Item").attr("name", n),
        None => WriteEvent::start_element("Item"),
    };
    w.write(start).map_err(|e| Error::persistence(e.to_string()))?;
    write_value_body(w, value)?;
    w.write(WriteEvent::end_element())
        .map_err(|e| Error::persistence(e.to_string()))?;
    Ok(())
}

fn write_field<W: Write>(w: &mut EventWriter<W>, name: &str, value: &ItemNode) -> Result<()> {
    w.write(WriteEvent::start_element("Field").attr("name", name))
        .map_err(|e| Error::persistence(e.to_string()))?;
    write_value_body(w, value)?;
    w.write(WriteEvent::end_element())
        .map_err(|e| Error::persistence(e.to_string()))?;
    Ok(())
}

fn write_value_body<W: Write>(w: &mut EventWriter<W>, value: &ItemNode) -> Result<()> {
    match value {
        ItemNode::Text(s) => {
            w.write(WriteEvent::characters(s))
                .map_err(|e| Error::persistence(e.to_string()))?;
        }
        ItemNode::Array(elements) => {
            for element in elements {
                write_item(w, None, element)?;
            }
        }
        ItemNode::Fields(fields) => {
            for (field_name, field_value) in fields {
                write_field(w, field_name, field_value)?;
            }
        }
    }
    Ok(())
}

/// One open `<Item>`/`<Field>` element while parsing: its own name (`None`
/// for an unnamed array element), and whatever children it has accumulated
/// so far. Which of `text`/`array_children`/`field_children` ends up
/// non-empty at `</Item>`/`</Field>` decides the node's `ItemNode` shape —
/// the document carries no explicit kind marker, by design (spec §4.6).
struct OpenValue {
    name: Option<String>,
    is_field: bool,
    text: String,
    array_children: Vec<ItemNode>,
    field_children: Vec<(String, ItemNode)>,
}

impl OpenValue {
    fn new(name: Option<String>, is_field: bool) -> Self {
        OpenValue {
            name,
            is_field,
            text: String::new(),
            array_children: Vec::new(),
            field_children: Vec::new(),
        }
    }

    fn into_node(self) -> ItemNode {
        if !self.array_children.is_empty() {
            ItemNode::Array(self.array_children)
        } else if !self.field_children.is_empty() {
            ItemNode::Fields(self.field_children)
        } else {
            ItemNode::Text(self.text)
        }
    }
}

fn parse_document<R: std::io::Read>(source: R) -> Result<Document> {
    let config = ParserConfig::new().ignore_comments(false);
    let reader = EventReader::new_with_config(source, config);
    let mut items = Vec::new();

    let mut config_path: Vec<String> = Vec::new();
    let mut config_depth = 0usize;
    let mut pending_comment: Vec<String> = Vec::new();
    let mut stack: Vec<OpenValue> = Vec::new();

    for event in reader {
        let event = event.map_err(|e| Error::persistence(e.to_string()))?;
        match event {
            ReadEvent::Comment(text) => {
                pending_comment.push(text);
            }
            ReadEvent::StartElement { name, attributes, .. } => {
                let local = local_name(&name)?;
                match local.as_str() {
                    "ConfigurationFile" => {}
                    "Configuration" => {
                        config_depth += 1;
                        if config_depth > 1 {
                            let name = attr(&attributes, "name").unwrap_or_default();
                            config_path.push(name);
                        }
                    }
                    "Item" => {
                        stack.push(OpenValue::new(attr(&attributes, "name"), false));
                    }
                    "Field" => {
                        let name = attr(&attributes, "name")
                            .ok_or_else(|| Error::persistence("<Field> missing required 'name' attribute"))?;
                        stack.push(OpenValue::new(Some(name), true));
                    }
                    other => return Err(Error::persistence(format!("unexpected element '{other}'"))),
                }
            }
            ReadEvent::Characters(text) | ReadEvent::CData(text) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&text);
                }
            }
            ReadEvent::EndElement { name } => {
                let local = local_name(&name)?;
                match local.as_str() {
                    "Configuration" => {
                        if config_depth > 1 {
                            config_path.pop();
                        }
                        config_depth -= 1;
                    }
                    "Item" | "Field" => {
                        let open = stack.pop().expect("push/pop balanced by element nesting");
                        let is_field = open.is_field;
                        let own_name = open.name.clone();
                        let comment = if !is_field && pending_comment.is_empty() {
                            None
                        } else if !is_field {
                            Some(std::mem::take(&mut pending_comment))
                        } else {
                            None
                        };
                        let node = open.into_node();

                        if let Some(parent) = stack.last_mut() {
                            if is_field {
                                let name = own_name.expect("a Field always has a name");
                                parent.field_children.push((name, node));
                            } else {
                                parent.array_children.push(node);
                            }
                        } else {
                            let name = own_name
                                .ok_or_else(|| Error::persistence("top-level <Item> missing required 'name' attribute"))?;
                            let segments: Vec<&str> = config_path
                                .iter()
                                .map(String::as_str)
                                .chain(std::iter::once(name.as_str()))
                                .collect();
                            items.push(DocumentItem {
                                path: path::combine("/", segments),
                                type_id: std::any::TypeId::of::<()>(),
                                value: node,
                                comment,
                            });
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    Ok(Document { items })
}

fn local_name(name: &OwnedName) -> Result<String> {
    if name.namespace.is_some() {
        return Err(Error::persistence("XML namespaces are not supported"));
    }
    Ok(name.local_name.clone())
}

fn attr(attributes: &[OwnedAttribute], name: &str) -> Option<String> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::strategy::SaveFlags;

    #[test]
    fn valid_xml_name_rules() {
        assert!(is_valid_xml_name("server"));
        assert!(is_valid_xml_name("_hidden"));
        assert!(is_valid_xml_name("a.b-c"));
        assert!(!is_valid_xml_name("1abc"));
        assert!(!is_valid_xml_name(""));
        assert!(!is_valid_xml_name("has space"));
    }

    #[test]
    fn missing_file_loads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = XmlPersistenceStrategy::new(dir.path().join("missing.xml"));
        let doc = strategy.load_document().unwrap();
        assert!(doc.items.is_empty());
    }

    #[test]
    fn scalar_item_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = XmlPersistenceStrategy::new(dir.path().join("config.xml"));

        let doc = Document {
            items: vec![DocumentItem {
                path: "server/port".to_string(),
                type_id: std::any::TypeId::of::<i64>(),
                value: ItemNode::Text("8080".to_string()),
                comment: Some(vec!["listening port".to_string()]),
            }],
        };
        strategy.save_document(&doc).unwrap();

        let xml = fs::read_to_string(strategy.path()).unwrap();
        assert!(xml.contains("<ConfigurationFile>"));
        assert!(xml.contains(r#"<Configuration name="server">"#));
        assert!(xml.contains(r#"<Item name="port">"#));
        assert!(xml.contains("<!--listening port-->"));
        assert!(xml.find("<!--listening port-->").unwrap() < xml.find(r#"<Item name="port">"#).unwrap());

        let loaded = strategy.load_document().unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].path, "/server/port");
        assert_eq!(loaded.items[0].value, ItemNode::Text("8080".to_string()));
        assert_eq!(loaded.items[0].comment.as_deref(), Some(&["listening port".to_string()][..]));
    }

    #[test]
    fn array_item_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = XmlPersistenceStrategy::new(dir.path().join("config.xml"));

        let doc = Document {
            items: vec![DocumentItem {
                path: "server/hosts".to_string(),
                type_id: std::any::TypeId::of::<Vec<String>>(),
                value: ItemNode::Array(vec![
                    ItemNode::Text("a.example".to_string()),
                    ItemNode::Text("b.example".to_string()),
                ]),
                comment: None,
            }],
        };
        strategy.save_document(&doc).unwrap();

        let xml = fs::read_to_string(strategy.path()).unwrap();
        assert!(xml.contains("<Item>a.example</Item>"));
        assert!(xml.contains("<Item>b.example</Item>"));

        let loaded = strategy.load_document().unwrap();
        assert_eq!(
            loaded.items[0].value,
            ItemNode::Array(vec![
                ItemNode::Text("a.example".to_string()),
                ItemNode::Text("b.example".to_string()),
            ])
        );
    }

    #[test]
    fn complex_item_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = XmlPersistenceStrategy::new(dir.path().join("config.xml"));

        let doc = Document {
            items: vec![DocumentItem {
                path: "server/bind".to_string(),
                type_id: std::any::TypeId::of::<()>(),
                value: ItemNode::Fields(vec![
                    ("host".to_string(), ItemNode::Text("0.0.0.0".to_string())),
                    ("port".to_string(), ItemNode::Text("8080".to_string())),
                ]),
                comment: None,
            }],
        };
        strategy.save_document(&doc).unwrap();

        let xml = fs::read_to_string(strategy.path()).unwrap();
        assert!(xml.contains(r#"<Field name="host">0.0.0.0</Field>"#));

        let loaded = strategy.load_document().unwrap();
        assert_eq!(
            loaded.items[0].value,
            ItemNode::Fields(vec![
                ("host".to_string(), ItemNode::Text("0.0.0.0".to_string())),
                ("port".to_string(), ItemNode::Text("8080".to_string())),
            ])
        );
    }

    #[test]
    fn nested_configuration_paths_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = XmlPersistenceStrategy::new(dir.path().join("config.xml"));

        let doc = Document {
            items: vec![DocumentItem {
                path: "/a/b/x".to_string(),
                type_id: std::any::TypeId::of::<i64>(),
                value: ItemNode::Text("7".to_string()),
                comment: None,
            }],
        };
        strategy.save_document(&doc).unwrap();

        let xml = fs::read_to_string(strategy.path()).unwrap();
        assert!(xml.contains(r#"<Configuration name="a">"#));
        assert!(xml.contains(r#"<Configuration name="b">"#));
        assert!(xml.contains(r#"<Item name="x">7</Item>"#));

        let loaded = strategy.load_document().unwrap();
        assert_eq!(loaded.items[0].path, "/a/b/x");
    }

    #[test]
    fn unused_save_flags_default_is_false() {
        assert!(!SaveFlags::default().save_inherited_settings);
    }
}
