//! Minimal namespace-aware XML tree.
//!
//! Built on quick-xml events. Every element keeps the namespace
//! declarations written on it plus the resolved namespace URI of its own
//! name and of each attribute, which is all exclusive canonicalization
//! needs. Document type declarations are rejected outright.

use std::borrow::Cow;
use std::fmt::Write as _;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Deepest element nesting [`parse`] accepts. Tree walks are recursive,
/// so anything deeper is refused up front.
pub const MAX_DEPTH: usize = 128;

/// A namespace declaration (`xmlns` or `xmlns:prefix`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// Declared prefix, `None` for the default namespace.
    pub prefix: Option<String>,
    /// Namespace URI; empty un-declares the default namespace.
    pub uri: String,
}

/// A non-namespace-declaration attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace URI (unprefixed attributes have none).
    pub namespace: Option<String>,
    /// Normalized, unescaped value.
    pub value: String,
}

/// Child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data, unescaped.
    Text(String),
    /// Comment body.
    Comment(String),
    /// Processing instruction body (`target data`).
    ProcessingInstruction(String),
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Namespace declarations on this element, in document order.
    pub namespaces: Vec<NsDecl>,
    /// Attributes in document order.
    pub attributes: Vec<XmlAttribute>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an empty element bound to `namespace` under `prefix`.
    /// The caller is responsible for declaring the prefix.
    #[must_use]
    pub fn new(prefix: Option<&str>, local_name: &str, namespace: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(String::from),
            local_name: local_name.to_string(),
            namespace: namespace.map(String::from),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns the qualified name as written (`prefix:local`).
    #[must_use]
    pub fn qname(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns an unqualified attribute value by local name.
    #[must_use]
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Sets (or replaces) an unqualified attribute.
    pub fn set_attr(&mut self, local_name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
        {
            existing.value = value;
        } else {
            self.attributes.push(XmlAttribute {
                prefix: None,
                local_name: local_name.to_string(),
                namespace: None,
                value,
            });
        }
    }

    /// Declares a namespace on this element.
    pub fn declare(&mut self, prefix: Option<&str>, uri: &str) {
        self.namespaces.push(NsDecl {
            prefix: prefix.map(String::from),
            uri: uri.to_string(),
        });
    }

    /// Appends a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Appends a text node.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(namespace, local_name))
    }

    /// Iterates over child elements with the given name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(namespace, local_name))
    }

    /// Returns the concatenated direct text content.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns this element and all descendant elements in document order.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = vec![self];
        for child in self.elements() {
            out.extend(child.descendants());
        }
        out
    }

    /// Returns the value of this element's `ID` (or `Id`) attribute.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attr("ID").or_else(|| self.attr("Id"))
    }

    /// Finds the element whose `ID` equals `id`.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.descendants().into_iter().find(|e| e.id() == Some(id))
    }

    /// Mutable variant of [`Element::find_by_id`].
    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) => e.find_by_id_mut(id),
            _ => None,
        })
    }

    /// Returns the elements enclosing `target`, outermost first, or `None`
    /// if `target` is not part of this subtree. Matches by identity.
    #[must_use]
    pub fn ancestors_of(&self, target: &Element) -> Option<Vec<&Element>> {
        if std::ptr::eq(self, target) {
            return Some(Vec::new());
        }
        self.elements().find_map(|child| {
            let mut path = child.ancestors_of(target)?;
            path.insert(0, self);
            Some(path)
        })
    }

    /// Returns every `ID` value in the subtree, duplicates included.
    #[must_use]
    pub fn all_ids(&self) -> Vec<&str> {
        self.descendants().into_iter().filter_map(Element::id).collect()
    }

    /// Serializes the subtree.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        let qname = self.qname();
        out.push('<');
        out.push_str(&qname);
        for ns in &self.namespaces {
            match &ns.prefix {
                Some(p) => {
                    let _ = write!(out, " xmlns:{p}=\"{}\"", escape_attr(&ns.uri));
                }
                None => {
                    let _ = write!(out, " xmlns=\"{}\"", escape_attr(&ns.uri));
                }
            }
        }
        for attr in &self.attributes {
            out.push(' ');
            if let Some(p) = &attr.prefix {
                out.push_str(p);
                out.push(':');
            }
            let _ = write!(out, "{}=\"{}\"", attr.local_name, escape_attr(&attr.value));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_to(out),
                Node::Text(t) => out.push_str(&escape_text(t)),
                Node::Comment(c) => {
                    let _ = write!(out, "<!--{c}-->");
                }
                Node::ProcessingInstruction(p) => {
                    let _ = write!(out, "<?{p}?>");
                }
            }
        }
        let _ = write!(out, "</{qname}>");
    }
}

/// Escapes character data (`&`, `<`, `>`, CR).
#[must_use]
pub fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '\r']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escapes an attribute value (`&`, `<`, `"`, TAB, LF, CR).
#[must_use]
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '"', '\t', '\n', '\r']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Parses a document and returns its root element.
///
/// # Errors
///
/// Returns [`SamlError::XmlParse`] for malformed input, unbound prefixes,
/// multiple roots, nesting deeper than [`MAX_DEPTH`] or any `<!DOCTYPE>`.
pub fn parse(xml: &str) -> SamlResult<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut scopes: Vec<Vec<NsDecl>> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DOCTYPE declarations are not allowed".to_string()));
            }
            Event::Start(e) => {
                ensure_single_root(&root, &stack)?;
                ensure_depth(&stack)?;
                let element = build_element(&e, &mut scopes)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                ensure_single_root(&root, &stack)?;
                ensure_depth(&stack)?;
                let element = build_element(&e, &mut scopes)?;
                scopes.pop();
                attach(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                scopes.pop();
                let element = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unexpected end tag".to_string()))?;
                attach(element, &mut stack, &mut root);
            }
            Event::Text(t) => {
                let raw = std::str::from_utf8(&t).map_err(|e| SamlError::XmlParse(e.to_string()))?;
                match stack.last_mut() {
                    Some(parent) => {
                        let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
                        let text = quick_xml::escape::unescape(&normalized)
                            .map_err(|e| SamlError::XmlParse(e.to_string()))?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                    None if raw.trim().is_empty() => {}
                    None => {
                        return Err(SamlError::XmlParse("text outside root element".to_string()));
                    }
                }
            }
            Event::CData(c) => {
                let text = std::str::from_utf8(&c)
                    .map_err(|e| SamlError::XmlParse(e.to_string()))?
                    .to_string();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(text));
                }
            }
            Event::Comment(c) => {
                if let Some(parent) = stack.last_mut() {
                    let body = std::str::from_utf8(&c).map_err(|e| SamlError::XmlParse(e.to_string()))?;
                    parent.children.push(Node::Comment(body.to_string()));
                }
            }
            Event::PI(p) => {
                if let Some(parent) = stack.last_mut() {
                    let body = std::str::from_utf8(&p).map_err(|e| SamlError::XmlParse(e.to_string()))?;
                    parent.children.push(Node::ProcessingInstruction(body.to_string()));
                }
            }
            Event::Decl(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unclosed element at end of document".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn ensure_single_root(root: &Option<Element>, stack: &[Element]) -> SamlResult<()> {
    if root.is_some() && stack.is_empty() {
        return Err(SamlError::XmlParse("multiple root elements".to_string()));
    }
    Ok(())
}

fn ensure_depth(stack: &[Element]) -> SamlResult<()> {
    if stack.len() >= MAX_DEPTH {
        return Err(SamlError::XmlParse(format!(
            "elements nested deeper than {MAX_DEPTH} levels"
        )));
    }
    Ok(())
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

/// Builds an element from a start tag and pushes its namespace scope.
fn build_element(start: &BytesStart<'_>, scopes: &mut Vec<Vec<NsDecl>>) -> SamlResult<Element> {
    let mut decls = Vec::new();
    let mut raw_attrs = Vec::new();

    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| SamlError::XmlParse(e.to_string()))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value).map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let value = normalize_attr_value(raw)?;

        if key == "xmlns" {
            decls.push(NsDecl { prefix: None, uri: value });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            decls.push(NsDecl {
                prefix: Some(prefix.to_string()),
                uri: value,
            });
        } else {
            raw_attrs.push((key, value));
        }
    }
    scopes.push(decls.clone());

    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| SamlError::XmlParse(e.to_string()))?
        .to_string();
    let (prefix, local_name) = split_qname(&name);
    let namespace = resolve(scopes, prefix)?;

    let mut attributes = Vec::with_capacity(raw_attrs.len());
    for (key, value) in raw_attrs {
        let (attr_prefix, attr_local) = split_qname(&key);
        let attr_ns = match attr_prefix {
            Some(_) => resolve(scopes, attr_prefix)?,
            None => None,
        };
        attributes.push(XmlAttribute {
            prefix: attr_prefix.map(String::from),
            local_name: attr_local.to_string(),
            namespace: attr_ns,
            value,
        });
    }

    Ok(Element {
        prefix: prefix.map(String::from),
        local_name: local_name.to_string(),
        namespace,
        namespaces: decls,
        attributes,
        children: Vec::new(),
    })
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Resolves `prefix` against the scope stack, innermost first.
fn resolve(scopes: &[Vec<NsDecl>], prefix: Option<&str>) -> SamlResult<Option<String>> {
    if prefix == Some("xml") {
        return Ok(Some(XML_NS.to_string()));
    }
    for scope in scopes.iter().rev() {
        if let Some(decl) = scope.iter().find(|d| d.prefix.as_deref() == prefix) {
            return Ok(if decl.uri.is_empty() { None } else { Some(decl.uri.clone()) });
        }
    }
    match prefix {
        Some(p) => Err(SamlError::XmlParse(format!("unbound namespace prefix '{p}'"))),
        None => Ok(None),
    }
}

/// Applies attribute-value normalization, then resolves references.
fn normalize_attr_value(raw: &str) -> SamlResult<String> {
    let normalized: String = raw
        .replace("\r\n", " ")
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect();
    quick_xml::escape::unescape(&normalized)
        .map(Cow::into_owned)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}
