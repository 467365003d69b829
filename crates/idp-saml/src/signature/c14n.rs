//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! Operates on the resolved [`Element`] tree: a namespace declaration is
//! emitted on an element only when its prefix is visibly utilized there
//! (by the element name or one of its attributes) and an output ancestor
//! has not already rendered the same binding. Subtrees therefore
//! canonicalize identically whether or not they are detached from their
//! parent document.
//!
//! Prefixes named in an `InclusiveNamespaces PrefixList` are the exception:
//! they are rendered wherever they are in scope, as inclusive C14N would,
//! so [`canonicalize_with`] needs the declarations made above the subtree.

use std::collections::BTreeMap;

use crate::xml::{escape_attr, escape_text, Element, Node, NsDecl};

/// Canonicalizes `element` and its descendants.
#[must_use]
pub fn canonicalize(element: &Element) -> String {
    canonicalize_with(element, &[], &[])
}

/// Canonicalizes with an inclusive prefix list.
///
/// `inclusive` holds prefixes as returned by [`parse_prefix_list`], and
/// `context` the declarations of the elements enclosing `element`,
/// outermost first.
#[must_use]
pub fn canonicalize_with(element: &Element, inclusive: &[String], context: &[NsDecl]) -> String {
    let mut in_scope = Rendered::new();
    for decl in context {
        bind(&mut in_scope, decl);
    }
    let mut out = String::new();
    write_element(element, &Rendered::new(), &in_scope, inclusive, &mut out);
    out
}

/// Splits a `PrefixList` attribute. `#default` becomes the empty string.
#[must_use]
pub fn parse_prefix_list(list: &str) -> Vec<String> {
    list.split_whitespace()
        .map(|p| if p == "#default" { String::new() } else { p.to_string() })
        .collect()
}

/// Prefix → URI bindings. The default namespace is keyed by the empty
/// string.
type Rendered = BTreeMap<String, String>;

fn bind(scope: &mut Rendered, decl: &NsDecl) {
    scope.insert(decl.prefix.clone().unwrap_or_default(), decl.uri.clone());
}

fn write_element(
    element: &Element,
    rendered: &Rendered,
    in_scope: &Rendered,
    inclusive: &[String],
    out: &mut String,
) {
    let mut visible: BTreeMap<String, String> = BTreeMap::new();

    let mut in_scope = in_scope.clone();
    if !inclusive.is_empty() {
        for decl in &element.namespaces {
            bind(&mut in_scope, decl);
        }
        for prefix in inclusive {
            if let Some(uri) = in_scope.get(prefix) {
                if prefix.is_empty() || !uri.is_empty() {
                    visible.insert(prefix.clone(), uri.clone());
                }
            }
        }
    }

    let element_prefix = element.prefix.clone().unwrap_or_default();
    visible.insert(element_prefix, element.namespace.clone().unwrap_or_default());
    for attr in &element.attributes {
        if let (Some(prefix), Some(ns)) = (&attr.prefix, &attr.namespace) {
            if prefix != "xml" {
                visible.insert(prefix.clone(), ns.clone());
            }
        }
    }

    let mut scope = rendered.clone();
    let mut decls: Vec<(String, String)> = Vec::new();
    for (prefix, uri) in visible {
        let already = rendered.get(&prefix);
        let needed = if prefix.is_empty() && uri.is_empty() {
            // xmlns="" only when an ancestor rendered a non-empty default
            already.is_some_and(|u| !u.is_empty())
        } else {
            already != Some(&uri)
        };
        if needed {
            scope.insert(prefix.clone(), uri.clone());
            decls.push((prefix, uri));
        }
    }

    let qname = element.qname();
    out.push('<');
    out.push_str(&qname);

    // BTreeMap iteration already sorts by prefix with the default first.
    for (prefix, uri) in &decls {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape_attr(uri));
        out.push('"');
    }

    let mut attrs: Vec<_> = element.attributes.iter().collect();
    attrs.sort_by(|a, b| {
        let ka = (a.namespace.as_deref().unwrap_or(""), a.local_name.as_str());
        let kb = (b.namespace.as_deref().unwrap_or(""), b.local_name.as_str());
        ka.cmp(&kb)
    });
    for attr in attrs {
        out.push(' ');
        if let Some(p) = &attr.prefix {
            out.push_str(p);
            out.push(':');
        }
        out.push_str(&attr.local_name);
        out.push_str("=\"");
        out.push_str(&escape_attr(&attr.value));
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => write_element(e, &scope, &in_scope, inclusive, out),
            Node::Text(t) => out.push_str(&escape_text(t)),
            Node::ProcessingInstruction(p) => {
                out.push_str("<?");
                out.push_str(p);
                out.push_str("?>");
            }
            Node::Comment(_) => {}
        }
    }

    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn empty_elements_are_expanded_and_attributes_sorted() {
        let root = parse(r#"<doc b="2" a="1"><e/></doc>"#).unwrap();
        assert_eq!(canonicalize(&root), r#"<doc a="1" b="2"><e></e></doc>"#);
    }

    #[test]
    fn unused_namespaces_are_dropped() {
        let root = parse(r#"<a:x xmlns:a="urn:a" xmlns:b="urn:b"><a:y/></a:x>"#).unwrap();
        assert_eq!(canonicalize(&root), r#"<a:x xmlns:a="urn:a"><a:y></a:y></a:x>"#);
    }

    #[test]
    fn subtree_pulls_in_ancestor_namespaces() {
        let root = parse(
            r#"<a:x xmlns:a="urn:a" xmlns:b="urn:b"><b:y b:attr="v"><a:z/></b:y></a:x>"#,
        )
        .unwrap();
        let sub = root.elements().next().unwrap();
        assert_eq!(
            canonicalize(sub),
            r#"<b:y xmlns:b="urn:b" b:attr="v"><a:z xmlns:a="urn:a"></a:z></b:y>"#
        );
    }

    #[test]
    fn namespaced_attributes_sort_after_plain_ones() {
        let root = parse(r#"<e xmlns:n="urn:n" n:z="1" b="2" a="3"/>"#).unwrap();
        assert_eq!(
            canonicalize(&root),
            r#"<e xmlns:n="urn:n" a="3" b="2" n:z="1"></e>"#
        );
    }

    #[test]
    fn default_namespace_undeclared_when_needed() {
        let root = parse(r#"<x xmlns="urn:d"><y xmlns=""/></x>"#).unwrap();
        assert_eq!(
            canonicalize(&root),
            r#"<x xmlns="urn:d"><y xmlns=""></y></x>"#
        );
    }

    #[test]
    fn escaping_and_comments() {
        let root = parse("<r a=\"&lt;&quot;&#xA;\">&amp;&gt;&#xD;<!-- gone --></r>").unwrap();
        assert_eq!(
            canonicalize(&root),
            "<r a=\"&lt;&quot;&#xA;\">&amp;&gt;&#xD;</r>"
        );
    }

    #[test]
    fn inclusive_prefixes_come_from_context() {
        let root = parse(
            r#"<r xmlns="urn:d" xmlns:xs="urn:xs" xmlns:o="urn:o"><s:a xmlns:s="urn:s"><s:b>xs:string</s:b></s:a></r>"#,
        )
        .unwrap();
        let sub = root.elements().next().unwrap();
        assert_eq!(
            canonicalize(sub),
            r#"<s:a xmlns:s="urn:s"><s:b>xs:string</s:b></s:a>"#
        );

        let inclusive = parse_prefix_list("xs #default missing");
        assert_eq!(inclusive, vec!["xs", "", "missing"]);
        assert_eq!(
            canonicalize_with(sub, &inclusive, &root.namespaces),
            r#"<s:a xmlns="urn:d" xmlns:s="urn:s" xmlns:xs="urn:xs"><s:b>xs:string</s:b></s:a>"#
        );
    }

    #[test]
    fn whitespace_is_preserved() {
        let root = parse("<r>\n  <c>t</c>\n</r>").unwrap();
        assert_eq!(canonicalize(&root), "<r>\n  <c>t</c>\n</r>");
    }
}
