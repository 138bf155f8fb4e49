//! Event sources for the validation engine
//!
//! Three ways to feed a [`ValidationContext`]:
//!
//! - a walk over a parsed [`Document`] ([`validate_tree`]), which can write
//!   schema defaults back into the tree;
//! - a pull reader ([`PullReader`], implemented over quick-xml by
//!   [`XmlPullReader`]) driven by [`validate_pull`];
//! - SAX callbacks: [`ValidatingHandler`] wraps a user [`SaxHandler`],
//!   forwards every callback to it unchanged and validates on the side.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::documents::{Attribute, Document, NodeId, NodeKind};
use crate::error::{Error, ParseError, Result};
use crate::namespaces::{NamespaceContext, QName};

use super::validation::{Position, ValidationContext, ValidationReport};

/// Defaults collected during a tree walk, applied once the walk is over
#[derive(Debug, Default)]
pub(crate) struct Injections {
    attributes: Vec<(NodeId, Attribute)>,
    texts: Vec<(NodeId, String)>,
}

impl Injections {
    /// Write the collected defaults into the tree
    pub(crate) fn apply(self, document: &mut Document) {
        for (node, attribute) in self.attributes {
            document.set_attribute(node, attribute);
        }
        for (node, text) in self.texts {
            document.append_text(node, text);
        }
    }
}

enum Step {
    Enter(NodeId),
    Leave(NodeId),
}

/// Validate the subtree rooted at `node`, collecting the defaults the
/// schema supplies
pub(crate) fn validate_tree(
    context: &mut ValidationContext<'_>,
    document: &Document,
    node: NodeId,
) -> Result<Injections> {
    let mut injections = Injections::default();
    let mut steps = vec![Step::Enter(node)];

    while let Some(step) = steps.pop() {
        match step {
            Step::Enter(id) => {
                let n = document.node(id);
                match &n.kind {
                    NodeKind::Element(data) => {
                        let position = Position::new(n.line, n.column);
                        let defaults =
                            context.start_element(&data.name, &data.attributes, &data.namespaces, position)?;
                        injections
                            .attributes
                            .extend(defaults.into_iter().map(|attribute| (id, attribute)));
                        steps.push(Step::Leave(id));
                        steps.extend(n.children.iter().rev().map(|&child| Step::Enter(child)));
                    }
                    NodeKind::Text(text) => context.characters(text),
                    NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. } => {}
                }
            }
            Step::Leave(id) => {
                if let Some(text) = context.end_element()? {
                    injections.texts.push((id, text));
                }
            }
        }
    }
    Ok(injections)
}

/// Kind of the event a pull reader is positioned on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Start tag (empty elements produce a start and an end)
    Start,
    /// End tag
    End,
    /// Character data
    Text,
    /// Anything the validator ignores
    Other,
}

/// A cursor over the events of an XML document
pub trait PullReader {
    /// Advance to the next event; `false` at the end of the document
    fn read(&mut self) -> Result<bool>;
    /// Kind of the current event
    fn node_type(&self) -> NodeType;
    /// Number of open elements, the current one included for a start tag
    fn depth(&self) -> usize;
    /// Element name of a start or end tag
    fn name(&self) -> Option<&QName>;
    /// Attributes of a start tag, namespace declarations excluded
    fn attributes(&self) -> &[Attribute];
    /// In-scope namespace bindings
    fn namespaces(&self) -> &NamespaceContext;
    /// Character data of a text event
    fn value(&self) -> &str;
    /// Position of the current event
    fn position(&self) -> Position;
}

/// Feed a pull reader through a validation context
pub fn validate_pull<R: PullReader>(context: &mut ValidationContext<'_>, reader: &mut R) -> Result<()> {
    while reader.read()? {
        match reader.node_type() {
            NodeType::Start => {
                let name = reader
                    .name()
                    .ok_or_else(|| Error::Internal("start event without an element name".into()))?;
                context.start_element(name, reader.attributes(), reader.namespaces(), reader.position())?;
            }
            NodeType::End => {
                context.end_element()?;
            }
            NodeType::Text => context.characters(reader.value()),
            NodeType::Other => {}
        }
    }
    Ok(())
}

/// [`PullReader`] over an in-memory document, backed by quick-xml
pub struct XmlPullReader<'a> {
    reader: Reader<&'a [u8]>,
    source: &'a str,
    location: Option<String>,
    buf: Vec<u8>,
    document_scope: NamespaceContext,
    scopes: Vec<NamespaceContext>,
    names: Vec<QName>,
    node_type: NodeType,
    name: Option<QName>,
    attributes: Vec<Attribute>,
    value: String,
    position: Position,
    pending_end: bool,
    root_closed: bool,
    // incremental offset -> line/column conversion
    cursor: (usize, u32, u32),
}

impl<'a> XmlPullReader<'a> {
    /// Reader over `xml`
    pub fn new(xml: &'a str) -> Self {
        let mut reader = Reader::from_reader(xml.as_bytes());
        reader.trim_text(false);
        reader.check_end_names(true);
        Self {
            reader,
            source: xml,
            location: None,
            buf: Vec::new(),
            document_scope: NamespaceContext::new(),
            scopes: Vec::new(),
            names: Vec::new(),
            node_type: NodeType::Other,
            name: None,
            attributes: Vec::new(),
            value: String::new(),
            position: Position::default(),
            pending_end: false,
            root_closed: false,
            cursor: (0, 1, 1),
        }
    }

    /// Name the document in parse errors
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn locate(&mut self, offset: usize) -> Position {
        let (start, mut line, mut column) = self.cursor;
        if offset >= start {
            let end = offset.min(self.source.len());
            for ch in self.source.as_bytes()[start..end].iter() {
                if *ch == b'\n' {
                    line += 1;
                    column = 1;
                } else if *ch & 0xC0 != 0x80 {
                    column += 1;
                }
            }
            self.cursor = (end, line, column);
        }
        Position::new(line, column)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let mut error = ParseError::new(message).with_position(self.position.line, self.position.column);
        if let Some(location) = &self.location {
            error = error.with_location(location.clone());
        }
        Error::Parse(error)
    }

    fn start(&mut self, start: &BytesStart<'_>) -> Result<()> {
        if self.root_closed {
            return Err(self.error("content after the document element"));
        }
        let mut namespaces = self.scopes.last().unwrap_or(&self.document_scope).clone();
        let mut raw = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.error(e.to_string()))?;
            let key = utf8(attr.key.as_ref()).map_err(|m| self.error(m))?.to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| self.error(format!("failed to unescape attribute value: {}", e)))?
                .into_owned();
            if key == "xmlns" {
                namespaces.set_default_namespace(value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                namespaces.add_prefix(prefix, value);
            } else {
                raw.push((key, value));
            }
        }

        let tag = utf8(start.name().as_ref()).map_err(|m| self.error(m))?.to_string();
        let name = namespaces
            .resolve(&tag)
            .map_err(|e| self.error(format!("element '{}': {}", tag, e)))?;
        let mut attributes = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let name = if key.contains(':') {
                namespaces
                    .resolve(&key)
                    .map_err(|e| self.error(format!("attribute '{}': {}", key, e)))?
            } else {
                QName::local(key)
            };
            if attributes.iter().any(|a: &Attribute| a.name == name) {
                return Err(self.error(format!("duplicate attribute '{}'", name)));
            }
            attributes.push(Attribute::new(name, value));
        }

        self.node_type = NodeType::Start;
        self.names.push(name.clone());
        self.name = Some(name);
        self.attributes = attributes;
        self.scopes.push(namespaces);
        Ok(())
    }

    fn end(&mut self) {
        self.node_type = NodeType::End;
        self.attributes.clear();
        self.name = self.names.pop();
        self.scopes.pop();
        if self.names.is_empty() {
            self.root_closed = true;
        }
    }

    fn text(&mut self, text: String) -> Result<()> {
        if self.names.is_empty() {
            if text.trim().is_empty() {
                self.node_type = NodeType::Other;
                return Ok(());
            }
            return Err(self.error("character data outside the document element"));
        }
        self.node_type = NodeType::Text;
        self.value = text;
        Ok(())
    }
}

fn utf8(bytes: &[u8]) -> std::result::Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))
}

impl PullReader for XmlPullReader<'_> {
    fn read(&mut self) -> Result<bool> {
        self.value.clear();
        if self.pending_end {
            self.pending_end = false;
            self.end();
            return Ok(true);
        }
        let offset = self.reader.buffer_position();
        self.position = self.locate(offset);
        self.buf.clear();
        let event = match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => event.into_owned(),
            Err(e) => {
                let offset = self.reader.buffer_position();
                self.position = self.locate(offset);
                return Err(self.error(e.to_string()));
            }
        };
        match event {
            Event::Start(start) => self.start(&start)?,
            Event::Empty(start) => {
                self.start(&start)?;
                self.pending_end = true;
            }
            Event::End(_) => self.end(),
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| self.error(format!("failed to unescape text: {}", e)))?
                    .into_owned();
                self.text(text)?;
            }
            Event::CData(data) => {
                let text = utf8(&data.into_inner()).map_err(|m| self.error(m))?.to_string();
                self.text(text)?;
            }
            Event::Eof => {
                if !self.names.is_empty() {
                    return Err(self.error(format!(
                        "unexpected end of document, {} element(s) not closed",
                        self.names.len()
                    )));
                }
                if !self.root_closed {
                    return Err(self.error("no document element"));
                }
                return Ok(false);
            }
            Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => {
                self.node_type = NodeType::Other;
            }
        }
        Ok(true)
    }

    fn node_type(&self) -> NodeType {
        self.node_type
    }

    fn depth(&self) -> usize {
        self.names.len()
    }

    fn name(&self) -> Option<&QName> {
        self.name.as_ref()
    }

    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    fn namespaces(&self) -> &NamespaceContext {
        self.scopes.last().unwrap_or(&self.document_scope)
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn position(&self) -> Position {
        self.position
    }
}

/// SAX-style callbacks
///
/// Every method has an empty default so handlers only implement what they
/// need. An `Err` aborts the parse.
pub trait SaxHandler {
    /// Position of the next event, when the parser knows it
    fn set_document_locator(&mut self, _position: Position) {}

    /// An element starts
    fn start_element(&mut self, _name: &QName, _attributes: &[Attribute], _namespaces: &NamespaceContext) -> Result<()> {
        Ok(())
    }

    /// Character data
    fn characters(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// An element ends
    fn end_element(&mut self, _name: &QName) -> Result<()> {
        Ok(())
    }
}

/// Drive a SAX handler over an XML string
pub fn parse_sax<H: SaxHandler>(xml: &str, handler: &mut H) -> Result<()> {
    let mut reader = XmlPullReader::new(xml);
    while reader.read()? {
        handler.set_document_locator(reader.position());
        match reader.node_type() {
            NodeType::Start => {
                if let Some(name) = reader.name() {
                    handler.start_element(name, reader.attributes(), reader.namespaces())?;
                }
            }
            NodeType::End => {
                if let Some(name) = reader.name() {
                    handler.end_element(name)?;
                }
            }
            NodeType::Text => handler.characters(reader.value())?,
            NodeType::Other => {}
        }
    }
    Ok(())
}

/// A [`SaxHandler`] that validates while forwarding every callback to the
/// wrapped handler. With `inject_defaults` the wrapped handler also sees
/// defaulted attributes and default element values.
pub struct ValidatingHandler<'s, H> {
    context: ValidationContext<'s>,
    inner: H,
    position: Position,
}

impl<'s, H: SaxHandler> ValidatingHandler<'s, H> {
    /// Wrap `inner`
    pub fn new(context: ValidationContext<'s>, inner: H) -> Self {
        Self {
            context,
            inner,
            position: Position::default(),
        }
    }

    /// The wrapped handler
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// The wrapped handler, mutably
    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.inner
    }

    /// End the run, returning the report and the wrapped handler
    pub fn finish(self) -> Result<(ValidationReport, H)> {
        let report = self.context.finish()?;
        Ok((report, self.inner))
    }
}

impl<H: SaxHandler> SaxHandler for ValidatingHandler<'_, H> {
    fn set_document_locator(&mut self, position: Position) {
        self.position = position;
        self.inner.set_document_locator(position);
    }

    fn start_element(&mut self, name: &QName, attributes: &[Attribute], namespaces: &NamespaceContext) -> Result<()> {
        let defaults = self
            .context
            .start_element(name, attributes, namespaces, self.position)?;
        if self.context.options().inject_defaults && !defaults.is_empty() {
            let mut all = attributes.to_vec();
            all.extend(defaults);
            self.inner.start_element(name, &all, namespaces)
        } else {
            self.inner.start_element(name, attributes, namespaces)
        }
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.context.characters(text);
        self.inner.characters(text)
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        if let Some(text) = self.context.end_element()? {
            if self.context.options().inject_defaults {
                self.inner.characters(&text)?;
            }
        }
        self.inner.end_element(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::exceptions::ErrorCode;
    use crate::validators::schemas::Schema;
    use crate::validators::validation::ValidationOptions;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            targetNamespace="urn:t" xmlns="urn:t" elementFormDefault="qualified">
        <xs:element name="config">
            <xs:complexType>
                <xs:sequence>
                    <xs:element name="port" type="xs:int" default="8080"/>
                </xs:sequence>
                <xs:attribute name="mode" type="xs:string" default="fast"/>
            </xs:complexType>
        </xs:element>
    </xs:schema>"#;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl SaxHandler for Recorder {
        fn start_element(&mut self, name: &QName, attributes: &[Attribute], _: &NamespaceContext) -> Result<()> {
            let attrs: Vec<String> = attributes.iter().map(|a| format!("{}={}", a.name, a.value)).collect();
            self.events.push(format!("start {} [{}]", name.local_name, attrs.join(",")));
            Ok(())
        }

        fn characters(&mut self, text: &str) -> Result<()> {
            if !text.trim().is_empty() {
                self.events.push(format!("text {}", text));
            }
            Ok(())
        }

        fn end_element(&mut self, name: &QName) -> Result<()> {
            self.events.push(format!("end {}", name.local_name));
            Ok(())
        }
    }

    #[test]
    fn test_pull_reader_events() {
        let xml = "<?xml version=\"1.0\"?>\n<a xmlns=\"urn:x\" xmlns:p=\"urn:p\" p:k=\"v\">\n  <b/>text<![CDATA[<raw>]]></a>";
        let mut reader = XmlPullReader::new(xml);
        let mut seen = Vec::new();
        while reader.read().unwrap() {
            match reader.node_type() {
                NodeType::Start => {
                    let name = reader.name().unwrap().clone();
                    seen.push(format!("start {} {}:{}", name, reader.position().line, reader.depth()));
                    for a in reader.attributes() {
                        seen.push(format!("attr {}={}", a.name, a.value));
                    }
                }
                NodeType::End => seen.push(format!("end {}", reader.name().unwrap())),
                NodeType::Text if !reader.value().trim().is_empty() => {
                    seen.push(format!("text {}", reader.value()))
                }
                _ => {}
            }
        }
        assert_eq!(
            seen,
            vec![
                "start {urn:x}a 2:1",
                "attr {urn:p}k=v",
                "start {urn:x}b 3:2",
                "end {urn:x}b",
                "text text",
                "text <raw>",
                "end {urn:x}a",
            ]
        );
    }

    #[test]
    fn test_malformed_documents() {
        for xml in ["<a>", "<a></b>", "", "<a/><b/>", "<p:a/>", "<a x='1' x='2'/>"] {
            let mut reader = XmlPullReader::new(xml);
            let result = loop {
                match reader.read() {
                    Ok(true) => continue,
                    other => break other,
                }
            };
            assert!(matches!(result, Err(Error::Parse(_))), "accepted {:?}", xml);
        }
    }

    #[test]
    fn test_parse_error_position() {
        let mut reader = XmlPullReader::new("<a>\n<b>\n</a>").with_location("bad.xml");
        let err = loop {
            match reader.read() {
                Ok(true) => continue,
                Ok(false) => panic!("accepted"),
                Err(e) => break e,
            }
        };
        let Error::Parse(parse) = err else { panic!("{:?}", err) };
        assert_eq!(parse.location.as_deref(), Some("bad.xml"));
        assert_eq!(parse.position.map(|p| p.0), Some(3));
    }

    #[test]
    fn test_tree_walk_injects_defaults() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let mut document = Document::from_string(r#"<config xmlns="urn:t"><port/></config>"#).unwrap();
        let options = ValidationOptions::new().with_inject_defaults(true);
        let report = schema.validate_document_mut(&mut document, options).unwrap();
        assert!(report.is_valid(), "{:?}", report.diagnostics);

        let root = document.root().unwrap();
        assert_eq!(document.attribute(root, None, "mode"), Some("fast"));
        let port = document.child_elements(root).next().unwrap();
        assert_eq!(document.text(port), "8080");
    }

    #[test]
    fn test_tree_walk_without_injection_leaves_tree_alone() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let mut document = Document::from_string(r#"<config xmlns="urn:t"><port/></config>"#).unwrap();
        let report = schema
            .validate_document_mut(&mut document, ValidationOptions::default())
            .unwrap();
        assert!(report.is_valid());
        let root = document.root().unwrap();
        assert_eq!(document.attribute(root, None, "mode"), None);
    }

    #[test]
    fn test_validating_handler_forwards_callbacks() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let xml = r#"<config xmlns="urn:t"><port>80</port></config>"#;

        let mut plain = Recorder::default();
        parse_sax(xml, &mut plain).unwrap();

        let mut handler = ValidatingHandler::new(schema.validator(ValidationOptions::default()), Recorder::default());
        parse_sax(xml, &mut handler).unwrap();
        let (report, recorder) = handler.finish().unwrap();
        assert!(report.is_valid());
        assert_eq!(recorder.events, plain.events);
    }

    #[test]
    fn test_validating_handler_injects_defaults() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let options = ValidationOptions::new().with_inject_defaults(true);
        let mut handler = ValidatingHandler::new(schema.validator(options), Recorder::default());
        parse_sax(r#"<config xmlns="urn:t"><port/></config>"#, &mut handler).unwrap();
        let (report, recorder) = handler.finish().unwrap();
        assert!(report.is_valid());
        assert_eq!(
            recorder.events,
            vec!["start config [mode=fast]", "start port []", "text 8080", "end port", "end config"]
        );
    }

    #[test]
    fn test_sax_errors_have_positions() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let mut handler = ValidatingHandler::new(schema.validator(ValidationOptions::default()), Recorder::default());
        parse_sax("<config xmlns=\"urn:t\">\n<port>x</port></config>", &mut handler).unwrap();
        let (report, _) = handler.finish().unwrap();
        assert_eq!(report.error_codes(), vec![ErrorCode::CvcDatatypeValid]);
        assert_eq!(report.diagnostics[0].line, Some(2));
    }
}
