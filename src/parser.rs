//! Schema-driven streaming parser for both XML grammars.
//!
//! The parser is a shift-reduce stack machine driven by SAX-style events
//! from `quick_xml`: every element start pushes a type-tagged node after
//! interning its attributes against the schema tables, every element end
//! folds the children on top of the stack into their parent according to a
//! fixed per-element reduction rule. Multi-child reductions inspect the
//! *type* of the next stack entry rather than its position, so
//! schema-permitted reordering of optional sections is tolerated while any
//! unknown ordering stops the parse.
//!
//! All parser state (reduction stack, in-flight text buffer) lives in a
//! [`ParserSession`], so sessions are reusable and the parser is testable
//! without touching the file system.

use crate::ast::{
    AstNode, CoSimulation, Component, Connection, Element, Graph, ListElement, ModelDescription,
    Port, ScalarVariable, TypeDef,
};
use crate::schema::{AstKind, Att, Elm};
use anyhow::Context;
use camino::Utf8Path;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::Read;
use thiserror::Error;

/// Errors that stop a parse immediately. The partially built AST is dropped.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("non-UTF-8 markup: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("illegal element {0}")]
    UnknownElement(String),
    #[error("illegal attribute {0}")]
    UnknownAttribute(String),
    #[error("wrong element type, expected {expected}, found {found}")]
    WrongChildType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("illegal document structure, expected {expected}")]
    Structure { expected: &'static str },
    #[error("document root is not {expected}")]
    WrongRoot { expected: &'static str },
}

/// One parse in flight: the reduction stack plus the text buffer for the
/// single content-bearing element kind (`Name`).
#[derive(Default)]
pub struct ParserSession {
    stack: Vec<AstNode>,
    text: Option<String>,
    recording: bool,
}

impl ParserSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a complete document through the session and return the root node.
    fn parse_document(&mut self, xml: &str) -> Result<AstNode, ParseError> {
        self.stack.clear();
        self.text = None;
        self.recording = false;

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    let mut element = self.open_element(&name)?;
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = std::str::from_utf8(attr.key.as_ref())?;
                        let att = Att::from_name(key)
                            .ok_or_else(|| ParseError::UnknownAttribute(key.to_string()))?;
                        element
                            .attributes
                            .insert(att, attr.unescape_value()?.into_owned());
                    }
                    self.stack.push(AstNode::Element(element));
                }
                Event::Empty(e) => {
                    // self-closing element: start immediately followed by end
                    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    let mut element = self.open_element(&name)?;
                    let kind = element.kind;
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = std::str::from_utf8(attr.key.as_ref())?;
                        let att = Att::from_name(key)
                            .ok_or_else(|| ParseError::UnknownAttribute(key.to_string()))?;
                        element
                            .attributes
                            .insert(att, attr.unescape_value()?.into_owned());
                    }
                    self.stack.push(AstNode::Element(element));
                    self.reduce(kind)?;
                }
                Event::End(e) => {
                    let qname = e.name();
                    let name = std::str::from_utf8(qname.as_ref())?;
                    let kind = Elm::from_name(name)
                        .ok_or_else(|| ParseError::UnknownElement(name.to_string()))?;
                    self.reduce(kind)?;
                }
                Event::Text(t) => {
                    if self.recording {
                        let chunk = t.xml_content().map_err(quick_xml::Error::from)?;
                        self.text.get_or_insert_with(String::new).push_str(&chunk);
                    }
                }
                Event::Eof => break,
                // declarations, comments, processing instructions
                _ => {}
            }
        }

        if self.stack.len() != 1 {
            return Err(ParseError::Structure {
                expected: "a single document root",
            });
        }
        Ok(self.stack.remove(0))
    }

    fn open_element(&mut self, name: &str) -> Result<Element, ParseError> {
        let kind =
            Elm::from_name(name).ok_or_else(|| ParseError::UnknownElement(name.to_string()))?;
        // element content is recorded only inside Name
        self.recording = kind == Elm::Name;
        if kind == Elm::Name {
            self.text = None;
        }
        Ok(Element::new(kind))
    }

    // ── stack helpers ───────────────────────────────────────────────────────

    fn pop(&mut self, expected: &'static str) -> Result<AstNode, ParseError> {
        self.stack.pop().ok_or(ParseError::Structure { expected })
    }

    /// Pop the open (not yet reduced) element of the given kind that starts
    /// the current reduction. Anything else is a structure error.
    fn pop_open(&mut self, kind: Elm) -> Result<Element, ParseError> {
        match self.pop(kind.name())? {
            AstNode::Element(e) if e.kind == kind => Ok(e),
            other => Err(ParseError::WrongChildType {
                expected: kind.name(),
                found: other.kind().name(),
            }),
        }
    }

    /// Pop one reduced child that must be a plain element of the given kind.
    fn pop_child_element(&mut self, kind: Elm) -> Result<Element, ParseError> {
        match self.pop(kind.name())? {
            AstNode::Element(e) if e.kind == kind => Ok(e),
            other => Err(ParseError::WrongChildType {
                expected: kind.name(),
                found: other.kind().name(),
            }),
        }
    }

    /// Pop contiguous same-typed children off the stack, restoring document
    /// order. This is the list-reduction primitive: it stops at the first
    /// entry of a different type (normally the open list element itself).
    fn pop_while(&mut self, child: Elm) -> Vec<AstNode> {
        let mut children = Vec::new();
        while self.stack.last().is_some_and(|n| n.kind() == child) {
            if let Some(node) = self.stack.pop() {
                children.push(node);
            }
        }
        children.reverse();
        children
    }

    /// Fold a list element: pop its same-typed children, then the open
    /// element beneath them.
    fn reduce_list(&mut self, kind: Elm, child: Elm) -> Result<(), ParseError> {
        let children = self.pop_while(child);
        let element = self.pop_open(kind)?;
        self.stack
            .push(AstNode::List(ListElement { element, children }));
        Ok(())
    }

    /// Peek at the top node's kind without popping.
    fn peek_kind(&self) -> Option<Elm> {
        self.stack.last().map(AstNode::kind)
    }

    // ── reduction rules ─────────────────────────────────────────────────────

    fn reduce(&mut self, kind: Elm) -> Result<(), ParseError> {
        match kind {
            Elm::FmiModelDescription => self.reduce_model_description(),
            Elm::Implementation => {
                // transparent wrapper around the CoSimulation block
                let child = self.pop("Implementation content")?;
                let _wrapper = self.pop_open(Elm::Implementation)?;
                self.stack.push(child);
                Ok(())
            }
            Elm::CoSimulationStandAlone => {
                let capabilities = self.pop_child_element(Elm::Capabilities)?;
                let element = self.pop_open(Elm::CoSimulationStandAlone)?;
                self.stack.push(AstNode::CoSimulation(CoSimulation {
                    element,
                    capabilities,
                    model: None,
                }));
                Ok(())
            }
            Elm::CoSimulationTool => {
                let model = match self.pop("Model")? {
                    AstNode::List(l) if l.element.kind == Elm::Model => l,
                    other => {
                        return Err(ParseError::WrongChildType {
                            expected: "Model",
                            found: other.kind().name(),
                        });
                    }
                };
                let capabilities = self.pop_child_element(Elm::Capabilities)?;
                let element = self.pop_open(Elm::CoSimulationTool)?;
                self.stack.push(AstNode::CoSimulation(CoSimulation {
                    element,
                    capabilities,
                    model: Some(model),
                }));
                Ok(())
            }
            Elm::Type => self.reduce_type(),
            Elm::ScalarVariable => self.reduce_scalar_variable(),
            Elm::ModelVariables => self.reduce_list(kind, Elm::ScalarVariable),
            Elm::VendorAnnotations => self.reduce_list(kind, Elm::Tool),
            Elm::Tool => self.reduce_list(kind, Elm::Annotation),
            Elm::TypeDefinitions => self.reduce_list(kind, Elm::Type),
            Elm::EnumerationType => self.reduce_list(kind, Elm::Item),
            Elm::UnitDefinitions => self.reduce_list(kind, Elm::BaseUnit),
            Elm::BaseUnit => self.reduce_list(kind, Elm::DisplayUnitDefinition),
            Elm::DirectDependency => self.reduce_list(kind, Elm::Name),
            Elm::Model => self.reduce_list(kind, Elm::File),
            Elm::Name => {
                // the one element whose value is text content, not an attribute
                let mut element = self.pop_open(Elm::Name)?;
                let text = self.text.take().unwrap_or_default();
                element.attributes.insert(Att::Input, text);
                self.recording = false;
                self.stack.push(AstNode::Element(element));
                Ok(())
            }

            // component graph
            Elm::Graph => self.reduce_graph(),
            Elm::Component => self.reduce_component(),
            Elm::Components => self.reduce_list(kind, Elm::Component),
            Elm::Inputs => self.reduce_list(kind, Elm::Port),
            Elm::Outputs => self.reduce_list(kind, Elm::Port),
            Elm::Connections => self.reduce_list(kind, Elm::Connection),
            Elm::Connection => {
                let element = self.pop_open(Elm::Connection)?;
                self.stack
                    .push(AstNode::Connection(Connection { element, cell: None }));
                Ok(())
            }
            Elm::Port => {
                let element = self.pop_open(Elm::Port)?;
                self.stack.push(AstNode::Port(Port {
                    element,
                    connection: None,
                    variable: None,
                }));
                Ok(())
            }

            // leaf elements stay on the stack as reduced plain elements
            leaf => {
                debug_assert_eq!(leaf.ast_kind(), AstKind::Element);
                match self.peek_kind() {
                    Some(k) if k == leaf => Ok(()),
                    _ => Err(ParseError::Structure {
                        expected: leaf.name(),
                    }),
                }
            }
        }
    }

    /// Fold the optional sections of the root element. Sections may appear
    /// in any schema-permitted order; each is recognized by the type of the
    /// next stack entry.
    fn reduce_model_description(&mut self) -> Result<(), ParseError> {
        let mut cosimulation = None;
        let mut model_variables = None;
        let mut vendor_annotations = None;
        let mut default_experiment = None;
        let mut type_definitions = None;
        let mut unit_definitions = None;

        let mut node = self.pop("fmiModelDescription content")?;
        if let AstNode::CoSimulation(cs) = node {
            cosimulation = Some(cs);
            node = self.pop("fmiModelDescription content")?;
        }
        if node.kind() == Elm::ModelVariables {
            model_variables = Some(into_variables(node)?);
            node = self.pop("fmiModelDescription content")?;
        }
        if node.kind() == Elm::VendorAnnotations {
            vendor_annotations = Some(into_lists(node)?);
            node = self.pop("fmiModelDescription content")?;
        }
        if node.kind() == Elm::DefaultExperiment {
            if let AstNode::Element(e) = node {
                default_experiment = Some(e);
            }
            node = self.pop("fmiModelDescription content")?;
        }
        if node.kind() == Elm::TypeDefinitions {
            type_definitions = Some(into_types(node)?);
            node = self.pop("fmiModelDescription content")?;
        }
        if node.kind() == Elm::UnitDefinitions {
            unit_definitions = Some(into_lists(node)?);
            node = self.pop("fmiModelDescription content")?;
        }
        // tolerate exporters that misplace Implementation before the
        // variable sections (seen in the wild with SimulationX 3.4/3.5)
        if cosimulation.is_none() {
            if let AstNode::CoSimulation(cs) = node {
                cosimulation = Some(cs);
                node = self.pop("fmiModelDescription content")?;
            }
        }

        let element = match node {
            AstNode::Element(e) if e.kind == Elm::FmiModelDescription => e,
            other => {
                return Err(ParseError::WrongChildType {
                    expected: "fmiModelDescription",
                    found: other.kind().name(),
                });
            }
        };
        self.stack.push(AstNode::ModelDescription(ModelDescription {
            element,
            unit_definitions,
            type_definitions,
            default_experiment,
            vendor_annotations,
            model_variables,
            cosimulation,
        }));
        Ok(())
    }

    fn reduce_type(&mut self) -> Result<(), ParseError> {
        let (spec, items) = match self.pop("type spec")? {
            AstNode::Element(e)
                if matches!(
                    e.kind,
                    Elm::RealType | Elm::IntegerType | Elm::BooleanType | Elm::StringType
                ) =>
            {
                (e, Vec::new())
            }
            AstNode::List(l) if l.element.kind == Elm::EnumerationType => {
                let items = into_elements(l.children, "Item")?;
                (l.element, items)
            }
            other => {
                return Err(ParseError::WrongChildType {
                    expected: "RealType or similar",
                    found: other.kind().name(),
                });
            }
        };
        let element = self.pop_open(Elm::Type)?;
        self.stack.push(AstNode::Type(TypeDef {
            element,
            spec,
            items,
        }));
        Ok(())
    }

    fn reduce_scalar_variable(&mut self) -> Result<(), ParseError> {
        let mut direct_dependencies = None;
        let mut node = self.pop("ScalarVariable content")?;
        if node.kind() == Elm::DirectDependency {
            if let AstNode::List(l) = node {
                direct_dependencies = Some(into_elements(l.children, "Name")?);
            }
            node = self.pop("ScalarVariable content")?;
        }
        let type_spec = match node {
            AstNode::Element(e)
                if matches!(
                    e.kind,
                    Elm::Real | Elm::Integer | Elm::Boolean | Elm::String | Elm::Enumeration
                ) =>
            {
                e
            }
            other => {
                return Err(ParseError::WrongChildType {
                    expected: "Real or similar",
                    found: other.kind().name(),
                });
            }
        };
        let element = self.pop_open(Elm::ScalarVariable)?;
        self.stack.push(AstNode::Variable(ScalarVariable {
            element,
            type_spec,
            direct_dependencies,
        }));
        Ok(())
    }

    fn reduce_graph(&mut self) -> Result<(), ParseError> {
        let mut components = Vec::new();
        let mut connections = Vec::new();

        let mut node = self.pop("Graph content")?;
        if node.kind() == Elm::Connections {
            connections = into_connections(node)?;
            node = self.pop("Graph content")?;
        }
        if node.kind() == Elm::Components {
            components = into_components(node)?;
            node = self.pop("Graph content")?;
        }
        let element = match node {
            AstNode::Element(e) if e.kind == Elm::Graph => e,
            other => {
                return Err(ParseError::WrongChildType {
                    expected: "Graph",
                    found: other.kind().name(),
                });
            }
        };
        self.stack.push(AstNode::Graph(Graph {
            element,
            components,
            connections,
        }));
        Ok(())
    }

    fn reduce_component(&mut self) -> Result<(), ParseError> {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();

        let mut node = self.pop("Component content")?;
        if node.kind() == Elm::Outputs {
            outputs = into_ports(node)?;
            node = self.pop("Component content")?;
        }
        if node.kind() == Elm::Inputs {
            inputs = into_ports(node)?;
            node = self.pop("Component content")?;
        }
        let element = match node {
            AstNode::Element(e) if e.kind == Elm::Component => e,
            other => {
                return Err(ParseError::WrongChildType {
                    expected: "Component",
                    found: other.kind().name(),
                });
            }
        };
        self.stack.push(AstNode::Component(Component {
            element,
            inputs,
            outputs,
        }));
        Ok(())
    }
}

// ── list-children downcasts ─────────────────────────────────────────────────

fn list_children(node: AstNode) -> Vec<AstNode> {
    match node {
        AstNode::List(l) => l.children,
        _ => Vec::new(),
    }
}

fn into_variables(node: AstNode) -> Result<Vec<ScalarVariable>, ParseError> {
    list_children(node)
        .into_iter()
        .map(|n| match n {
            AstNode::Variable(v) => Ok(v),
            other => Err(ParseError::WrongChildType {
                expected: "ScalarVariable",
                found: other.kind().name(),
            }),
        })
        .collect()
}

fn into_types(node: AstNode) -> Result<Vec<TypeDef>, ParseError> {
    list_children(node)
        .into_iter()
        .map(|n| match n {
            AstNode::Type(t) => Ok(t),
            other => Err(ParseError::WrongChildType {
                expected: "Type",
                found: other.kind().name(),
            }),
        })
        .collect()
}

fn into_lists(node: AstNode) -> Result<Vec<ListElement>, ParseError> {
    list_children(node)
        .into_iter()
        .map(|n| match n {
            AstNode::List(l) => Ok(l),
            other => Err(ParseError::WrongChildType {
                expected: "list element",
                found: other.kind().name(),
            }),
        })
        .collect()
}

fn into_elements(
    children: Vec<AstNode>,
    expected: &'static str,
) -> Result<Vec<Element>, ParseError> {
    children
        .into_iter()
        .map(|n| match n {
            AstNode::Element(e) => Ok(e),
            other => Err(ParseError::WrongChildType {
                expected,
                found: other.kind().name(),
            }),
        })
        .collect()
}

fn into_components(node: AstNode) -> Result<Vec<Component>, ParseError> {
    list_children(node)
        .into_iter()
        .map(|n| match n {
            AstNode::Component(c) => Ok(c),
            other => Err(ParseError::WrongChildType {
                expected: "Component",
                found: other.kind().name(),
            }),
        })
        .collect()
}

fn into_ports(node: AstNode) -> Result<Vec<Port>, ParseError> {
    list_children(node)
        .into_iter()
        .map(|n| match n {
            AstNode::Port(p) => Ok(p),
            other => Err(ParseError::WrongChildType {
                expected: "Port",
                found: other.kind().name(),
            }),
        })
        .collect()
}

fn into_connections(node: AstNode) -> Result<Vec<Connection>, ParseError> {
    list_children(node)
        .into_iter()
        .map(|n| match n {
            AstNode::Connection(c) => Ok(c),
            other => Err(ParseError::WrongChildType {
                expected: "Connection",
                found: other.kind().name(),
            }),
        })
        .collect()
}

// ── entry points ────────────────────────────────────────────────────────────

/// Parse a component-description document. Semantic validation (declared
/// type resolution) is a separate pass, see [`crate::validator`].
pub fn parse_model_description(xml: &str) -> Result<ModelDescription, ParseError> {
    match ParserSession::new().parse_document(xml)? {
        AstNode::ModelDescription(md) => Ok(md),
        _ => Err(ParseError::WrongRoot {
            expected: "fmiModelDescription",
        }),
    }
}

/// Parse a wiring document. Connection resolution and value-cell allocation
/// are a separate pass, see [`crate::validator`].
pub fn parse_graph(xml: &str) -> Result<Graph, ParseError> {
    match ParserSession::new().parse_document(xml)? {
        AstNode::Graph(g) => Ok(g),
        _ => Err(ParseError::WrongRoot { expected: "Graph" }),
    }
}

// ── document sources ────────────────────────────────────────────────────────

/// Where document text comes from. Lets the loader read a description out
/// of a packed bundle and lets tests feed documents from memory.
pub trait ContentSource {
    fn read_to_string(&mut self, path: &Utf8Path) -> anyhow::Result<String>;
}

/// Plain filesystem source.
pub struct FsSource;

impl ContentSource for FsSource {
    fn read_to_string(&mut self, path: &Utf8Path) -> anyhow::Result<String> {
        std::fs::read_to_string(path.as_str()).with_context(|| format!("Failed to read {path}"))
    }
}

/// Reads entries out of a zip archive, e.g. `modelDescription.xml` from a
/// packed `.fmu` bundle.
pub struct ZipSource<R: Read + std::io::Seek> {
    zip: zip::ZipArchive<R>,
}

impl<R: Read + std::io::Seek> ZipSource<R> {
    pub fn new(reader: R) -> anyhow::Result<Self> {
        let zip = zip::ZipArchive::new(reader).context("Failed to open zip archive")?;
        Ok(Self { zip })
    }
}

impl<R: Read + std::io::Seek> ContentSource for ZipSource<R> {
    fn read_to_string(&mut self, path: &Utf8Path) -> anyhow::Result<String> {
        let p = path.as_str().trim_start_matches("./").trim_start_matches('/');
        let mut f = self
            .zip
            .by_name(p)
            .with_context(|| format!("File {p} not found in archive"))?;
        let mut s = String::new();
        f.read_to_string(&mut s)
            .with_context(|| format!("Failed to read {p} from archive"))?;
        Ok(s)
    }
}
