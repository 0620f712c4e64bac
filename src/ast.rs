//! Typed AST for the two XML grammars, plus attribute accessors.
//!
//! The parser reduces every element into one of the node variants below. An
//! element's attribute names are interned against the fixed [`Att`] table;
//! values are owned strings, parsed on access. Every attribute read reports
//! one of `{missing, defined, illegal}` alongside the parsed value.

use crate::schema::{Att, Elm, Enu};
use indexmap::IndexMap;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;

/// FMI value reference: index of a variable within one of the four
/// per-type variable arrays of a slave.
pub type ValueReference = u32;

/// Marks a value reference as undefined (e.g. for alias bookkeeping).
pub const UNDEFINED_VALUE_REFERENCE: ValueReference = ValueReference::MAX;

// ────────────────────────────────────────────────────────────────────────────
// Attribute access
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of reading a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueStatus {
    Missing,
    Defined,
    Illegal,
}

/// An attribute read: the parsed value together with its [`ValueStatus`].
/// A present but unparsable value is `Illegal`, never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr<T> {
    Missing,
    Defined(T),
    Illegal,
}

impl<T> Attr<T> {
    pub fn status(&self) -> ValueStatus {
        match self {
            Attr::Missing => ValueStatus::Missing,
            Attr::Defined(_) => ValueStatus::Defined,
            Attr::Illegal => ValueStatus::Illegal,
        }
    }

    /// The value, if defined.
    pub fn defined(self) -> Option<T> {
        match self {
            Attr::Defined(v) => Some(v),
            _ => None,
        }
    }

    /// The value, or `default` when missing or illegal.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Attr::Defined(v) => v,
            _ => default,
        }
    }
}

impl<T> From<Option<T>> for Attr<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Attr::Defined(v),
            None => Attr::Illegal,
        }
    }
}

/// Grammar-fixed default for the built-in enumerated attributes.
fn enum_default(a: Att) -> Option<Enu> {
    match a {
        Att::VariableNamingConvention => Some(Enu::Flat),
        Att::Variability => Some(Enu::Continuous),
        Att::Causality => Some(Enu::Internal),
        Att::Alias => Some(Enu::NoAlias),
        _ => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Element
// ────────────────────────────────────────────────────────────────────────────

/// A plain element: its identity plus the ordered attribute map.
#[derive(Debug, Clone, Serialize)]
pub struct Element {
    pub kind: Elm,
    /// Ordered `(attribute, value)` pairs as they appeared in the document.
    pub attributes: IndexMap<Att, String>,
}

impl Element {
    pub fn new(kind: Elm) -> Self {
        Element {
            kind,
            attributes: IndexMap::new(),
        }
    }

    /// Raw string value of an attribute.
    pub fn string(&self, a: Att) -> Option<&str> {
        self.attributes.get(&a).map(String::as_str)
    }

    pub fn double(&self, a: Att) -> Attr<f64> {
        match self.string(a) {
            None => Attr::Missing,
            Some(v) => v.trim().parse::<f64>().ok().into(),
        }
    }

    pub fn int(&self, a: Att) -> Attr<i32> {
        match self.string(a) {
            None => Attr::Missing,
            Some(v) => v.trim().parse::<i32>().ok().into(),
        }
    }

    pub fn uint(&self, a: Att) -> Attr<u32> {
        match self.string(a) {
            None => Attr::Missing,
            Some(v) => v.trim().parse::<u32>().ok().into(),
        }
    }

    /// Boolean attributes use the XML literals `true` and `false` only.
    pub fn boolean(&self, a: Att) -> Attr<bool> {
        match self.string(a) {
            None => Attr::Missing,
            Some("true") => Attr::Defined(true),
            Some("false") => Attr::Defined(false),
            Some(_) => Attr::Illegal,
        }
    }

    /// Raw enumerated attribute read, no defaulting.
    pub fn enum_value(&self, a: Att) -> Attr<Enu> {
        match self.string(a) {
            None => Attr::Missing,
            Some(v) => Enu::from_name(v).into(),
        }
    }

    /// Enumerated attribute read with the grammar default applied when the
    /// attribute is missing. The status still reports `Missing` in that case,
    /// so callers can distinguish an explicit value from a defaulted one.
    pub fn enum_or_default(&self, a: Att) -> (Option<Enu>, ValueStatus) {
        match self.enum_value(a) {
            Attr::Missing => (enum_default(a), ValueStatus::Missing),
            Attr::Defined(e) => (Some(e), ValueStatus::Defined),
            Attr::Illegal => (None, ValueStatus::Illegal),
        }
    }

    /// The `name` attribute. Required on ScalarVariable, Type, Item,
    /// Annotation, Tool, Port and Connection; validated, so an empty string
    /// only appears on documents that failed validation.
    pub fn name(&self) -> &str {
        self.string(Att::Name).unwrap_or_default()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node variants
// ────────────────────────────────────────────────────────────────────────────

/// An element holding an ordered sequence of child nodes
/// (BaseUnit, EnumerationType, Tool, DirectDependency, Model, the section
/// containers, and the graph containers while on the parser stack).
#[derive(Debug, Clone, Serialize)]
pub struct ListElement {
    pub element: Element,
    pub children: Vec<AstNode>,
}

/// A named, reusable type definition (`Type` element). `spec` is one of
/// RealType, IntegerType, BooleanType, StringType or EnumerationType;
/// `items` carries the Item children of an EnumerationType spec.
#[derive(Debug, Clone, Serialize)]
pub struct TypeDef {
    pub element: Element,
    pub spec: Element,
    pub items: Vec<Element>,
}

/// A `ScalarVariable`: its attributes, exactly one type spec (Real, Integer,
/// Boolean, String or Enumeration) and the optional direct dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct ScalarVariable {
    pub element: Element,
    pub type_spec: Element,
    /// `Name` leaf elements; the referenced variable name is stored as the
    /// `input` attribute (names are the one text-content leaf of the grammar).
    pub direct_dependencies: Option<Vec<Element>>,
}

impl ScalarVariable {
    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn value_reference(&self) -> Option<ValueReference> {
        self.element.uint(Att::ValueReference).defined()
    }

    /// One of input, output, internal, none; `internal` when missing.
    pub fn causality(&self) -> Option<Enu> {
        self.element.enum_or_default(Att::Causality).0
    }

    /// One of constant, parameter, discrete, continuous; `continuous` when
    /// missing.
    pub fn variability(&self) -> Option<Enu> {
        self.element.enum_or_default(Att::Variability).0
    }

    /// One of noAlias, alias, negatedAlias; `noAlias` when missing.
    pub fn alias(&self) -> Option<Enu> {
        self.element.enum_or_default(Att::Alias).0
    }

    /// The wire type of this variable, from its type spec element.
    pub fn value_type(&self) -> Option<ValueType> {
        ValueType::from_type_spec(self.type_spec.kind)
    }
}

/// The lifecycle-capability block (`CoSimulation_StandAlone` or
/// `CoSimulation_Tool`); `model` is present for tool coupling only.
#[derive(Debug, Clone, Serialize)]
pub struct CoSimulation {
    pub element: Element,
    pub capabilities: Element,
    pub model: Option<ListElement>,
}

/// Root node of a parsed component description.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescription {
    pub element: Element,
    pub unit_definitions: Option<Vec<ListElement>>,
    pub type_definitions: Option<Vec<TypeDef>>,
    pub default_experiment: Option<Element>,
    pub vendor_annotations: Option<Vec<ListElement>>,
    /// Absent when the component exposes no variables at all.
    pub model_variables: Option<Vec<ScalarVariable>>,
    /// Absent when the description is for model exchange only.
    pub cosimulation: Option<CoSimulation>,
}

/// Integer and Enumeration share a base type; the other three stand alone.
pub fn same_base_type(t1: Elm, t2: Elm) -> bool {
    t1 == t2
        || (t1 == Elm::Enumeration && t2 == Elm::Integer)
        || (t2 == Elm::Enumeration && t1 == Elm::Integer)
}

impl ModelDescription {
    /// The `modelIdentifier` attribute, required on the root element.
    pub fn model_identifier(&self) -> &str {
        self.element.string(Att::ModelIdentifier).unwrap_or_default()
    }

    /// The `guid` attribute, required on the root element.
    pub fn guid(&self) -> &str {
        self.element.string(Att::Guid).unwrap_or_default()
    }

    pub fn number_of_states(&self) -> Option<u32> {
        self.element.uint(Att::NumberOfContinuousStates).defined()
    }

    pub fn number_of_event_indicators(&self) -> Option<u32> {
        self.element.uint(Att::NumberOfEventIndicators).defined()
    }

    /// Variable lookup by name; names are unique within one description.
    pub fn variable_by_name(&self, name: &str) -> Option<&ScalarVariable> {
        self.model_variables
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|sv| sv.name() == name)
    }

    /// Variable lookup by value reference and base type. Value references
    /// are unique per base type only.
    pub fn variable(&self, vr: ValueReference, base: Elm) -> Option<&ScalarVariable> {
        if vr == UNDEFINED_VALUE_REFERENCE {
            return None;
        }
        self.model_variables
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|sv| same_base_type(base, sv.type_spec.kind) && sv.value_reference() == Some(vr))
    }

    /// Declared-type lookup by name in the type-definition section.
    pub fn declared_type(&self, name: &str) -> Option<&TypeDef> {
        self.type_definitions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|t| t.element.name() == name)
    }

    /// Two-level attribute read on a variable's type spec: the variable's
    /// own spec first, then the spec of its declared type, if any.
    pub fn variable_string<'a>(&'a self, sv: &'a ScalarVariable, a: Att) -> Option<&'a str> {
        if let Some(v) = sv.type_spec.string(a) {
            return Some(v);
        }
        let declared = sv.type_spec.string(Att::DeclaredType)?;
        self.declared_type(declared).and_then(|t| t.spec.string(a))
    }

    /// Like [`variable_string`](Self::variable_string), parsed as a double.
    pub fn variable_double(&self, sv: &ScalarVariable, a: Att) -> Attr<f64> {
        match self.variable_string(sv, a) {
            None => Attr::Missing,
            Some(v) => v.trim().parse::<f64>().ok().into(),
        }
    }

    /// Description text from the variable itself or its declared type.
    pub fn description<'a>(&'a self, sv: &'a ScalarVariable) -> Option<&'a str> {
        if let Some(v) = sv.element.string(Att::Description) {
            return Some(v);
        }
        let declared = sv.type_spec.string(Att::DeclaredType)?;
        self.declared_type(declared)
            .and_then(|t| t.element.string(Att::Description))
    }

    /// Nominal value of a real variable; absent at both levels of the
    /// default chain yields the grammar default 1.0.
    pub fn nominal(&self, vr: ValueReference) -> f64 {
        self.variable(vr, Elm::Real)
            .map(|sv| self.variable_double(sv, Att::Nominal))
            .map(|a| a.unwrap_or(1.0))
            .unwrap_or(1.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Typed values
// ────────────────────────────────────────────────────────────────────────────

/// The wire type of a port, connection cell or variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueType {
    Real,
    Integer,
    Boolean,
    String,
}

impl ValueType {
    /// From the graph grammar's `type` attribute literal.
    pub fn from_enu(e: Enu) -> Option<ValueType> {
        match e {
            Enu::Real => Some(ValueType::Real),
            Enu::Integer => Some(ValueType::Integer),
            Enu::Boolean => Some(ValueType::Boolean),
            Enu::String => Some(ValueType::String),
            _ => None,
        }
    }

    /// From a scalar variable's type spec element. Enumeration shares the
    /// integer base type.
    pub fn from_type_spec(e: Elm) -> Option<ValueType> {
        match e {
            Elm::Real => Some(ValueType::Real),
            Elm::Integer | Elm::Enumeration => Some(ValueType::Integer),
            Elm::Boolean => Some(ValueType::Boolean),
            Elm::String => Some(ValueType::String),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Real => "Real",
            ValueType::Integer => "Integer",
            ValueType::Boolean => "Boolean",
            ValueType::String => "String",
        };
        f.write_str(s)
    }
}

/// A typed value held by a connection cell. The type is fixed when the cell
/// is allocated and never changes for the cell's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Real(f64),
    Integer(i32),
    Boolean(bool),
    String(String),
}

impl Value {
    /// The zero/empty value of a type, used when a cell is allocated.
    pub fn default_of(t: ValueType) -> Value {
        match t {
            ValueType::Real => Value::Real(0.0),
            ValueType::Integer => Value::Integer(0),
            ValueType::Boolean => Value::Boolean(false),
            ValueType::String => Value::String(String::new()),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Real(_) => ValueType::Real,
            Value::Integer(_) => ValueType::Integer,
            Value::Boolean(_) => ValueType::Boolean,
            Value::String(_) => ValueType::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{}", *v as u8),
            Value::String(v) => f.write_str(v),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Component graph
// ────────────────────────────────────────────────────────────────────────────

/// A named, typed attachment point on a component. The connection and
/// variable references are declared by name and resolved to indices later:
/// the connection during graph validation, the variable when the owning
/// component's module is loaded.
#[derive(Debug, Clone, Serialize)]
pub struct Port {
    pub element: Element,
    /// Index into [`Graph::connections`], set by graph validation.
    pub connection: Option<usize>,
    /// Index into the owning component's description variables, set by the
    /// master during graph loading.
    pub variable: Option<usize>,
}

impl Port {
    pub fn name(&self) -> &str {
        self.element.name()
    }

    /// The declared connection name, if this port is wired at all.
    pub fn connection_name(&self) -> Option<&str> {
        self.element.string(Att::Connection)
    }

    /// The declared wire type of this port.
    pub fn value_type(&self) -> Option<ValueType> {
        self.element
            .enum_value(Att::Type)
            .defined()
            .and_then(ValueType::from_enu)
    }
}

/// A named value cell shared by every port bound to it. The cell is
/// allocated on the first successful port-type resolution and its type is
/// fixed from then on; it is the sole mutable state shared between
/// components.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub element: Element,
    pub cell: Option<RefCell<Value>>,
}

impl Connection {
    pub fn name(&self) -> &str {
        self.element.name()
    }
}

/// One co-simulated component of the wiring document.
#[derive(Debug, Clone, Serialize)]
pub struct Component {
    pub element: Element,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Component {
    /// Path of the component bundle to load, required by the master.
    pub fn fmu_path(&self) -> Option<&str> {
        self.element.string(Att::FmuPath)
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }
}

/// Root node of a parsed wiring document.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    pub element: Element,
    pub components: Vec<Component>,
    pub connections: Vec<Connection>,
}

impl Graph {
    pub fn connection_index(&self, name: &str) -> Option<usize> {
        self.connections.iter().position(|c| c.name() == name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generic node
// ────────────────────────────────────────────────────────────────────────────

/// Tagged variant over every node kind. Used for the parser's reduction
/// stack and for list-element children.
#[derive(Debug, Clone, Serialize)]
pub enum AstNode {
    Element(Element),
    List(ListElement),
    Type(TypeDef),
    Variable(ScalarVariable),
    CoSimulation(CoSimulation),
    ModelDescription(ModelDescription),
    Component(Component),
    Port(Port),
    Connection(Connection),
    Graph(Graph),
}

impl AstNode {
    /// Element identity of the node, whatever its variant.
    pub fn kind(&self) -> Elm {
        match self {
            AstNode::Element(e) => e.kind,
            AstNode::List(l) => l.element.kind,
            AstNode::Type(t) => t.element.kind,
            AstNode::Variable(v) => v.element.kind,
            AstNode::CoSimulation(c) => c.element.kind,
            AstNode::ModelDescription(m) => m.element.kind,
            AstNode::Component(c) => c.element.kind,
            AstNode::Port(p) => p.element.kind,
            AstNode::Connection(c) => c.element.kind,
            AstNode::Graph(g) => g.element.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_with(kind: Elm, atts: &[(Att, &str)]) -> Element {
        let mut e = Element::new(kind);
        for (a, v) in atts {
            e.attributes.insert(*a, v.to_string());
        }
        e
    }

    #[test]
    fn double_read_reports_status() {
        let e = element_with(
            Elm::Real,
            &[(Att::Start, "2.5"), (Att::Nominal, "not-a-number")],
        );
        assert_eq!(e.double(Att::Start), Attr::Defined(2.5));
        assert_eq!(e.double(Att::Nominal), Attr::Illegal);
        assert_eq!(e.double(Att::Min), Attr::Missing);
    }

    #[test]
    fn boolean_read_accepts_xml_literals_only() {
        let e = element_with(
            Elm::Capabilities,
            &[(Att::CanRejectSteps, "true"), (Att::CanHandleEvents, "TRUE")],
        );
        assert_eq!(e.boolean(Att::CanRejectSteps), Attr::Defined(true));
        assert_eq!(e.boolean(Att::CanHandleEvents), Attr::Illegal);
    }

    #[test]
    fn enum_defaulting_is_idempotent_and_reports_missing() {
        let e = element_with(Elm::ScalarVariable, &[]);
        for _ in 0..2 {
            let (v, status) = e.enum_or_default(Att::Causality);
            assert_eq!(v, Some(Enu::Internal));
            assert_eq!(status, ValueStatus::Missing);
        }
        let (v, status) = e.enum_or_default(Att::Variability);
        assert_eq!(v, Some(Enu::Continuous));
        assert_eq!(status, ValueStatus::Missing);
    }

    #[test]
    fn illegal_enum_value_is_not_defaulted() {
        let e = element_with(Elm::ScalarVariable, &[(Att::Causality, "sideways")]);
        let (v, status) = e.enum_or_default(Att::Causality);
        assert_eq!(v, None);
        assert_eq!(status, ValueStatus::Illegal);
    }

    #[test]
    fn integer_and_enumeration_share_a_base_type() {
        assert!(same_base_type(Elm::Enumeration, Elm::Integer));
        assert!(same_base_type(Elm::Integer, Elm::Enumeration));
        assert!(!same_base_type(Elm::Real, Elm::Integer));
    }
}
