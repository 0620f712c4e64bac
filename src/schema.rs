//! Schema tables shared by both XML grammars.
//!
//! Two documents are parsed against these tables: the component description
//! (`fmiModelDescription`, FMI 1.0) and the wiring graph (`Graph`). A single
//! table of element, attribute and enum-literal identities serves both, so
//! one parser core can handle either document; only the expected root element
//! differs.
//!
//! All names are case sensitive. An element or attribute name that is not in
//! these tables is a hard parse error, never silently skipped.

use serde::{Serialize, Serializer};

/// Element identity. The first block covers the FMI model description
/// grammar, the trailing block the component-graph wiring grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Elm {
    FmiModelDescription,
    UnitDefinitions,
    BaseUnit,
    DisplayUnitDefinition,
    TypeDefinitions,
    Type,
    RealType,
    IntegerType,
    BooleanType,
    StringType,
    EnumerationType,
    Item,
    DefaultExperiment,
    VendorAnnotations,
    Tool,
    Annotation,
    ModelVariables,
    ScalarVariable,
    DirectDependency,
    Name,
    Real,
    Integer,
    Boolean,
    String,
    Enumeration,
    Implementation,
    CoSimulationStandAlone,
    CoSimulationTool,
    Model,
    File,
    Capabilities,

    // component graph
    Graph,
    Components,
    Component,
    Inputs,
    Outputs,
    Port,
    Connections,
    Connection,
}

impl Elm {
    pub const ALL: &'static [Elm] = &[
        Elm::FmiModelDescription,
        Elm::UnitDefinitions,
        Elm::BaseUnit,
        Elm::DisplayUnitDefinition,
        Elm::TypeDefinitions,
        Elm::Type,
        Elm::RealType,
        Elm::IntegerType,
        Elm::BooleanType,
        Elm::StringType,
        Elm::EnumerationType,
        Elm::Item,
        Elm::DefaultExperiment,
        Elm::VendorAnnotations,
        Elm::Tool,
        Elm::Annotation,
        Elm::ModelVariables,
        Elm::ScalarVariable,
        Elm::DirectDependency,
        Elm::Name,
        Elm::Real,
        Elm::Integer,
        Elm::Boolean,
        Elm::String,
        Elm::Enumeration,
        Elm::Implementation,
        Elm::CoSimulationStandAlone,
        Elm::CoSimulationTool,
        Elm::Model,
        Elm::File,
        Elm::Capabilities,
        Elm::Graph,
        Elm::Components,
        Elm::Component,
        Elm::Inputs,
        Elm::Outputs,
        Elm::Port,
        Elm::Connections,
        Elm::Connection,
    ];

    /// The XML tag name of this element.
    pub fn name(self) -> &'static str {
        match self {
            Elm::FmiModelDescription => "fmiModelDescription",
            Elm::UnitDefinitions => "UnitDefinitions",
            Elm::BaseUnit => "BaseUnit",
            Elm::DisplayUnitDefinition => "DisplayUnitDefinition",
            Elm::TypeDefinitions => "TypeDefinitions",
            Elm::Type => "Type",
            Elm::RealType => "RealType",
            Elm::IntegerType => "IntegerType",
            Elm::BooleanType => "BooleanType",
            Elm::StringType => "StringType",
            Elm::EnumerationType => "EnumerationType",
            Elm::Item => "Item",
            Elm::DefaultExperiment => "DefaultExperiment",
            Elm::VendorAnnotations => "VendorAnnotations",
            Elm::Tool => "Tool",
            Elm::Annotation => "Annotation",
            Elm::ModelVariables => "ModelVariables",
            Elm::ScalarVariable => "ScalarVariable",
            Elm::DirectDependency => "DirectDependency",
            Elm::Name => "Name",
            Elm::Real => "Real",
            Elm::Integer => "Integer",
            Elm::Boolean => "Boolean",
            Elm::String => "String",
            Elm::Enumeration => "Enumeration",
            Elm::Implementation => "Implementation",
            Elm::CoSimulationStandAlone => "CoSimulation_StandAlone",
            Elm::CoSimulationTool => "CoSimulation_Tool",
            Elm::Model => "Model",
            Elm::File => "File",
            Elm::Capabilities => "Capabilities",
            Elm::Graph => "Graph",
            Elm::Components => "Components",
            Elm::Component => "Component",
            Elm::Inputs => "Inputs",
            Elm::Outputs => "Outputs",
            Elm::Port => "Port",
            Elm::Connections => "Connections",
            Elm::Connection => "Connection",
        }
    }

    /// Look up an element by its XML tag name.
    pub fn from_name(name: &str) -> Option<Elm> {
        Elm::ALL.iter().copied().find(|e| e.name() == name)
    }

    /// Which AST node variant an element of this identity reduces to.
    pub fn ast_kind(self) -> AstKind {
        match self {
            Elm::FmiModelDescription => AstKind::ModelDescription,
            Elm::Type => AstKind::Type,
            Elm::ScalarVariable => AstKind::ScalarVariable,
            Elm::CoSimulationStandAlone | Elm::CoSimulationTool => AstKind::CoSimulation,
            Elm::BaseUnit
            | Elm::EnumerationType
            | Elm::Tool
            | Elm::UnitDefinitions
            | Elm::TypeDefinitions
            | Elm::VendorAnnotations
            | Elm::ModelVariables
            | Elm::DirectDependency
            | Elm::Model
            | Elm::Components
            | Elm::Inputs
            | Elm::Outputs
            | Elm::Connections => AstKind::List,
            Elm::Graph => AstKind::Graph,
            Elm::Component => AstKind::Component,
            Elm::Port => AstKind::Port,
            Elm::Connection => AstKind::Connection,
            _ => AstKind::Element,
        }
    }
}

/// The AST node variant produced for an element, see [`Elm::ast_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstKind {
    Element,
    List,
    Type,
    ScalarVariable,
    CoSimulation,
    ModelDescription,
    Component,
    Port,
    Connection,
    Graph,
}

/// Attribute identity. Attribute slots of AST nodes are always interned
/// against this table; attribute values stay owned strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Att {
    FmiVersion,
    DisplayUnit,
    Gain,
    Offset,
    Unit,
    Name,
    Description,
    Quantity,
    RelativeQuantity,
    Min,
    Max,
    Nominal,
    DeclaredType,
    Start,
    Fixed,
    StartTime,
    StopTime,
    Tolerance,
    Value,
    ValueReference,
    Variability,
    Causality,
    Alias,
    ModelName,
    ModelIdentifier,
    Guid,
    Author,
    Version,
    GenerationTool,
    GenerationDateAndTime,
    VariableNamingConvention,
    NumberOfContinuousStates,
    NumberOfEventIndicators,
    Input,
    CanHandleVariableCommunicationStepSize,
    CanHandleEvents,
    CanRejectSteps,
    CanInterpolateInputs,
    MaxOutputDerivativeOrder,
    CanRunAsynchronuously,
    CanSignalEvents,
    CanBeInstantiatedOnlyOncePerProcess,
    CanNotUseMemoryManagementFunctions,
    File,
    EntryPoint,
    ManualStart,
    Type,

    // component graph
    Connection,
    FmuPath,
}

impl Att {
    pub const ALL: &'static [Att] = &[
        Att::FmiVersion,
        Att::DisplayUnit,
        Att::Gain,
        Att::Offset,
        Att::Unit,
        Att::Name,
        Att::Description,
        Att::Quantity,
        Att::RelativeQuantity,
        Att::Min,
        Att::Max,
        Att::Nominal,
        Att::DeclaredType,
        Att::Start,
        Att::Fixed,
        Att::StartTime,
        Att::StopTime,
        Att::Tolerance,
        Att::Value,
        Att::ValueReference,
        Att::Variability,
        Att::Causality,
        Att::Alias,
        Att::ModelName,
        Att::ModelIdentifier,
        Att::Guid,
        Att::Author,
        Att::Version,
        Att::GenerationTool,
        Att::GenerationDateAndTime,
        Att::VariableNamingConvention,
        Att::NumberOfContinuousStates,
        Att::NumberOfEventIndicators,
        Att::Input,
        Att::CanHandleVariableCommunicationStepSize,
        Att::CanHandleEvents,
        Att::CanRejectSteps,
        Att::CanInterpolateInputs,
        Att::MaxOutputDerivativeOrder,
        Att::CanRunAsynchronuously,
        Att::CanSignalEvents,
        Att::CanBeInstantiatedOnlyOncePerProcess,
        Att::CanNotUseMemoryManagementFunctions,
        Att::File,
        Att::EntryPoint,
        Att::ManualStart,
        Att::Type,
        Att::Connection,
        Att::FmuPath,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Att::FmiVersion => "fmiVersion",
            Att::DisplayUnit => "displayUnit",
            Att::Gain => "gain",
            Att::Offset => "offset",
            Att::Unit => "unit",
            Att::Name => "name",
            Att::Description => "description",
            Att::Quantity => "quantity",
            Att::RelativeQuantity => "relativeQuantity",
            Att::Min => "min",
            Att::Max => "max",
            Att::Nominal => "nominal",
            Att::DeclaredType => "declaredType",
            Att::Start => "start",
            Att::Fixed => "fixed",
            Att::StartTime => "startTime",
            Att::StopTime => "stopTime",
            Att::Tolerance => "tolerance",
            Att::Value => "value",
            Att::ValueReference => "valueReference",
            Att::Variability => "variability",
            Att::Causality => "causality",
            Att::Alias => "alias",
            Att::ModelName => "modelName",
            Att::ModelIdentifier => "modelIdentifier",
            Att::Guid => "guid",
            Att::Author => "author",
            Att::Version => "version",
            Att::GenerationTool => "generationTool",
            Att::GenerationDateAndTime => "generationDateAndTime",
            Att::VariableNamingConvention => "variableNamingConvention",
            Att::NumberOfContinuousStates => "numberOfContinuousStates",
            Att::NumberOfEventIndicators => "numberOfEventIndicators",
            Att::Input => "input",
            Att::CanHandleVariableCommunicationStepSize => "canHandleVariableCommunicationStepSize",
            Att::CanHandleEvents => "canHandleEvents",
            Att::CanRejectSteps => "canRejectSteps",
            Att::CanInterpolateInputs => "canInterpolateInputs",
            Att::MaxOutputDerivativeOrder => "maxOutputDerivativeOrder",
            // sic, misspelled in the FMI 1.0 schema
            Att::CanRunAsynchronuously => "canRunAsynchronuously",
            Att::CanSignalEvents => "canSignalEvents",
            Att::CanBeInstantiatedOnlyOncePerProcess => "canBeInstantiatedOnlyOncePerProcess",
            Att::CanNotUseMemoryManagementFunctions => "canNotUseMemoryManagementFunctions",
            Att::File => "file",
            Att::EntryPoint => "entryPoint",
            Att::ManualStart => "manualStart",
            Att::Type => "type",
            Att::Connection => "connection",
            Att::FmuPath => "fmuPath",
        }
    }

    pub fn from_name(name: &str) -> Option<Att> {
        Att::ALL.iter().copied().find(|a| a.name() == name)
    }
}

/// Enumeration literal identity, covering the built-in FMI enumerated
/// attribute values and the graph grammar's port value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enu {
    Flat,
    Structured,
    Constant,
    Parameter,
    Discrete,
    Continuous,
    Input,
    Output,
    Internal,
    None,
    NoAlias,
    Alias,
    NegatedAlias,

    // component graph port types
    Boolean,
    Integer,
    Real,
    String,
}

impl Enu {
    pub const ALL: &'static [Enu] = &[
        Enu::Flat,
        Enu::Structured,
        Enu::Constant,
        Enu::Parameter,
        Enu::Discrete,
        Enu::Continuous,
        Enu::Input,
        Enu::Output,
        Enu::Internal,
        Enu::None,
        Enu::NoAlias,
        Enu::Alias,
        Enu::NegatedAlias,
        Enu::Boolean,
        Enu::Integer,
        Enu::Real,
        Enu::String,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Enu::Flat => "flat",
            Enu::Structured => "structured",
            Enu::Constant => "constant",
            Enu::Parameter => "parameter",
            Enu::Discrete => "discrete",
            Enu::Continuous => "continuous",
            Enu::Input => "input",
            Enu::Output => "output",
            Enu::Internal => "internal",
            Enu::None => "none",
            Enu::NoAlias => "noAlias",
            Enu::Alias => "alias",
            Enu::NegatedAlias => "negatedAlias",
            Enu::Boolean => "Boolean",
            Enu::Integer => "Integer",
            Enu::Real => "Real",
            Enu::String => "String",
        }
    }

    pub fn from_name(name: &str) -> Option<Enu> {
        Enu::ALL.iter().copied().find(|e| e.name() == name)
    }
}

impl Serialize for Elm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl Serialize for Att {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl Serialize for Enu {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_names_round_trip() {
        for e in Elm::ALL {
            assert_eq!(Elm::from_name(e.name()), Some(*e));
        }
        assert_eq!(Elm::from_name("NoSuchElement"), None);
    }

    #[test]
    fn attribute_names_round_trip() {
        for a in Att::ALL {
            assert_eq!(Att::from_name(a.name()), Some(*a));
        }
        assert_eq!(Att::from_name("noSuchAttribute"), None);
    }

    #[test]
    fn enum_names_round_trip() {
        for e in Enu::ALL {
            assert_eq!(Enu::from_name(e.name()), Some(*e));
        }
        // port types are capitalized, the built-in literals are not
        assert_eq!(Enu::from_name("real"), None);
        assert_eq!(Enu::from_name("Real"), Some(Enu::Real));
    }
}
