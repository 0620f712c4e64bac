//! The component lifecycle protocol and the loading abstraction.
//!
//! Every co-simulated component must expose the FMI 1.0 CS entry points:
//! instantiate, initialize, typed get/set, step advance, terminate and
//! release. The protocol is expressed as traits so the master and the
//! validator can run against in-process components; release maps onto
//! dropping the boxed instance.

use crate::ast::{ModelDescription, ValueReference, ValueType};
use crate::parser::ParseError;
use crate::validator::ValidationError;
use camino::Utf8Path;
use serde::Serialize;
use std::rc::Rc;
use thiserror::Error;

/// Return status of every lifecycle operation. Ordered by severity: the
/// master treats anything above [`Status::Warning`] as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Status {
    Ok,
    Warning,
    Discard,
    Error,
    Fatal,
}

/// MIME type announced to slaves that support tool coupling.
pub const SHARED_LIBRARY_MIME_TYPE: &str = "application/x-fmu-sharedlibrary";

/// Log callback handed to a slave at instantiation:
/// `(instance name, status, category, message)`.
pub type Logger = Rc<dyn Fn(&str, Status, &str, &str)>;

/// The default logger forwards slave messages into `tracing`.
pub fn tracing_logger() -> Logger {
    Rc::new(|instance, status, category, message| match status {
        Status::Ok => tracing::info!(instance, category, "{message}"),
        Status::Warning | Status::Discard => tracing::warn!(instance, category, "{message}"),
        Status::Error | Status::Fatal => tracing::error!(instance, category, "{message}"),
    })
}

/// Arguments of the instantiate operation.
pub struct Instantiation<'a> {
    pub instance_name: &'a str,
    /// Global unique id of the component, checked by the slave against its
    /// own build.
    pub guid: &'a str,
    /// Resource location of the bundle, if any.
    pub location: Option<&'a str>,
    pub mime_type: &'a str,
    /// Wait period in milliseconds for tool coupling, 0 for unlimited.
    pub timeout_ms: f64,
    pub visible: bool,
    pub interactive: bool,
    pub logging_on: bool,
    pub logger: Logger,
}

/// One live slave instance. All operations are synchronous; the master
/// never re-enters an instance recursively. Dropping the box is the
/// protocol's release operation.
pub trait Slave {
    fn initialize(&mut self, t_start: f64, stop_time_defined: bool, t_stop: f64) -> Status;

    fn get_real(&mut self, vrs: &[ValueReference], values: &mut [f64]) -> Status;
    fn get_integer(&mut self, vrs: &[ValueReference], values: &mut [i32]) -> Status;
    fn get_boolean(&mut self, vrs: &[ValueReference], values: &mut [bool]) -> Status;
    fn get_string(&mut self, vrs: &[ValueReference], values: &mut [String]) -> Status;

    fn set_real(&mut self, vrs: &[ValueReference], values: &[f64]) -> Status;
    fn set_integer(&mut self, vrs: &[ValueReference], values: &[i32]) -> Status;
    fn set_boolean(&mut self, vrs: &[ValueReference], values: &[bool]) -> Status;
    fn set_string(&mut self, vrs: &[ValueReference], values: &[&str]) -> Status;

    /// Advance the slave by one communication step.
    fn do_step(&mut self, current_time: f64, step_size: f64, new_step: bool) -> Status;

    fn terminate(&mut self) -> Status;
}

/// A loaded component module, able to create instances. Returns `None`
/// when instantiation fails (the slave has already logged why).
pub trait SlaveModule {
    fn instantiate(&self, args: &Instantiation) -> Option<Box<dyn Slave>>;
}

/// A loaded component bundle: its parsed, validated description plus the
/// module that creates instances.
pub struct LoadedComponent {
    pub description: ModelDescription,
    pub module: Box<dyn SlaveModule>,
}

/// Maps a component path from the wiring document to a loadable module.
/// Implementations decide the loading strategy; see
/// [`crate::models::BuiltinLoader`] for the in-process registry.
pub trait ComponentLoader {
    fn load(&self, path: &Utf8Path) -> Result<LoadedComponent, LoadError>;
}

/// Fatal errors while loading and binding a graph. Nothing is instantiated
/// when any component fails to load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot load component bundle {path}")]
    Bundle {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("unknown model {0}")]
    UnknownModel(String),
    #[error("component {0} has no fmuPath")]
    MissingPath(String),
    #[error("variable {port} not found in description of component {component}")]
    UnresolvedVariable { component: String, port: String },
    #[error(
        "port {port} of component {component} is declared {declared} but binds a {variable} variable"
    )]
    PortTypeMismatch {
        component: String,
        port: String,
        declared: ValueType,
        variable: ValueType,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
