//! The fixed-step co-simulation master.
//!
//! The master binds a validated wiring graph to loaded component modules and
//! drives all slaves through the lifecycle protocol with a Jacobi scheme:
//! within one communication step every output is read into its connection
//! cell first, then every input is written from its cell, then every slave
//! advances. A consumer therefore always sees the producer's value from the
//! previous step.

use crate::ast::{Graph, ModelDescription, ScalarVariable, Value, ValueType};
use crate::slave::{
    ComponentLoader, Instantiation, LoadError, Slave, SlaveModule, Status,
    SHARED_LIBRARY_MIME_TYPE, tracing_logger,
};
use camino::Utf8Path;
use serde::Serialize;
use std::io::Write;
use thiserror::Error;
use tracing::{info, warn};

/// Run parameters of one simulation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub end_time: f64,
    pub step_size: f64,
    /// Passed to every slave at instantiation.
    pub logging_on: bool,
    /// Column separator of the result trace.
    pub separator: char,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            end_time: 1.0,
            step_size: 0.1,
            logging_on: false,
            separator: ';',
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub steps: u64,
    /// Trace rows written, including the row for the start time.
    pub rows: u64,
    pub end_time: f64,
}

/// Fatal simulation failure. The master tears every live instance down
/// before returning any of these.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
    #[error("could not instantiate component {component}")]
    Instantiate { component: String },
    #[error("could not initialize component {component}, status {status:?}")]
    Initialize { component: String, status: Status },
    #[error("component {component} failed during {operation} at t={time}, status {status:?}")]
    Step {
        component: String,
        operation: &'static str,
        time: f64,
        status: Status,
    },
    #[error("cannot write simulation trace")]
    Trace(#[from] std::io::Error),
}

/// One graph component bound to its loaded module.
struct Binding {
    description: ModelDescription,
    module: Box<dyn SlaveModule>,
    instance: Option<Box<dyn Slave>>,
}

/// A wiring graph bound to loaded component modules, ready to simulate.
pub struct Master {
    graph: Graph,
    bindings: Vec<Binding>,
}

impl Master {
    /// Load the module of every component and resolve each port against the
    /// variables of its component's description. A port's declared type must
    /// agree with the variable it binds, so a connection cell can never be
    /// re-typed at runtime. The graph must already have passed
    /// [`crate::validator::validate_graph`]. Nothing is instantiated here;
    /// all-or-nothing, the first load failure aborts.
    pub fn load(graph: Graph, loader: &dyn ComponentLoader) -> Result<Master, LoadError> {
        let mut graph = graph;
        let mut bindings = Vec::with_capacity(graph.components.len());
        for component in &mut graph.components {
            let name = component.name().to_string();
            let path = component
                .fmu_path()
                .ok_or_else(|| LoadError::MissingPath(name.clone()))?;
            let loaded = loader.load(Utf8Path::new(path))?;

            for port in component.inputs.iter_mut().chain(&mut component.outputs) {
                let variables = loaded.description.model_variables.as_deref().unwrap_or_default();
                let idx = variables
                    .iter()
                    .position(|sv| sv.name() == port.name() && sv.value_reference().is_some())
                    .ok_or_else(|| LoadError::UnresolvedVariable {
                        component: name.clone(),
                        port: port.name().to_string(),
                    })?;
                if let (Some(declared), Some(variable)) =
                    (port.value_type(), variables[idx].value_type())
                {
                    if declared != variable {
                        return Err(LoadError::PortTypeMismatch {
                            component: name.clone(),
                            port: port.name().to_string(),
                            declared,
                            variable,
                        });
                    }
                }
                port.variable = Some(idx);
            }

            bindings.push(Binding {
                description: loaded.description,
                module: loaded.module,
                instance: None,
            });
        }
        Ok(Master { graph, bindings })
    }

    /// Run the simulation from t=0 to the configured end time, writing the
    /// trace as CSV to `out`. The instances are always released before this
    /// returns, successful or not.
    pub fn run(
        &mut self,
        config: &RunConfig,
        out: &mut dyn Write,
    ) -> Result<RunSummary, SimulationError> {
        if !(config.step_size > 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "step size must be positive, got {}",
                config.step_size
            )));
        }
        if !(config.end_time >= 0.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "end time must be non-negative, got {}",
                config.end_time
            )));
        }

        let result = self.run_inner(config, out);
        self.teardown();
        result
    }

    fn run_inner(
        &mut self,
        config: &RunConfig,
        out: &mut dyn Write,
    ) -> Result<RunSummary, SimulationError> {
        let t_start = 0.0;
        let h = config.step_size;

        // instantiate and initialize every slave before touching any value
        for (component, binding) in self.graph.components.iter().zip(&mut self.bindings) {
            let name = component.name();
            let instance = binding.module.instantiate(&Instantiation {
                instance_name: name,
                guid: binding.description.guid(),
                location: component.fmu_path(),
                mime_type: SHARED_LIBRARY_MIME_TYPE,
                timeout_ms: 1000.0,
                visible: false,
                interactive: false,
                logging_on: config.logging_on,
                logger: tracing_logger(),
            });
            match instance {
                Some(instance) => binding.instance = Some(instance),
                None => {
                    return Err(SimulationError::Instantiate {
                        component: name.to_string(),
                    });
                }
            }
        }
        for (component, binding) in self.graph.components.iter().zip(&mut self.bindings) {
            if let Some(instance) = binding.instance.as_deref_mut() {
                let status = instance.initialize(t_start, true, config.end_time);
                if status > Status::Warning {
                    return Err(SimulationError::Initialize {
                        component: component.name().to_string(),
                        status,
                    });
                }
            }
        }

        self.write_header(config, out)?;
        self.write_row(t_start, config, out)?;

        let mut time = t_start;
        let mut steps = 0u64;
        let mut rows = 1u64;
        // the half-step tolerance keeps float accumulation from dropping or
        // duplicating the final step
        while time + 0.5 * h < config.end_time {
            self.read_outputs(time)?;
            self.write_inputs(time)?;
            self.step_all(time, h)?;
            time += h;
            steps += 1;
            self.write_row(time, config, out)?;
            rows += 1;
        }

        info!(steps, end_time = time, "simulation completed");
        Ok(RunSummary {
            steps,
            rows,
            end_time: time,
        })
    }

    /// Read every output port into its connection cell.
    fn read_outputs(&mut self, time: f64) -> Result<(), SimulationError> {
        for (component, binding) in self.graph.components.iter().zip(&mut self.bindings) {
            let Some(instance) = binding.instance.as_deref_mut() else {
                continue;
            };
            for port in &component.outputs {
                let (Some(conn), Some(var)) = (port.connection, port.variable) else {
                    continue;
                };
                let Some(sv) = variable(&binding.description, var) else {
                    continue;
                };
                let (value, status) = get_value(instance, sv);
                if status > Status::Warning {
                    return Err(SimulationError::Step {
                        component: component.name().to_string(),
                        operation: "output read",
                        time,
                        status,
                    });
                }
                if let (Some(value), Some(cell)) = (value, &self.graph.connections[conn].cell) {
                    *cell.borrow_mut() = value;
                }
            }
        }
        Ok(())
    }

    /// Write every input port from its connection cell.
    fn write_inputs(&mut self, time: f64) -> Result<(), SimulationError> {
        for (component, binding) in self.graph.components.iter().zip(&mut self.bindings) {
            let Some(instance) = binding.instance.as_deref_mut() else {
                continue;
            };
            for port in &component.inputs {
                let (Some(conn), Some(var)) = (port.connection, port.variable) else {
                    continue;
                };
                let Some(sv) = variable(&binding.description, var) else {
                    continue;
                };
                let Some(cell) = &self.graph.connections[conn].cell else {
                    continue;
                };
                let value = cell.borrow().clone();
                let status = set_value(instance, sv, &value);
                if status > Status::Warning {
                    return Err(SimulationError::Step {
                        component: component.name().to_string(),
                        operation: "input write",
                        time,
                        status,
                    });
                }
            }
        }
        Ok(())
    }

    fn step_all(&mut self, time: f64, h: f64) -> Result<(), SimulationError> {
        for (component, binding) in self.graph.components.iter().zip(&mut self.bindings) {
            let Some(instance) = binding.instance.as_deref_mut() else {
                continue;
            };
            let status = instance.do_step(time, h, true);
            if status != Status::Ok {
                return Err(SimulationError::Step {
                    component: component.name().to_string(),
                    operation: "doStep",
                    time,
                    status,
                });
            }
        }
        Ok(())
    }

    fn write_header(
        &self,
        config: &RunConfig,
        out: &mut dyn Write,
    ) -> Result<(), SimulationError> {
        let sep = config.separator;
        write!(out, "time")?;
        for component in &self.graph.components {
            for port in component.outputs.iter().chain(&component.inputs) {
                write!(out, "{sep}{}.{}", component.name(), port.name())?;
            }
        }
        writeln!(out)?;
        Ok(())
    }

    /// One trace row: the current value of every port, read from its slave.
    fn write_row(
        &mut self,
        time: f64,
        config: &RunConfig,
        out: &mut dyn Write,
    ) -> Result<(), SimulationError> {
        let sep = config.separator;
        write!(out, "{time}")?;
        for (component, binding) in self.graph.components.iter().zip(&mut self.bindings) {
            let Some(instance) = binding.instance.as_deref_mut() else {
                continue;
            };
            for port in component.outputs.iter().chain(&component.inputs) {
                let value = port
                    .variable
                    .and_then(|var| variable(&binding.description, var))
                    .and_then(|sv| {
                        let (value, status) = get_value(instance, sv);
                        if status > Status::Warning { None } else { value }
                    });
                match value {
                    Some(v) => write!(out, "{sep}{v}")?,
                    None => write!(out, "{sep}")?,
                }
            }
        }
        writeln!(out)?;
        Ok(())
    }

    /// Best-effort shutdown: terminate what is still live, then release.
    fn teardown(&mut self) {
        for (component, binding) in self.graph.components.iter().zip(&mut self.bindings) {
            if let Some(instance) = binding.instance.as_deref_mut() {
                let status = instance.terminate();
                if status > Status::Warning {
                    warn!(
                        component = component.name(),
                        ?status,
                        "termination of component failed"
                    );
                }
            }
            binding.instance = None;
        }
    }
}

fn variable(description: &ModelDescription, idx: usize) -> Option<&ScalarVariable> {
    description.model_variables.as_deref().unwrap_or_default().get(idx)
}

/// Typed read of one variable. `None` with `Ok` status never happens for
/// the four wire types; a variable without a wire type reads as an error.
fn get_value(instance: &mut dyn Slave, sv: &ScalarVariable) -> (Option<Value>, Status) {
    let Some(vr) = sv.value_reference() else {
        return (None, Status::Error);
    };
    let Some(value_type) = sv.value_type() else {
        return (None, Status::Error);
    };
    match value_type {
        ValueType::Real => {
            let mut v = [0.0f64];
            let status = instance.get_real(&[vr], &mut v);
            (Some(Value::Real(v[0])), status)
        }
        ValueType::Integer => {
            let mut v = [0i32];
            let status = instance.get_integer(&[vr], &mut v);
            (Some(Value::Integer(v[0])), status)
        }
        ValueType::Boolean => {
            let mut v = [false];
            let status = instance.get_boolean(&[vr], &mut v);
            (Some(Value::Boolean(v[0])), status)
        }
        ValueType::String => {
            let mut v = [String::new()];
            let status = instance.get_string(&[vr], &mut v);
            let [v] = v;
            (Some(Value::String(v)), status)
        }
    }
}

/// Typed write of one variable from a connection cell value. A type
/// mismatch cannot happen on a validated graph.
fn set_value(instance: &mut dyn Slave, sv: &ScalarVariable, value: &Value) -> Status {
    let Some(vr) = sv.value_reference() else {
        return Status::Error;
    };
    match value {
        Value::Real(v) => instance.set_real(&[vr], &[*v]),
        Value::Integer(v) => instance.set_integer(&[vr], &[*v]),
        Value::Boolean(v) => instance.set_boolean(&[vr], &[*v]),
        Value::String(v) => instance.set_string(&[vr], &[v.as_str()]),
    }
}
