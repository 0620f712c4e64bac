//! Semantic validation of parsed documents.
//!
//! Both passes accumulate an error count instead of stopping at the first
//! fault, so every problem in a document is reported together. Each fault is
//! logged individually at `warn` level; a document with any fault yields an
//! overall [`ValidationError`] and is never handed to the master.

use crate::ast::{Graph, ModelDescription, Value, ValueType};
use crate::schema::Att;
use std::cell::RefCell;
use thiserror::Error;
use tracing::warn;

/// Aggregate validation failure: the total number of faults found in one
/// document. The individual faults have already been logged.
#[derive(Debug, Error)]
#[error("found {count} error(s) in {document}")]
pub struct ValidationError {
    pub count: usize,
    pub document: &'static str,
}

/// Validate a component description: every `declaredType` reference must
/// resolve to a type definition, every variable and type definition must be
/// named, and variable names must be unique.
pub fn validate_model_description(md: &ModelDescription) -> Result<(), ValidationError> {
    let mut errors = 0usize;

    for tp in md.type_definitions.as_deref().unwrap_or_default() {
        if tp.element.string(Att::Name).is_none_or(str::is_empty) {
            warn!("type definition without a name");
            errors += 1;
        }
    }

    let mut seen: Vec<&str> = Vec::new();
    for sv in md.model_variables.as_deref().unwrap_or_default() {
        match sv.element.string(Att::Name) {
            None | Some("") => {
                warn!("scalar variable without a name");
                errors += 1;
            }
            Some(name) => {
                if seen.contains(&name) {
                    warn!(variable = name, "duplicate variable name");
                    errors += 1;
                } else {
                    seen.push(name);
                }
            }
        }
        if let Some(declared) = sv.type_spec.string(Att::DeclaredType) {
            if md.declared_type(declared).is_none() {
                warn!(
                    variable = sv.name(),
                    declared_type = declared,
                    "declared type of variable not found in model description"
                );
                errors += 1;
            }
        }
    }

    if errors > 0 {
        let err = ValidationError {
            count: errors,
            document: "model description",
        };
        warn!("{err}");
        return Err(err);
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum PortDir {
    Input,
    Output,
}

/// Validate a wiring graph and stamp it for simulation: resolve every
/// port's `connection` reference, allocate each connection's typed value
/// cell on the first port resolved against it, and check that every later
/// port bound to the same connection carries the same value type.
///
/// The cell type is fixed by the first resolved port for the connection's
/// lifetime; a later port of a different type is a validation error rather
/// than a reinterpretation of the cell.
pub fn validate_graph(graph: &mut Graph) -> Result<(), ValidationError> {
    let mut errors = 0usize;

    for ci in 0..graph.components.len() {
        // outputs before inputs within each component; across components,
        // whichever port resolves first fixes the cell type
        for dir in [PortDir::Output, PortDir::Input] {
            let count = match dir {
                PortDir::Output => graph.components[ci].outputs.len(),
                PortDir::Input => graph.components[ci].inputs.len(),
            };
            for pi in 0..count {
                validate_port(graph, ci, dir, pi, &mut errors);
            }
        }
    }

    if errors > 0 {
        let err = ValidationError {
            count: errors,
            document: "component diagram",
        };
        warn!("{err}");
        return Err(err);
    }
    Ok(())
}

fn validate_port(graph: &mut Graph, ci: usize, dir: PortDir, pi: usize, errors: &mut usize) {
    let (name, conn_name, port_type) = {
        let port = match dir {
            PortDir::Output => &graph.components[ci].outputs[pi],
            PortDir::Input => &graph.components[ci].inputs[pi],
        };
        (
            port.name().to_string(),
            port.connection_name().map(str::to_string),
            port.value_type(),
        )
    };
    // an unwired port is fine; it simply takes no part in value exchange
    let Some(conn_name) = conn_name else { return };

    let Some(conn_idx) = graph.connection_index(&conn_name) else {
        warn!(
            port = name,
            connection = conn_name,
            "declared connection of linked port not found in component diagram"
        );
        *errors += 1;
        return;
    };

    let Some(port_type) = port_type else {
        warn!(port = name, "linked port has a missing or illegal type");
        *errors += 1;
        return;
    };

    match &graph.connections[conn_idx].cell {
        None => {
            // first resolved port fixes the cell type
            graph.connections[conn_idx].cell =
                Some(RefCell::new(Value::default_of(port_type)));
        }
        Some(cell) => {
            let have: ValueType = cell.borrow().value_type();
            if have != port_type {
                warn!(
                    port = name,
                    connection = conn_name,
                    expected = %have,
                    found = %port_type,
                    "port type does not match the connection's value type"
                );
                *errors += 1;
                return;
            }
        }
    }

    let port = match dir {
        PortDir::Output => &mut graph.components[ci].outputs[pi],
        PortDir::Input => &mut graph.components[ci].inputs[pi],
    };
    port.connection = Some(conn_idx);
}
