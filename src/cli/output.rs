//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{PropagationError, SetupError};

/// Map an error to CLI output, listing suppressed errors indented below it.
pub fn map_error(e: &SetupError) -> String {
    match e {
        SetupError::Propagation(inner) => map_propagation_error(inner),
        other => other.to_string(),
    }
}

fn map_propagation_error(e: &PropagationError) -> String {
    let mut out = e.to_string();
    for suppressed in e.suppressed() {
        for line in map_propagation_error(suppressed).lines() {
            out.push_str("\n  ");
            out.push_str(line);
        }
    }
    out
}
