use std::fs;
use std::path::Path;
use tera::{Context, Error as TeraError, Tera};

use crate::agent::{ContextVariables, Instructions};

/// Render an instructions template against the current context variables.
///
/// Every context variable is visible to the template under its own key.
pub fn render_instructions(template: &str, context: &ContextVariables) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("instructions", template)?;
    let context = Context::from_serialize(context)?;
    tera.render("instructions", &context)
}

/// Load a template file as agent instructions. The template is validated
/// here so syntax errors surface before a run starts.
pub fn load_instructions_file(path: impl AsRef<Path>) -> Result<Instructions, TeraError> {
    let path = path.as_ref();
    let template = fs::read_to_string(path)
        .map_err(|e| TeraError::chain(format!("Failed to read {}", path.display()), e))?;

    let mut tera = Tera::default();
    tera.add_raw_template("instructions", &template)?;
    Ok(Instructions::Template(template))
}
