use crate::utils;
use colored::Colorize;
use std::path::Path;

pub fn handle(template: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "Validating template...".blue());

    let path = stackflow_config::find_template_file(template)?;
    println!("Template: {}", path.display().to_string().cyan());

    let stack = match stackflow_core::parse_template_file(&path) {
        Ok(stack) => stack,
        Err(e) => utils::exit_invalid(&e),
    };
    let waves = match stackflow_core::resolve_waves(&stack) {
        Ok(waves) => waves,
        Err(e) => utils::exit_invalid(&e),
    };

    println!("{}", "✓ Template is valid".green().bold());
    println!();
    println!("Summary:");

    println!("  Parameters: {}", stack.parameters.len());
    for (name, parameter) in &stack.parameters {
        let mut notes = vec![parameter.param_type.to_string()];
        if let Some(default) = &parameter.default {
            if parameter.sensitive {
                notes.push(format!("default {}", stackflow_core::REDACTED));
            } else {
                notes.push(format!("default {}", default));
            }
        }
        if parameter.sensitive {
            notes.push("NoEcho".to_string());
        }
        println!("    - {} ({})", name.cyan(), notes.join(", "));
    }

    println!("  Resources: {}", stack.resources.len());
    for (name, resource) in &stack.resources {
        println!("    - {} ({})", name.cyan(), resource.kind);
    }

    println!("  Outputs: {}", stack.outputs.len());
    for name in stack.outputs.keys() {
        println!("    - {}", name.cyan());
    }

    println!();
    println!("Waves:");
    for (index, wave) in waves.iter().enumerate() {
        println!("  {}. {}", index + 1, wave.join(", "));
    }

    Ok(())
}
