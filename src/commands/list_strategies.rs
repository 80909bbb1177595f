use crate::strategy::strategy_templates;
use anyhow::Result;

pub fn run() -> Result<()> {
    for template in strategy_templates() {
        println!("{} - {}", template.name, template.description);
        for parameter in &template.parameters {
            println!(
                "  {} (default {}): {}",
                parameter.name, parameter.default, parameter.description
            );
        }
    }
    Ok(())
}
