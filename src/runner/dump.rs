//! The `--list-compilers` dump.

use anyhow::Result;

use crate::toolchain::{discovery, ToolchainDescriptor};

/// Output shape for the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFormat {
    #[default]
    Human,
    Json,
}

/// Print every discovered compiler with its standards.
pub fn list_compilers(format: DumpFormat) -> Result<()> {
    let descriptors = discovery::discover_all();

    match format {
        DumpFormat::Json => {
            let descriptors: Vec<&ToolchainDescriptor> =
                descriptors.iter().map(|descriptor| descriptor.as_ref()).collect();
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
        }
        DumpFormat::Human => {
            if descriptors.is_empty() {
                println!("No compilers found.");
                return Ok(());
            }
            for descriptor in descriptors {
                println!(
                    "{} ({})",
                    descriptor.family.display_name(),
                    descriptor.version
                );
                println!("  Executable: {}", descriptor.executable.display());
                println!("  Target:     {}", descriptor.target);
                println!("  Languages:");
                for (dialect, standards) in &descriptor.standards {
                    let names = standards
                        .groups()
                        .iter()
                        .flat_map(|group| group.0.iter().map(String::as_str))
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("    {:<6} {}", dialect.to_string(), names);
                }
                println!();
            }
        }
    }

    Ok(())
}
