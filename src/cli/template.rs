//! Template CLI commands
//!
//! Implements CLI commands for browsing and rendering template blueprints.

use clap::Subcommand;

use crate::display::{format_template_details, format_template_list};
use crate::error::KeeperResult;
use crate::template::{self, TemplateLibrary};

/// Template subcommands
#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List built-in and user templates
    List,

    /// Show a template's parameters and body
    Show {
        /// Template name
        name: String,
    },

    /// Render a template to stdout without writing anything
    Render {
        /// Template name
        name: String,
        /// Parameter value (key=value), repeatable
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
}

/// Handle a template command
pub fn handle_template_command(library: &TemplateLibrary, cmd: TemplateCommands) -> KeeperResult<()> {
    match cmd {
        TemplateCommands::List => {
            println!("{}", format_template_list(&library.list()));
        }

        TemplateCommands::Show { name } => {
            let template = library.get(&name)?;
            print!("{}", format_template_details(template)?);
        }

        TemplateCommands::Render { name, params } => {
            let template = library.get(&name)?;
            let parameters = template::parse_parameters(&params)?;
            print!("{}", template::render(template, &parameters)?);
        }
    }

    Ok(())
}
