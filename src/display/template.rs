//! Template display formatting

use crate::error::KeeperResult;
use crate::template::Template;

/// Format the template library as a table
pub fn format_template_list(templates: &[&Template]) -> String {
    if templates.is_empty() {
        return "No templates found.".to_string();
    }

    let name_width = templates
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:<10}  {}\n",
        "Name",
        "Category",
        "Description",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:-<name_width$}  {:-<10}  {:-<11}\n",
        "",
        "",
        "",
        name_width = name_width,
    ));

    for template in templates {
        output.push_str(&format!(
            "{:<name_width$}  {:<10}  {}\n",
            template.name,
            template.category.as_deref().unwrap_or("-"),
            template.description,
            name_width = name_width,
        ));
    }
    output
}

/// Format a template with its parameters and body
pub fn format_template_details(template: &Template) -> KeeperResult<String> {
    let mut output = String::new();

    output.push_str(&format!("Template: {}\n", template.name));
    if !template.description.is_empty() {
        output.push_str(&format!("  {}\n", template.description));
    }
    if let Some(category) = &template.category {
        output.push_str(&format!("  Category:   {}\n", category));
    }
    output.push_str(&format!(
        "  Parameters: {}\n",
        template.required_parameters()?.join(", ")
    ));
    output.push('\n');
    output.push_str(&template.body);
    if !template.body.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_template_details() {
        let template = Template::new("site", "listen {{port}};\nserver_name {{host}};\n")
            .with_category("vhost");
        let output = format_template_details(&template).unwrap();
        assert!(output.contains("Parameters: port, host"));
        assert!(output.contains("Category:   vhost"));
    }

    #[test]
    fn test_format_template_list() {
        let a = Template::new("a", "x").with_description("first");
        let output = format_template_list(&[&a]);
        assert!(output.contains("first"));
        assert!(output.contains(" -  "));
    }
}
