//! Template library
//!
//! Built-in blueprints for the default categories, overridable by YAML
//! blueprint files in the templates directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::Template;
use crate::error::{KeeperError, KeeperResult};
use crate::models::Category;

const NGINX_SITE: &str = r#"server {
    listen {{port}};
    server_name {{server_name}};
    root {{root}};
    index index.php index.html;

    access_log /var/log/nginx/{{server_name}}.access.log;
    error_log /var/log/nginx/{{server_name}}.error.log;

    location / {
        try_files $uri $uri/ /index.php?$query_string;
    }

    location ~ \.php$ {
        include snippets/fastcgi-php.conf;
        fastcgi_pass unix:{{php_socket}};
    }
}
"#;

const PHP_FPM_POOL: &str = r#"[{{pool}}]
user = {{user}}
group = {{user}}
listen = /run/php/php-fpm-{{pool}}.sock
listen.owner = www-data
listen.group = www-data
pm = dynamic
pm.max_children = {{max_children}}
pm.start_servers = 2
pm.min_spare_servers = 1
pm.max_spare_servers = 3
php_admin_value[open_basedir] = {{root}}:/tmp
"#;

const FAIL2BAN_JAIL: &str = r#"[{{jail}}]
enabled = true
port = {{port}}
filter = {{filter}}
logpath = {{logpath}}
maxretry = {{maxretry}}
bantime = {{bantime}}
"#;

const FIREWALL_RULES: &str = r#"# {{name}}
allow {{port}}/{{protocol}};
"#;

/// Named templates available for provisioning
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, Template>,
}

impl TemplateLibrary {
    /// Only the built-in blueprints
    pub fn builtin() -> Self {
        let mut library = Self::default();
        for template in [
            Template::new("nginx-site", NGINX_SITE)
                .with_description("Web server virtual host with PHP handler")
                .with_category(Category::VIRTUAL_HOST),
            Template::new("php-fpm-pool", PHP_FPM_POOL)
                .with_description("Isolated PHP process pool")
                .with_category(Category::PROCESS_POOL),
            Template::new("fail2ban-jail", FAIL2BAN_JAIL)
                .with_description("Intrusion-prevention jail")
                .with_category(Category::JAIL),
            Template::new("firewall-rules", FIREWALL_RULES)
                .with_description("Single-port firewall rule set")
                .with_category(Category::FIREWALL),
        ] {
            library.insert(template);
        }
        library
    }

    /// Built-ins plus every `*.yaml`/`*.yml` blueprint in `dir`
    ///
    /// Files override built-ins with the same name. A missing directory is
    /// not an error.
    pub fn load(dir: &Path) -> KeeperResult<Self> {
        let mut library = Self::builtin();
        if !dir.is_dir() {
            return Ok(library);
        }

        let mut files: Vec<_> = fs::read_dir(dir)
            .map_err(|e| KeeperError::io_at("read directory", dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        files.sort();

        for path in files {
            let text = fs::read_to_string(&path).map_err(|e| KeeperError::io_at("read", &path, e))?;
            let mut template: Template = serde_yaml::from_str(&text).map_err(|e| {
                KeeperError::Config(format!("Invalid template {}: {}", path.display(), e))
            })?;

            if template.name.is_empty() {
                template.name = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_default();
            }
            debug!("Loaded template '{}' from {}", template.name, path.display());
            library.insert(template);
        }

        Ok(library)
    }

    /// Add or replace a template
    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Look up a template by name
    pub fn get(&self, name: &str) -> KeeperResult<&Template> {
        self.templates.get(name).ok_or_else(|| KeeperError::NotFound {
            entity_type: "Template",
            identifier: name.to_string(),
        })
    }

    /// All templates sorted by name
    pub fn list(&self) -> Vec<&Template> {
        self.templates.values().collect()
    }
}
