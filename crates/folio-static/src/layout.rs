//! Layout substitution for rendered pages.
//!
//! Pages are rendered through a minijinja `page.html` template. The
//! built-in layout is used unless a layouts directory is configured.

use std::path::{Path, PathBuf};

use minijinja::{context, path_loader, Environment};
use serde::Serialize;

use folio_content::{ContentRecord, RouteTable};

/// Name of the template every layout set must provide.
pub const PAGE_TEMPLATE: &str = "page.html";

/// A navigation item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavItem {
    /// Display title
    pub title: String,
    /// URL path
    pub path: String,
    /// Whether this is the active page
    pub active: bool,
}

/// Site-wide values available to every layout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteInfo {
    /// Site title
    pub title: String,
    /// Public paths of stylesheets to link
    pub styles: Vec<String>,
}

/// Errors raised while producing a page.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Layout error: {0}")]
    Layout(#[from] minijinja::Error),

    #[error("Layout directory {} has no {}", .0.display(), PAGE_TEMPLATE)]
    MissingLayout(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Template engine using minijinja.
pub struct LayoutEngine {
    env: Environment<'static>,
    dir: Option<PathBuf>,
}

impl LayoutEngine {
    /// Create an engine with the built-in layout.
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_template_owned("base.html".to_string(), BASE_TEMPLATE.to_string())
            .expect("Failed to add base template");

        env.add_template_owned(PAGE_TEMPLATE.to_string(), PAGE_TEMPLATE_SOURCE.to_string())
            .expect("Failed to add page template");

        Self { env, dir: None }
    }

    /// Create an engine that loads templates from `dir`.
    ///
    /// Templates are read once; build a new engine to pick up edits.
    pub fn from_dir(dir: &Path) -> Result<Self, RenderError> {
        if !dir.join(PAGE_TEMPLATE).is_file() {
            return Err(RenderError::MissingLayout(dir.to_path_buf()));
        }

        let mut env = Environment::new();
        env.set_loader(path_loader(dir));

        // Surface syntax errors now rather than on the first request.
        env.get_template(PAGE_TEMPLATE)?;

        Ok(Self {
            env,
            dir: Some(dir.to_path_buf()),
        })
    }

    /// Layouts directory, if this engine is not using the built-in layout.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Render a record into a full HTML document.
    pub fn render(
        &self,
        record: &ContentRecord,
        table: &RouteTable,
        site: &SiteInfo,
    ) -> Result<String, RenderError> {
        let tmpl = self.env.get_template(PAGE_TEMPLATE)?;

        let title = record
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| fallback_title(&record.route));

        let html = tmpl.render(context! {
            title => title,
            site_title => &site.title,
            styles => &site.styles,
            route => &record.route,
            page => &record.front_matter,
            content => &record.rendered_markup,
            toc => &record.heading_index,
            nav => navigation(table, &record.route),
        })?;

        Ok(html)
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the navigation list from a route table.
///
/// Pages with `nav: false` are left out. Ordering follows the `order` key
/// (lower first), then the route.
pub fn navigation(table: &RouteTable, active_route: &str) -> Vec<NavItem> {
    let mut pages: Vec<&ContentRecord> = table
        .records()
        .filter(|r| {
            r.front_matter
                .get("nav")
                .and_then(|v| v.as_bool())
                .unwrap_or(true)
        })
        .collect();

    pages.sort_by_key(|r| {
        let order = r
            .front_matter
            .get("order")
            .and_then(|v| v.as_i64())
            .unwrap_or(999);
        (order, r.route.clone())
    });

    pages
        .into_iter()
        .map(|r| NavItem {
            title: r
                .title()
                .map(str::to_string)
                .unwrap_or_else(|| fallback_title(&r.route)),
            path: r.route.clone(),
            active: r.route == active_route,
        })
        .collect()
}

fn fallback_title(route: &str) -> String {
    match route.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => capitalize(segment),
        _ => "Home".to_string(),
    }
}

/// Capitalize first letter of a string.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="{{ page.lang | default("en") }}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }}{% if site_title %} - {{ site_title }}{% endif %}</title>
  {% if page.description %}<meta name="description" content="{{ page.description }}">
  {% endif %}<style>
    body { font-family: system-ui, sans-serif; margin: 0; line-height: 1.6; }
    .layout { display: grid; grid-template-columns: 220px 1fr 200px; gap: 2rem; max-width: 1200px; margin: 0 auto; padding: 2rem 1rem; }
    .nav-list, .toc ul { list-style: none; padding: 0; }
    .nav-item.active > a { font-weight: 700; }
    pre { background: #f5f5f5; padding: 1rem; border-radius: 0.5rem; overflow-x: auto; }
  </style>
  {% for style in styles %}<link rel="stylesheet" href="{{ style }}">
  {% endfor %}
</head>
<body>
  <div class="layout">
    <nav class="sidebar">
      <a href="/" class="nav-logo">{{ site_title }}</a>
      <ul class="nav-list">
      {% for item in nav %}
        <li class="nav-item{% if item.active %} active{% endif %}"><a href="{{ item.path }}">{{ item.title }}</a></li>
      {% endfor %}
      </ul>
    </nav>
    <main class="main">
      {% block content %}{% endblock %}
    </main>
  </div>
</body>
</html>"##;

const PAGE_TEMPLATE_SOURCE: &str = r##"{% extends "base.html" %}

{% block content %}
<article class="doc" data-route="{{ route }}">
  {{ content | safe }}
</article>

{% if toc %}
<aside class="toc">
  <h2>On this page</h2>
  <ul>
  {% for entry in toc %}
    <li class="toc-level-{{ entry.level }}"><a href="#{{ entry.id }}">{{ entry.text }}</a></li>
  {% endfor %}
  </ul>
</aside>
{% endif %}
{% endblock %}"##;

#[cfg(test)]
mod tests {
    use super::*;
    use folio_content::generate_routes;
    use std::fs;
    use tempfile::tempdir;

    fn table(files: &[(&str, &str)]) -> (tempfile::TempDir, RouteTable) {
        let temp = tempdir().unwrap();
        for (path, content) in files {
            let full = temp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let table = generate_routes(temp.path()).unwrap().table;
        (temp, table)
    }

    #[test]
    fn renders_basic_page() {
        let (_temp, table) = table(&[(
            "about.md",
            "---\ntitle: About\ndescription: Who we are\n---\n# About us\n\nHello world",
        )]);
        let site = SiteInfo {
            title: "My Site".into(),
            styles: vec!["/styles/site.css".into()],
        };

        let html = LayoutEngine::new()
            .render(table.get("/about").unwrap(), &table, &site)
            .unwrap();

        assert!(html.contains("<title>About - My Site</title>"));
        assert!(html.contains("<p>Hello world</p>"));
        assert!(html.contains(r#"<meta name="description" content="Who we are">"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="#));
        assert!(html.contains("site.css"));
        assert!(html.contains(r##"<a href="#about-us">About us</a>"##));
    }

    #[test]
    fn renders_navigation_in_order() {
        let (_temp, table) = table(&[
            ("index.md", "---\ntitle: Home\norder: 1\n---\n"),
            ("guide.md", "---\ntitle: Guide\norder: 2\n---\n"),
            ("hidden.md", "---\ntitle: Hidden\nnav: false\n---\n"),
            ("zeta.md", "no front matter"),
        ]);

        let nav = navigation(&table, "/guide");

        let titles: Vec<_> = nav.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Home", "Guide", "Zeta"]);
        assert!(nav[1].active);
        assert!(!nav[0].active);
    }

    #[test]
    fn loads_layouts_from_directory() {
        let (_temp, table) = table(&[("index.md", "---\ntitle: Home\n---\nBody")]);
        let layouts = tempdir().unwrap();
        fs::write(
            layouts.path().join(PAGE_TEMPLATE),
            "<html><head></head><body><h1>{{ title }}</h1>{{ content | safe }}</body></html>",
        )
        .unwrap();

        let engine = LayoutEngine::from_dir(layouts.path()).unwrap();
        let html = engine
            .render(table.get("/").unwrap(), &table, &SiteInfo::default())
            .unwrap();

        assert_eq!(engine.dir(), Some(layouts.path()));
        assert!(html.contains("<h1>Home</h1><p>Body</p>"));
    }

    #[test]
    fn missing_page_template_is_an_error() {
        let layouts = tempdir().unwrap();

        let result = LayoutEngine::from_dir(layouts.path());

        assert!(matches!(result, Err(RenderError::MissingLayout(_))));
    }

    #[test]
    fn broken_layout_fails_early() {
        let layouts = tempdir().unwrap();
        fs::write(layouts.path().join(PAGE_TEMPLATE), "{% if %}").unwrap();

        let result = LayoutEngine::from_dir(layouts.path());

        assert!(matches!(result, Err(RenderError::Layout(_))));
    }
}
