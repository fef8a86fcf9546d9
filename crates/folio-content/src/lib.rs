//! Content processing and route generation.
//!
//! Turns a tree of Markdown files (`.md` / `.mdx`) into a [`RouteTable`]:
//! front matter is split off, the body runs through an optional transform
//! [`Pipeline`], is rendered to HTML and indexed for headings.

pub mod frontmatter;
pub mod locale;
pub mod markdown;
pub mod pipeline;
pub mod processor;
pub mod route;
pub mod router;

pub use frontmatter::{FrontMatter, FrontMatterError};
pub use locale::{LocaleIndex, LocalizationIndex};
pub use markdown::Heading;
pub use pipeline::{BoxError, HookError, Pipeline};
pub use processor::{process_file, process_file_with, ContentParseError, ContentRecord};
pub use route::{is_content_file, normalize_route, route_for, CONTENT_EXTENSIONS};
pub use router::{
    generate_routes, generate_routes_with, CancelToken, GeneratedRoutes, RouteTable, RouterError,
};
