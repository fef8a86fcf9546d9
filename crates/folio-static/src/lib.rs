//! Layouts, asset processing and static builds.
//!
//! The [`LayoutEngine`] is shared with the development server; the
//! [`StaticBuilder`] is the production consumer of the route table.

pub mod assets;
pub mod builder;
pub mod layout;

pub use assets::{AssetError, AssetPipeline};
pub use builder::{BuildConfig, BuildError, BuildResult, StaticBuilder};
pub use layout::{navigation, LayoutEngine, NavItem, RenderError, SiteInfo, PAGE_TEMPLATE};
