//! siteweave node administration
//!
//! Node configuration loading and the pieces the `siteweave` binary wires
//! into an [`siteweave_apps::AppManager`].

pub mod config;
pub mod handler;
