//! Database entities

pub mod remote_app;

pub use remote_app::Entity as RemoteApp;

pub mod prelude {
    pub use super::remote_app::Entity as RemoteApp;
}
