pub mod browser;
pub mod local_store;

pub use browser::{BrowserElement, BrowserOptions, BrowserPage};
pub use local_store::LocalStore;
