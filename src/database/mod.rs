pub mod provider;
pub mod view;

pub use provider::{DatastoreProvider, ProviderError, Session};
pub use view::{Db, DbError};
