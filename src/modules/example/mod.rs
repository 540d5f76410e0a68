//! Example module: exercises the whole pipeline - a plain echo action and
//! a transactional upsert action against the default datastore.

pub mod actions;
pub mod schemas;
pub mod sql;

use crate::config::DEFAULT_DATASTORE;
use crate::dispatch::{Route, RouteTable};

use actions::{Bar, Foo};
use schemas::FooSchema;

/// Module name; the first path segment routes here.
pub const NAME: &str = "example";

/// Build the module's immutable route table. Called once during startup.
pub fn routes(bearer: &str) -> RouteTable {
    RouteTable::builder()
        .register(Route::new("foo", Foo).bearer(bearer).schema(FooSchema))
        .register(
            Route::new("bar", Bar)
                .bearer(bearer)
                .schema(FooSchema)
                .database(DEFAULT_DATASTORE, true)
                .transactional(),
        )
        .build()
}
