pub mod e2e;
pub mod scripted;

#[allow(unused_imports)]
pub use e2e::open_odbc_session;
#[allow(unused_imports)]
pub use scripted::{
    catalog_native, scripted_statement, two_column_native, CATALOG_QUERY, TWO_COLUMN_QUERY,
};
