//! Convert COSMIC radio-occultation ASCII files to NetCDF-4.
//!
//! Pipeline per file: [`header::open_source`] → [`header::parse_header`] →
//! [`schema::build_directory`] → [`table::split`] → [`writer::write_netcdf`].
//! [`batch::convert_many`] runs it over many files on a worker pool.

pub mod batch;
pub mod error;
pub mod header;
pub mod literal;
pub mod logging;
pub mod schema;
pub mod table;
pub mod writer;

pub use batch::{convert_many, convert_one, output_path, BatchConfig, BatchSummary, CompletionCode};
pub use error::{ConvertError, Result};
pub use header::Header;
pub use literal::{decode, HeaderValue};
pub use schema::{TypeDirectory, TypeSchema};
pub use table::{Body, Cell, Table};
