//! Request decorators that attach credentials or identifying headers.

mod header;
mod url_param;

pub use header::Header;
pub use url_param::UrlParam;
