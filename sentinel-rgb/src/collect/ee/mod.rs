pub mod auth;
pub mod ee_collect;
pub mod filters;

pub use auth::Credentials;
pub use ee_collect::{
    CollectionQuery, EarthEngine, EeError, FileFormat, ImageCatalog, ImagePage, ImageRecord,
    PixelRequest,
};
pub use filters::{CustomFilters, FilterOp, FilterValue};
