//! Operations that move an upload between the staging and public stores:
//! pack (§4.6), re-pack (§4.7), and to-staging (§4.8).

pub mod pack;
pub mod repack;
pub mod to_staging;

pub use pack::{pack as pack_upload, PackOptions};
pub use repack::re_pack;
pub use to_staging::to_staging;
