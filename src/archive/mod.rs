//! Archive container format: the `.msg.msg` files that hold an upload's
//! parsed entry metadata (as opposed to its raw files).

mod codec;

pub use codec::{write_archive, ArchiveReader};
