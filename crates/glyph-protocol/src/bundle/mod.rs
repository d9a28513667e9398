//! Web bundles and their tagged, compressed payload form.

mod codec;
mod record;

pub use codec::{BundleStats, decode_bundle, encode_bundle, encode_bundle_with_stats};
pub use record::{TemplateType, WebBundle};
