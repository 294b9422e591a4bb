//! Dataset access: schema introspection, column projection and chunk residency

mod dataset;
mod projection;
mod residency;

pub use dataset::DatasetHandle;
pub use projection::ColumnProjection;
pub use residency::{ResidencyLedger, ResidentChunk};
