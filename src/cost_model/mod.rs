//! The schema cost model: C1 (the immutable [`TypeWeightTable`]) and C2
//! (the [`builder::build`] function that produces it).

mod builder;
mod types;
mod union_reduction;

pub use builder::build;
pub use builder::BuildOptions;
pub use types::FieldDescriptor;
pub use types::ListWeight;
pub use types::MultiplierSpec;
pub use types::TypeWeightEntry;
pub use types::TypeWeightTable;
