pub mod allocator;
pub mod composer;
pub mod memo;
pub mod submission;
pub mod wizard;

pub use crate::domain::model::{CostTotals, ProjectDraft, SectionKey};
pub use crate::domain::ports::{ConfigProvider, DraftStorage, ProjectApi};
pub use crate::utils::error::Result;
