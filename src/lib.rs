pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{PortalConfig, PortalSettings};

pub use adapters::{http::HttpProjectApi, storage::LocalDraftStorage};
pub use core::{
    allocator::{AllocationStatus, PaymentAllocator},
    memo::MemoBuilder,
    submission::{assemble, ProjectPayload},
    wizard::{ProjectWizard, WizardStep},
};
pub use domain::memo::{MemoItem, PaymentMemo, ProjectCostDetail};
pub use domain::model::{CostTotals, ProjectDraft, SectionKey};
pub use utils::error::{CostingError, Result};
