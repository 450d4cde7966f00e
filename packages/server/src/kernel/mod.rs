pub mod deps;
pub mod stores;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use traits::{
    ApprovalStore, BaseChatService, BaseSmsService, MessageCorrelation, OtpStore,
    ResendMappingStore,
};
