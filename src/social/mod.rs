pub mod blocks;
pub mod content;
pub mod likes;
pub mod reports;
pub mod service;

pub use blocks::{BlockStore, DynBlockStore, SqliteBlockStore};
pub use content::{ContentStore, DynContentStore, SqliteContentStore};
pub use likes::{DynLikeStore, LikeChange, LikeOp, LikeState, LikeStore, LikeTarget, SqliteLikeStore};
pub use reports::{
    DynReportStore, ReportKind, ReportReceipt, ReportStore, ReportTarget, SqliteReportStore,
};
pub use service::{SocialService, SocialSettings};
